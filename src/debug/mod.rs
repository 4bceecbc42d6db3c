//! Debug symbol processors.
//!
//! A processor is activated once, receives every built package through
//! [`DebugProcessor::process`], and uploads everything it collected in
//! [`DebugProcessor::finalize`]. On a fatal error the collected data is
//! dropped with [`DebugProcessor::discard`] instead, so partial symbol sets
//! are never published.

pub mod harvest;
pub mod sentry;
pub mod symstore;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;

use crate::core::package_reference::PackageReference;
use crate::core::platform::Platform;
use crate::util::context::GlobalContext;

pub use sentry::{SentryProcessor, SentrySettings};
pub use symstore::{SymstoreProcessor, SymstoreSettings};

/// A package whose build tree is ready for symbol collection.
#[derive(Debug, Clone, Copy)]
pub struct BuiltPackage<'a> {
    pub reference: &'a PackageReference,
    pub is_build_tool: bool,
    pub source_dir: Option<&'a Path>,
    pub build_dir: &'a Path,
}

pub trait DebugProcessor: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Check tools and settings. Returns false when the processor cannot run.
    ///
    /// `directory` reuses data harvested earlier, e.g. from a cache bundle.
    fn activate(&mut self, directory: Option<&Path>) -> Result<bool>;

    fn process(&mut self, package: &BuiltPackage<'_>) -> Result<()>;

    fn finalize(&mut self) -> Result<()>;

    fn discard(&mut self) -> Result<()>;
}

/// Known processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Sentry,
    Symstore,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 2] = [ProcessorKind::Sentry, ProcessorKind::Symstore];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Sentry => "sentry",
            ProcessorKind::Symstore => "symstore",
        }
    }

    pub fn create(&self, settings: &ProcessorSettings) -> Box<dyn DebugProcessor> {
        match self {
            ProcessorKind::Sentry => Box::new(SentryProcessor::new(
                settings.sentry.clone(),
                settings.platform.clone(),
                settings.work_dir.join(self.as_str()),
                settings.skip_upload,
            )),
            ProcessorKind::Symstore => Box::new(SymstoreProcessor::new(
                settings.symstore.clone(),
                settings.platform.clone(),
                settings.work_dir.join(self.as_str()),
                settings.skip_upload,
            )),
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown debug processor `{}` (expected one of: sentry, symstore)",
                    s
                )
            })
    }
}

/// Everything processors need to activate.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub platform: Platform,
    /// Parent of the per-processor harvest directories.
    pub work_dir: PathBuf,
    /// Keep harvested data instead of uploading it.
    pub skip_upload: bool,
    pub sentry: SentrySettings,
    pub symstore: SymstoreSettings,
}

impl ProcessorSettings {
    pub fn from_context(ctx: &GlobalContext, skip_upload: bool) -> Self {
        let lookup = |name: &str| std::env::var(name).ok();
        ProcessorSettings {
            platform: ctx.platform().clone(),
            work_dir: ctx.dirs().debug_processors_dir(),
            skip_upload,
            sentry: SentrySettings::from_config(ctx.config(), lookup),
            symstore: SymstoreSettings::from_config(ctx.config(), lookup),
        }
    }
}

/// The processors active for this run.
#[derive(Debug, Default)]
pub struct DebugProcessors {
    active: Vec<Box<dyn DebugProcessor>>,
}

impl DebugProcessors {
    /// Create and activate processors; those that cannot run are skipped.
    pub fn enable(kinds: &[ProcessorKind], settings: &ProcessorSettings) -> Self {
        let mut processors = DebugProcessors::default();
        for kind in kinds {
            processors.push_if_active(kind.create(settings), None);
        }
        processors
    }

    /// Activate `processor` and keep it if activation succeeded.
    pub fn push_if_active(
        &mut self,
        mut processor: Box<dyn DebugProcessor>,
        directory: Option<&Path>,
    ) -> bool {
        match processor.activate(directory) {
            Ok(true) => {
                tracing::info!("debug processor `{}` activated", processor.name());
                self.active.push(processor);
                true
            }
            Ok(false) => {
                tracing::info!("debug processor `{}` not activated", processor.name());
                false
            }
            Err(e) => {
                tracing::warn!(
                    "failed to activate debug processor `{}`: {:#}",
                    processor.name(),
                    e
                );
                false
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Hand a finished build to every processor.
    ///
    /// The first existing directory of `build_dirs` is used. Processor
    /// failures are logged and do not fail the build.
    pub fn handle_build_completed(
        &mut self,
        reference: &PackageReference,
        is_build_tool: bool,
        source_dir: Option<&Path>,
        build_dirs: &[PathBuf],
    ) {
        if self.active.is_empty() {
            return;
        }

        let Some(build_dir) = build_dirs.iter().find(|d| d.is_dir()) else {
            tracing::warn!("no build directory found for {}", reference);
            return;
        };

        tracing::info!(
            "processing debug info for {} ({})",
            reference,
            build_dir.display()
        );

        let package = BuiltPackage {
            reference,
            is_build_tool,
            source_dir,
            build_dir,
        };
        for processor in &mut self.active {
            if let Err(e) = processor.process(&package) {
                tracing::warn!(
                    "debug processor `{}` failed for {}: {:#}",
                    processor.name(),
                    reference,
                    e
                );
            }
        }
    }

    /// Finalize and release every processor. Fails if any of them failed.
    pub fn finalize(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for mut processor in self.active.drain(..) {
            if let Err(e) = processor.finalize() {
                tracing::warn!("debug processor `{}` failed to finalize: {:#}", processor.name(), e);
                failed.push(processor.name());
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("debug processors failed: {}", failed.join(", "));
        }
        Ok(())
    }

    /// Drop all collected data without uploading it.
    pub fn discard(&mut self) {
        for mut processor in self.active.drain(..) {
            if let Err(e) = processor.discard() {
                tracing::warn!("debug processor `{}` failed to discard: {:#}", processor.name(), e);
            }
        }
    }
}
