//! Command implementations

pub mod build;
pub mod build_order;
pub mod cache;
pub mod clean;
pub mod completions;
pub mod env;
pub mod install;
pub mod mirror;
pub mod recipes;
pub mod remote;
pub mod upload;

use anyhow::{Context, Result};

use conan_utils::core::profiles::ConanProfiles;
use conan_utils::debug::{DebugProcessors, ProcessorKind, ProcessorSettings};
use conan_utils::ops::{CacheRemote, MirrorRemote};
use conan_utils::GlobalContext;

use crate::cli::{ArtifactoryArgs, DebugArgs, ProfileArgs};

/// Resolve the host and build profiles given on the command line.
pub fn profiles(ctx: &GlobalContext, args: &ProfileArgs) -> Result<ConanProfiles> {
    ConanProfiles::new(
        &ctx.dirs().profiles_dir(),
        args.profile_host.as_deref(),
        args.profile_build.as_deref(),
    )
}

/// Activate the requested debug processors, or those named in the config.
pub fn enable_debug_processors(
    ctx: &GlobalContext,
    args: &DebugArgs,
    debug: &mut DebugProcessors,
) -> Result<()> {
    let kinds = if args.debug_processors.is_empty() {
        ctx.config()
            .build
            .debug_processors
            .iter()
            .map(|name| name.parse::<ProcessorKind>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()
            .context("invalid `build.debug_processors` in config")?
    } else {
        args.debug_processors.clone()
    };

    if kinds.is_empty() {
        return Ok(());
    }

    let settings = ProcessorSettings::from_context(ctx, args.skip_debug_upload);
    *debug = DebugProcessors::enable(&kinds, &settings);
    let active = debug.len();
    tracing::debug!("{} of {} debug processors active", active, kinds.len());
    Ok(())
}

impl ArtifactoryArgs {
    pub fn cache_remote(self) -> CacheRemote {
        CacheRemote {
            url: self.url,
            username: self.username,
            password: self.password,
            key: self.key,
        }
    }

    pub fn mirror_remote(self) -> MirrorRemote {
        MirrorRemote {
            url: self.url,
            username: self.username,
            password: self.password,
            key: self.key,
        }
    }
}
