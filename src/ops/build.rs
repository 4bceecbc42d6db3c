//! Building packages from their recipes.

use anyhow::Result;

use crate::conan::cache::{clean_cache, source_folder, CleanOptions};
use crate::conan::recipe::ConanRecipe;
use crate::conan::recipe_store::recipe_for;
use crate::conan::Conan;
use crate::core::package_reference::PackageReference;
use crate::core::profiles::ConanProfiles;
use crate::debug::DebugProcessors;
use crate::util::context::GlobalContext;

/// Options for building packages.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Export each recipe before building it.
    pub export_recipes: bool,
    /// Keep sources fetched by this build.
    pub keep_sources: bool,
}

/// Build one package and clean up after it.
///
/// Sources are fetched when Conan has none yet. Cleanup runs whether the
/// build succeeded or not; sources are removed only if this run fetched them.
pub fn build_package(
    conan: &Conan,
    recipe: &ConanRecipe,
    profiles: &ConanProfiles,
    opts: &BuildOptions,
    debug: &mut DebugProcessors,
) -> Result<()> {
    if recipe.is_python_require() {
        if opts.export_recipes {
            recipe.export(conan)?;
        }
        eprintln!("{:>12} {} (python_require)", "Skipping", recipe.reference());
        return Ok(());
    }

    let mut fetched = false;
    let result = (|| {
        if opts.export_recipes {
            recipe.export(conan)?;
        }

        let sources = source_folder(conan, recipe)?;
        fetched = !sources.is_dir();
        if fetched {
            recipe.source(conan)?;
        }

        recipe.build(conan, profiles, &[], debug)
    })();

    let clean = CleanOptions::default().with_sources(fetched && !opts.keep_sources);
    finish_with_cleanup(result, || clean_cache(conan, recipe, &clean).map(|_| ()))
}

/// Return `result`, running `cleanup` first.
///
/// A cleanup failure is only logged when `result` already failed.
pub(crate) fn finish_with_cleanup<F>(result: Result<()>, cleanup: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let cleaned = cleanup();
    match (result, cleaned) {
        (Err(e), Err(clean_err)) => {
            tracing::warn!("cleanup failed: {:#}", clean_err);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), cleaned) => cleaned,
    }
}

/// Build every package of a build order.
pub fn build_all(
    ctx: &GlobalContext,
    conan: &Conan,
    packages: &[String],
    profiles: &ConanProfiles,
    opts: &BuildOptions,
    debug: &mut DebugProcessors,
) -> Result<()> {
    for name in packages {
        let reference = PackageReference::resolve(ctx.packages(), name, None, None, None)?;
        let recipe = recipe_for(ctx, reference)?;
        build_package(conan, &recipe, profiles, opts, debug)?;
    }
    Ok(())
}
