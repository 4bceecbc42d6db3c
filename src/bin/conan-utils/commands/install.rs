//! `conan-utils install` command

use anyhow::Result;

use conan_utils::conan::recipe_store::recipe_for;
use conan_utils::conan::Conan;
use conan_utils::core::build_order::load_build_order;
use conan_utils::core::PackageReference;
use conan_utils::debug::DebugProcessors;
use conan_utils::ops::{install_all, install_package, install_recipe, InstallOptions};
use conan_utils::GlobalContext;

use crate::cli::InstallArgs;
use crate::commands::{enable_debug_processors, profiles};

pub fn execute(
    ctx: &GlobalContext,
    conan: &Conan,
    args: InstallArgs,
    debug: &mut DebugProcessors,
) -> Result<()> {
    let profiles = profiles(ctx, &args.profiles)?;
    let opts = InstallOptions {
        remotes: args.remotes,
        allow_build: args.allow_build,
        keep_sources: args.keep_sources || ctx.config().build.keep_sources,
    };

    enable_debug_processors(ctx, &args.debug, debug)?;

    if let Some(recipe_path) = &args.recipe {
        install_recipe(
            ctx,
            conan,
            recipe_path,
            args.recipe_config.as_deref(),
            &profiles,
            &opts,
            debug,
        )?;
        eprintln!("{:>12} {}", "Installed", recipe_path.display());
        return Ok(());
    }

    match &args.package {
        Some(name) => {
            let reference =
                PackageReference::resolve(ctx.packages(), name, args.version.as_deref(), None, None)?;
            let mut recipe = recipe_for(ctx, reference)?;
            install_package(conan, &mut recipe, &profiles, &opts, debug)?;
            eprintln!("{:>12} {}", "Installed", recipe.reference());
        }
        None => {
            let packages = load_build_order(ctx.dirs(), args.build_order.as_deref(), ctx.platform())?;
            let build_dirs = install_all(ctx, conan, &packages, &profiles, &opts, debug)?;
            tracing::debug!("{} build folders recorded", build_dirs.len());
            eprintln!("{:>12} {} packages", "Installed", packages.len());
        }
    }

    Ok(())
}
