//! `conan-utils build` command

use anyhow::Result;

use conan_utils::conan::recipe_store::recipe_for;
use conan_utils::conan::Conan;
use conan_utils::core::build_order::load_build_order;
use conan_utils::core::PackageReference;
use conan_utils::debug::DebugProcessors;
use conan_utils::ops::{build_all, build_package, BuildOptions};
use conan_utils::GlobalContext;

use crate::cli::BuildArgs;
use crate::commands::{enable_debug_processors, profiles};

pub fn execute(
    ctx: &GlobalContext,
    conan: &Conan,
    args: BuildArgs,
    debug: &mut DebugProcessors,
) -> Result<()> {
    let profiles = profiles(ctx, &args.profiles)?;
    let opts = BuildOptions {
        export_recipes: args.export_recipes,
        keep_sources: args.keep_sources || ctx.config().build.keep_sources,
    };

    enable_debug_processors(ctx, &args.debug, debug)?;

    match &args.package {
        Some(name) => {
            let reference =
                PackageReference::resolve(ctx.packages(), name, args.version.as_deref(), None, None)?;
            let recipe = recipe_for(ctx, reference)?;
            build_package(conan, &recipe, &profiles, &opts, debug)?;
            eprintln!("{:>12} {}", "Finished", recipe.reference());
        }
        None => {
            let packages = load_build_order(ctx.dirs(), args.build_order.as_deref(), ctx.platform())?;
            build_all(ctx, conan, &packages, &profiles, &opts, debug)?;
            eprintln!("{:>12} {} packages", "Finished", packages.len());
        }
    }

    Ok(())
}
