//! `conan-utils export-recipes` and `update-sources` commands

use anyhow::Result;

use conan_utils::conan::Conan;
use conan_utils::ops::{execute_for_stores, RecipeCommand};
use conan_utils::GlobalContext;

use crate::cli::RecipesArgs;

pub fn export(ctx: &GlobalContext, conan: &Conan, args: RecipesArgs) -> Result<()> {
    run(ctx, conan, RecipeCommand::Export, args)
}

pub fn update_sources(ctx: &GlobalContext, conan: &Conan, args: RecipesArgs) -> Result<()> {
    run(ctx, conan, RecipeCommand::Source, args)
}

fn run(ctx: &GlobalContext, conan: &Conan, command: RecipeCommand, args: RecipesArgs) -> Result<()> {
    let count = execute_for_stores(ctx, conan, command, args.all)?;
    let verb = match command {
        RecipeCommand::Export => "Exported",
        RecipeCommand::Source => "Sourced",
    };
    eprintln!("{:>12} {} recipes", verb, count);
    Ok(())
}
