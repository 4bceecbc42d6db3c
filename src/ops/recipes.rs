//! Bulk recipe commands (`export-recipes`, `update-sources`).

use std::fmt;

use anyhow::Result;

use crate::conan::recipe_store::recipe_stores;
use crate::conan::Conan;
use crate::util::context::GlobalContext;

/// A Conan command run against recipe folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeCommand {
    Export,
    Source,
}

impl fmt::Display for RecipeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecipeCommand::Export => "export",
            RecipeCommand::Source => "source",
        })
    }
}

/// Run `command` for the default version of every configured package, or
/// for every version of every recipe store when `all` is set.
///
/// Returns the number of recipes processed.
pub fn execute_for_stores(
    ctx: &GlobalContext,
    conan: &Conan,
    command: RecipeCommand,
    all: bool,
) -> Result<usize> {
    let mut count = 0;
    for store in recipe_stores(ctx, &[], all)? {
        for recipe in store.selected_recipes(ctx, all)? {
            match command {
                RecipeCommand::Export => recipe.export(conan)?,
                RecipeCommand::Source => recipe.source(conan)?,
            }
            count += 1;
        }
    }
    tracing::info!("ran `{}` for {} recipes", command, count);
    Ok(count)
}
