//! Publishing recipes and binaries to Conan remotes.

use anyhow::Result;

use crate::conan::recipe_store::recipe_for;
use crate::conan::remotes::TemporaryRemotes;
use crate::conan::Conan;
use crate::core::package_reference::PackageReference;
use crate::util::context::GlobalContext;

pub const RECIPES_REMOTE_NAME: &str = "conan-utils-audacity-recipes-conan2";
pub const BINARIES_REMOTE_NAME: &str = "conan-utils-audacity-binaries-conan2";

/// Options for [`upload_all`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Recipes remote URL; the configured one when unset.
    pub recipes_remote: Option<String>,
    /// Binaries remote URL; the configured one when unset.
    pub binaries_remote: Option<String>,
    pub upload_build_tools: bool,
}

/// Upload every package of a build order.
///
/// Recipes go to the recipes remote, recipes with binaries to the binaries
/// remote. A failing package does not stop the others; the operation fails
/// at the end if any package failed.
pub fn upload_all(
    ctx: &GlobalContext,
    conan: &Conan,
    opts: &UploadOptions,
    build_order: &[String],
) -> Result<()> {
    let recipes_url = opts
        .recipes_remote
        .as_deref()
        .unwrap_or_else(|| ctx.config().recipes_remote());
    let binaries_url = opts
        .binaries_remote
        .as_deref()
        .unwrap_or_else(|| ctx.config().binaries_remote());

    let mut remotes = TemporaryRemotes::new(conan);
    remotes.add(RECIPES_REMOTE_NAME, recipes_url)?;
    remotes.add(BINARIES_REMOTE_NAME, binaries_url)?;

    let mut failed = Vec::new();
    for name in build_order {
        let recipe = match PackageReference::resolve(ctx.packages(), name, None, None, None)
            .and_then(|reference| recipe_for(ctx, reference))
        {
            Ok(recipe) => recipe,
            Err(e) => {
                tracing::warn!("failed to resolve `{}`: {:#}", name, e);
                failed.push(name.clone());
                continue;
            }
        };

        if recipe.is_build_tool() && !opts.upload_build_tools {
            eprintln!("{:>12} {} (build tool)", "Skipping", recipe.reference());
            continue;
        }

        eprintln!("{:>12} {}", "Uploading", recipe.reference());
        let uploaded = recipe
            .upload(conan, RECIPES_REMOTE_NAME, false)
            .and_then(|()| recipe.upload(conan, BINARIES_REMOTE_NAME, true));
        if let Err(e) = uploaded {
            tracing::warn!("{:#}", e);
            failed.push(recipe.reference().to_string());
        }
    }

    drop(remotes);

    if !failed.is_empty() {
        eprintln!("failed to upload the following packages:");
        for package in &failed {
            eprintln!("  {}", package);
        }
        anyhow::bail!("failed to upload {} package(s)", failed.len());
    }
    Ok(())
}
