//! Recipe stores: `recipes/<name>/` with a `config.yml` mapping versions to folders.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::conan::recipe::ConanRecipe;
use crate::core::error::ConfigError;
use crate::core::package_config::{scalar_to_string, PackageConfig};
use crate::core::package_reference::PackageReference;
use crate::util::context::GlobalContext;
use crate::util::fs::subdirectory_names;

#[derive(Debug, Deserialize)]
struct StoreConfig {
    #[serde(default)]
    versions: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    folder: String,
}

/// All versions of one package's recipes.
#[derive(Debug, Clone)]
pub struct RecipeStore {
    name: String,
    path: PathBuf,
    /// `(version, folder)` in file order.
    versions: Vec<(String, String)>,
    config: PackageConfig,
}

impl RecipeStore {
    /// Open `recipes/<name>`.
    ///
    /// The recipe dir, its `config.yml` and the package config must exist.
    pub fn open(ctx: &GlobalContext, name: &str) -> Result<Self> {
        let path = ctx.dirs().recipes_dir().join(name);
        if !path.is_dir() {
            return Err(ConfigError::MissingRecipe {
                package: name.to_string(),
                path,
            }
            .into());
        }

        let config_path = path.join("config.yml");
        if !config_path.is_file() {
            return Err(ConfigError::MissingRecipe {
                package: name.to_string(),
                path: config_path,
            }
            .into());
        }

        let contents = crate::util::fs::read_to_string(&config_path)?;
        let versions = parse_versions(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        let config = ctx.packages().require_package_config(name)?;

        Ok(RecipeStore {
            name: name.to_string(),
            path,
            versions,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    /// Versions in the order `config.yml` lists them.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|(v, _)| v.as_str())
    }

    /// Version from the package config.
    pub fn default_version(&self) -> Result<&str> {
        self.config.version.as_deref().ok_or_else(|| {
            ConfigError::MissingVersion {
                package: self.name.clone(),
            }
            .into()
        })
    }

    /// Folder holding the recipe of `version`.
    pub fn recipe_folder(&self, version: &str) -> Result<PathBuf> {
        let folder = self
            .versions
            .iter()
            .find(|(v, _)| v == version)
            .map(|(_, f)| f)
            .ok_or_else(|| ConfigError::UnknownVersion {
                package: self.name.clone(),
                version: version.to_string(),
                available: self.versions().map(str::to_string).collect(),
            })?;

        let path = self.path.join(folder);
        if !path.is_dir() {
            return Err(ConfigError::MissingRecipeFolder {
                package: self.name.clone(),
                version: version.to_string(),
                path,
            }
            .into());
        }
        Ok(path)
    }

    /// Reference of `version` with defaulted user and channel.
    pub fn reference(&self, ctx: &GlobalContext, version: &str) -> Result<PackageReference> {
        PackageReference::resolve(ctx.packages(), &self.name, Some(version), None, None)
    }

    pub fn recipe(&self, ctx: &GlobalContext, version: &str) -> Result<ConanRecipe> {
        let folder = self.recipe_folder(version)?;
        let reference = self.reference(ctx, version)?;
        Ok(ConanRecipe::new(
            folder,
            reference,
            self.config.clone(),
            ctx.dirs(),
        ))
    }

    pub fn default_recipe(&self, ctx: &GlobalContext) -> Result<ConanRecipe> {
        let version = self.default_version()?.to_string();
        self.recipe(ctx, &version)
    }

    /// Recipes of every listed version.
    pub fn recipes(&self, ctx: &GlobalContext) -> Result<Vec<ConanRecipe>> {
        self.versions()
            .map(|v| self.recipe(ctx, v))
            .collect()
    }

    /// Default recipe, or every version's recipe when `all_versions`.
    pub fn selected_recipes(&self, ctx: &GlobalContext, all_versions: bool) -> Result<Vec<ConanRecipe>> {
        if all_versions {
            self.recipes(ctx)
        } else {
            Ok(vec![self.default_recipe(ctx)?])
        }
    }
}

fn parse_versions(contents: &str) -> Result<Vec<(String, String)>> {
    let config: StoreConfig = serde_yaml::from_str(contents)?;
    let mut versions = Vec::with_capacity(config.versions.len());
    for (key, value) in config.versions {
        let version = scalar_to_string(&key)
            .ok_or_else(|| anyhow::anyhow!("version keys must be scalars"))?;
        let entry: VersionEntry = serde_yaml::from_value(value)
            .with_context(|| format!("invalid entry for version `{}`", version))?;
        versions.push((version, entry.folder));
    }
    Ok(versions)
}

/// Recipe for a fully specified reference, keeping its user and channel.
pub fn recipe_for(ctx: &GlobalContext, reference: PackageReference) -> Result<ConanRecipe> {
    let store = RecipeStore::open(ctx, reference.name())?;
    let folder = store.recipe_folder(reference.version())?;
    Ok(ConanRecipe::new(
        folder,
        reference,
        store.config.clone(),
        ctx.dirs(),
    ))
}

/// Stores for bulk commands.
///
/// Build-order names come first, in order, followed by the remaining
/// directories under `recipes/`. Those must have a package config unless
/// `all` is set. Each name appears once.
pub fn recipe_stores(ctx: &GlobalContext, build_order: &[String], all: bool) -> Result<Vec<RecipeStore>> {
    let mut seen = HashSet::new();
    let mut stores = Vec::new();

    for name in build_order {
        if seen.insert(name.clone()) {
            stores.push(RecipeStore::open(ctx, name)?);
        }
    }

    let recipes_dir = ctx.dirs().recipes_dir();
    let names = if recipes_dir.is_dir() {
        subdirectory_names(&recipes_dir)?
    } else {
        Vec::new()
    };

    for name in names {
        if seen.contains(&name) {
            continue;
        }
        if !all && ctx.packages().package_config(&name)?.is_none() {
            tracing::debug!("skipping `{}`: no package config", name);
            continue;
        }
        if !recipes_dir.join(&name).join("config.yml").is_file() {
            tracing::debug!("skipping `{}`: no config.yml", name);
            continue;
        }
        seen.insert(name.clone());
        stores.push(RecipeStore::open(ctx, &name)?);
    }

    Ok(stores)
}
