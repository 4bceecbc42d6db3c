//! High-level operations.
//!
//! This module contains the implementation of conan-utils commands.

pub mod build;
pub mod install;
pub mod recipes;
pub mod remote_cache;
pub mod update_mirror;
pub mod upload;

pub use build::{build_all, build_package, BuildOptions};
pub use install::{install_all, install_package, install_recipe, InstallOptions};
pub use recipes::{execute_for_stores, RecipeCommand};
pub use remote_cache::{
    delete_cache, list_cache, process_conan_cache, store_cache, CacheMetadata, CacheRemote,
    StoreOptions,
};
pub use update_mirror::{update_mirror, MirrorRemote};
pub use upload::{upload_all, UploadOptions};
