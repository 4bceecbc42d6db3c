//! Core data structures for conan-utils.
//!
//! - Platform identifiers
//! - Package references and per-package configs
//! - Build orders and profiles
//! - Configuration errors

pub mod build_order;
pub mod error;
pub mod package_config;
pub mod package_reference;
pub mod platform;
pub mod profiles;

pub use build_order::BuildOrder;
pub use error::ConfigError;
pub use package_config::{PackageConfig, PackageConfigProvider};
pub use package_reference::PackageReference;
pub use platform::Platform;
pub use profiles::ConanProfiles;
