//! conan-utils - Build, cache and publish Conan recipes for an application
//!
//! This crate provides the library functionality behind the `conan-utils`
//! command: build-order resolution, the recipe build/install cycle, Conan
//! cache bookkeeping, remote cache bundles and debug-symbol processing.

pub mod conan;
pub mod core;
pub mod debug;
pub mod ops;
pub mod remote;
pub mod util;

/// Test utilities for conan-utils unit tests.
///
/// Provides a fixture recipes checkout and, on Unix, a fake `conan`
/// executable that records its arguments.
#[cfg(test)]
pub(crate) mod test_support;

pub use core::{ConfigError, PackageReference, Platform};
pub use util::context::GlobalContext;
