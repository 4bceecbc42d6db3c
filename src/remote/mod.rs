//! Remote blob stores.

pub mod artifactory;

pub use artifactory::{ArtifactoryClient, Credentials};
