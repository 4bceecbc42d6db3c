//! Shared utilities

pub mod archive;
pub mod config;
pub mod context;
pub mod fs;
pub mod hash;
pub mod process;
pub mod retry;

pub use config::Config;
pub use context::{Directories, GlobalContext};
pub use retry::RetryPolicy;
