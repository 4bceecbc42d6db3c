//! Host platform identifiers.
//!
//! The identifier strings (`win32`, `linux`, `darwin`) appear in build order
//! files, package config override directories, remote cache paths and cache
//! bundle metadata, so they must stay stable.

use std::fmt;
use std::str::FromStr;

/// Operating system a package set is built on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Win32,
    Linux,
    Darwin,
    Other(String),
}

impl Platform {
    /// The platform this binary runs on.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Win32
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other(std::env::consts::OS.to_string())
        }
    }

    /// Lower-cased identifier string.
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Win32 => "win32",
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Other(name) => name,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Win32)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err("platform name is empty".to_string());
        }
        Ok(match name.as_str() {
            "win32" | "windows" => Platform::Win32,
            "darwin" | "macos" => Platform::Darwin,
            "linux" => Platform::Linux,
            _ => Platform::Other(name),
        })
    }
}
