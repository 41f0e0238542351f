//! Error types surfaced to callers of the pipeline
//!
//! Failures caused by caller misuse or missing setup are returned here and
//! never swallowed. Failures inside third-party plug-in code are isolated
//! where they happen and only show up in the log.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or broken setup
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Deregistering something that was never registered
    #[error("{item} is not registered for {capability}")]
    NotRegistered { capability: String, item: String },

    /// A data value the scene cannot store as an attribute
    #[error("Unsupported type for '{key}': {kind}")]
    UnsupportedType { key: String, kind: &'static str },

    /// Registry and discovery disagree; this is a bug
    #[error("Internal error: {0}")]
    Internal(String),

    /// `uninstall()` without a prior `install()`
    #[error("Pipeline is not installed")]
    NotInstalled,

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// A configuration or host hook failed
    #[error("Hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Setup problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration found, set {0}")]
    MissingConfig(&'static str),

    #[error("Unknown configuration: {0}")]
    UnknownConfig(String),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to read settings {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors reported by a scene backend
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("No object matches name: {0}")]
    NodeNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("{0}")]
    Backend(String),
}

impl Error {
    /// Create a not-registered error
    pub fn not_registered(capability: impl Into<String>, item: impl Into<String>) -> Self {
        Self::NotRegistered {
            capability: capability.into(),
            item: item.into(),
        }
    }

    /// Check whether this error comes from missing setup
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
