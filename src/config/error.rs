//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, loading, or validating `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file exists at the resolved path.
    #[error("config file not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`AppConfig`](super::AppConfig).
    #[error("failed to parse yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A required setting is missing or inconsistent.
    #[error("config validation failed: {0}")]
    Validation(String),

    /// A credential is empty or still holds its `${VAR}` placeholder.
    #[error("{name} not set in config or environment.\n\n{remediation}")]
    CredentialInvalid { name: String, remediation: String },

    /// The standalone finder could not locate a config next to the binary.
    #[error(
        "config.yaml not found\n\n\
         Standalone CLI requires config.yaml in the same directory as the binary.\n\
         Usage: place config.yaml next to the binary or use --config flag."
    )]
    StandaloneNotFound,
}
