//! Common error types.

use thiserror::Error;

/// Configuration errors surfaced at construction time.
///
/// These are fatal to the subcomponent that raised them: a misconfigured
/// adapter never gets built, a bad DSN never opens a pool.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("configuration file error: {path}: {message}")]
    File { path: String, message: String },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        ConfigError::Missing(key.into())
    }

    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn file(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::File {
            path: path.into(),
            message: message.into(),
        }
    }
}
