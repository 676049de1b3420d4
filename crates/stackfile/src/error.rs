//! Error types for the stackfile crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading stack files
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading a stack file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// JSON syntax or shape error
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// File extension is neither `.toml` nor `.json`
    #[error("unsupported stack file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A `$`-keyed reference object is malformed
    #[error("invalid reference at {location}: {message}")]
    InvalidReference { location: String, message: String },

    /// A `${...}` placeholder is malformed
    #[error("invalid template at {location}: {message}")]
    InvalidTemplate { location: String, message: String },

    /// The declarations do not form a valid stack
    #[error("invalid stack in {}: {source}", .path.display())]
    Stack {
        path: PathBuf,
        #[source]
        source: stackgraph::Error,
    },
}

/// Result type for stackfile operations
pub type Result<T> = std::result::Result<T, Error>;
