//! Error types for the VCam bridge
//!
//! Only the configuration and persistence edges can fail. The per-frame path
//! (scaling, binding reads and writes, marshalling, dispatch) never returns
//! an error and degrades to documented defaults instead.

use thiserror::Error;

/// Errors raised while loading, editing or saving bridge state
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerializeError(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown tracking mode: {0}")]
    UnknownTrackingMode(String),

    #[error("Mapping index {index} out of bounds for {mode} ({len} entries)")]
    MappingIndexOutOfBounds {
        mode: String,
        index: usize,
        len: usize,
    },

    #[error("Unsupported mapping document version: {0}")]
    UnsupportedVersion(u32),
}

/// Result alias for fallible bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
