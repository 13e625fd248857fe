//! Error types for keikai-apps

use std::path::PathBuf;

/// Launch invoker failures.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("launch target not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Icon resolution failures. Always handled inside the entry that asked.
#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("no icon resource for {0}")]
    MissingResource(String),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
