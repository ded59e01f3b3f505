//! Error types for rutero-core

use thiserror::Error;

/// Result type alias using rutero-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rutero-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Connectivity precondition not met; no partial work was attempted
    #[error("No internet connection")]
    NoConnectivity,

    /// The remote call completed but signaled failure
    #[error("Remote rejected the request: {0}")]
    RemoteRejected(String),

    /// An inbound payload did not match the expected shape
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Local store failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration could not be applied
    #[error("Migration error: {0}")]
    Migration(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
