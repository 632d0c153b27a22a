//! Error types shared across the engine.

use thiserror::Error;

/// Failures reported by the host room/document state.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Scene path rejected: {0}")]
    InvalidPath(String),
    #[error("Write permission required")]
    ReadOnly,
    #[error("CRDT error: {0}")]
    Crdt(#[from] loro::LoroError),
    #[error("Room error: {0}")]
    Other(String),
}

/// Failures reported by a broadcast transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Configuration parsing failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors returned from [`crate::RenderSession`] construction.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type RoomResult<T> = Result<T, RoomError>;
pub type TransportResult<T> = Result<T, TransportError>;
