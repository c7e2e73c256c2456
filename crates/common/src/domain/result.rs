use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Transient failure delivering a batch; the batch is re-queued
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("endpoint returned status {status}: {excerpt}")]
    Status { status: u16, excerpt: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode batch: {0}")]
    Encode(String),
}

/// Snapshot load/save failure; the forwarder continues in memory-only mode
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("state store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure reading the host registries
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid registry snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}
