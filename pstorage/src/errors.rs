use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// Network, timeout, auth or malformed-response failure talking to the external source.
    #[error("Transport error on '{resource}': {message}")]
    Transport { resource: String, message: String },

    /// A raw record is missing a field required to build its canonical entity.
    #[error("Malformed {resource} record: {message}")]
    Shape { resource: String, message: String },

    #[error("Failed to persist collection '{collection}': {source}")]
    Persistence {
        collection: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A synchronization run is already in flight")]
    RunInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn transport(resource: impl Into<String>, message: impl ToString) -> Self {
        StorageError::Transport {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    pub fn shape(resource: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Shape {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
