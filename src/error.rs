// Error types for store operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced task, category or column does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound { kind, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
