// src/error.rs
use thiserror::Error;

/// Errors surfaced by the core to an adapter caller.
///
/// Validation errors are raised at the boundary before an operation is
/// routed; the rest originate from inside a collection operation and are
/// wrapped into a response envelope by the adapter.
#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("update would mutate document id")]
    IdMutation,

    #[error("delete requires a non-empty filter; use drop to remove the whole collection")]
    EmptyDeleteFilter,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("corrupt collection file: {0}")]
    CorruptFile(String),
}

pub type Result<T> = std::result::Result<T, DocStoreError>;

impl From<std::io::Error> for DocStoreError {
    fn from(e: std::io::Error) -> Self {
        DocStoreError::StorageError(e.to_string())
    }
}

impl DocStoreError {
    /// Numeric status code used in the `{error: {message, code}}` envelope.
    pub fn code(&self) -> u16 {
        match self {
            DocStoreError::ValidationError(_) => 400,
            DocStoreError::NotFound(_) => 404,
            DocStoreError::IdMutation => 400,
            DocStoreError::EmptyDeleteFilter => 400,
            DocStoreError::StorageError(_) => 500,
            DocStoreError::CorruptFile(_) => 500,
        }
    }
}
