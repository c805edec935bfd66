//! Store-specific error types and conversions.

use tessera_core::error::TesseraError;

/// Store-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<StoreError> for TesseraError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => TesseraError::NotFound { entity, id },
            other => TesseraError::Database(other.to_string()),
        }
    }
}
