use sea_orm::DbErr;
use vitals_common::retry::Retriable;

/// Errors produced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested metric does not exist.
    #[error("storage: nothing found")]
    NotFound,

    /// An underlying database error.
    #[error("storage: database error: {0}")]
    Db(#[from] DbErr),

    /// A row held a value outside the expected domain.
    #[error("storage: unexpected value in column '{column}'")]
    UnexpectedColumnValue { column: &'static str },
}

impl Retriable for StorageError {
    /// Connection-class failures of the relational backend are worth a
    /// second attempt; everything else is not.
    fn is_retriable(&self) -> bool {
        matches!(
            self,
            StorageError::Db(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
        )
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
