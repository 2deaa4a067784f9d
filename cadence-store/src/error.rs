use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested row does not exist. Callers branch on this variant.
    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("key component of {len} bytes exceeds {max}")]
    OversizedKeyComponent { len: usize, max: usize },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
