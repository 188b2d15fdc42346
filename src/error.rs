use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl Error {
    /// Re-tag a failed store query as a retryable infrastructure error.
    ///
    /// Errors that already carry request semantics pass through unchanged.
    pub fn into_store_unavailable(self) -> Self {
        match self {
            Error::InvalidRequest(_)
            | Error::StoreUnavailable(_)
            | Error::Cancelled => self,
            other => Error::StoreUnavailable(other.to_string()),
        }
    }

    pub(crate) fn not_found(
        kind: &'static str,
        name: impl Into<String>,
    ) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}
