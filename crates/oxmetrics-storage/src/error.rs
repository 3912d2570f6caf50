/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use oxmetrics_storage::error::StorageError;
///
/// let err = StorageError::NotFound { id: "PollCount".to_string() };
/// assert!(err.to_string().contains("PollCount"));
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The update carries an empty id.
    #[error("Storage: cannot update metric: invalid format")]
    InvalidFormat,

    /// No metric is stored under the requested id.
    #[error("Storage: metric <{id}> doesn't exist")]
    NotFound { id: String },

    /// The backend was closed or never initialized.
    #[error("Storage: storage is not initialized")]
    NotInitialized,

    /// A snapshot operation was requested on a store created without a file path.
    #[error("Storage: snapshot file path is not configured")]
    SnapshotPathMissing,

    /// File-system failure while reading or writing a snapshot.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot line could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A column contained a value that does not map onto a metric field.
    #[error("Storage: unexpected value in column '{column}': expected {expected}")]
    UnexpectedColumnType {
        column: &'static str,
        expected: &'static str,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// True when a snapshot file simply does not exist yet.
    pub fn is_missing_snapshot(&self) -> bool {
        matches!(self, StorageError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
