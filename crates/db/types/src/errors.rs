use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DbError {
    #[error("IO Error: {0}")]
    IoError(String),

    #[error("codec error: {0}")]
    CodecError(String),

    /// Index entry points at a detail record that is missing.
    #[error("dangling index entry for task {0}")]
    DanglingIndexEntry(u64),

    #[error("worker thread exited without returning a result")]
    WorkerFailedStrangely,

    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Whether retrying the operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::IoError(_))
    }
}
