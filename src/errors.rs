use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn file_io(context: &str, err: std::io::Error) -> Self {
        CacheError::FileIo(format!("{context}: {err}"))
    }
}
