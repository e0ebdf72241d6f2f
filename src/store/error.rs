use thiserror::Error;

/// Errors surfaced by a [`Drive`](super::Drive) or [`DriveNetwork`](super::DriveNetwork).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The drive could not be reached (offline peer, deleted drive, timeout).
    #[error("drive unreachable: {0}")]
    Unreachable(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("store lock poisoned during {0}")]
    Poisoned(&'static str),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
