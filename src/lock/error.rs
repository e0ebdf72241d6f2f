use thiserror::Error;

/// Error type for named mutex operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The mutex registry was poisoned (a thread panicked while touching it).
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// The mutex service was closed; no further acquisitions are granted.
    #[error("lock service closed while acquiring {0}")]
    Closed(&'static str),
}
