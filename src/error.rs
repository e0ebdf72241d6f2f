//! Crate-level error type.

use thiserror::Error;

use crate::index::IndexError;
use crate::lock::LockError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    /// A write was rejected before touching any drive (missing title, bad URL, ...).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Whether this error means "the thing does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
