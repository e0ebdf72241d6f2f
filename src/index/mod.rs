//! Local index store - the notification log and per-drive checkpoints.
//!
//! Two logical tables:
//!
//! - `events`: [`NotificationEvent`] rows keyed by [`EventKey`], iterated
//!   newest first.
//! - `drives`: one [`DriveCheckpoint`] per followed drive.
//!
//! Rows are encoded with `bitcode`. [`MemoryIndexStore`] keeps the tables in
//! `BTreeMap`s; `SledIndexStore` (feature `sled`) persists them on disk.

mod in_memory;
#[cfg(feature = "sled")]
mod sled_store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::DriveKey;

pub use in_memory::MemoryIndexStore;
#[cfg(feature = "sled")]
pub use sled_store::SledIndexStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index row codec error: {0}")]
    Codec(String),

    #[error("index storage error: {0}")]
    Storage(String),

    #[error("index lock poisoned during {0}")]
    Poisoned(&'static str),
}

impl From<bitcode::Error> for IndexError {
    fn from(err: bitcode::Error) -> Self {
        IndexError::Codec(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Vote,
    Comment,
    Follow,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Vote => "vote",
            EventKind::Comment => "comment",
            EventKind::Follow => "follow",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            EventKind::Vote => 0,
            EventKind::Comment => 1,
            EventKind::Follow => 2,
        }
    }
}

/// What happened, with the fields of the source record that matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDetail {
    Vote {
        /// URL of the vote record.
        url: String,
        href: String,
        vote: i8,
    },
    Comment {
        url: String,
        href: String,
        parent: Option<String>,
    },
    Follow {
        /// Mount name under the author's `/follows`.
        name: String,
        target: DriveKey,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::Vote { .. } => EventKind::Vote,
            EventDetail::Comment { .. } => EventKind::Comment,
            EventDetail::Follow { .. } => EventKind::Follow,
        }
    }

    /// Identity of the source record: its URL, or the mount name for follows.
    pub fn record(&self) -> &str {
        match self {
            EventDetail::Vote { url, .. } | EventDetail::Comment { url, .. } => url,
            EventDetail::Follow { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub author: DriveKey,
    /// Unix milliseconds from the record name when it is `<ms>.<ext>`, else
    /// its ctime.
    pub timestamp: i64,
    pub detail: EventDetail,
    pub is_read: bool,
}

impl NotificationEvent {
    pub fn new(author: DriveKey, timestamp: i64, detail: EventDetail) -> Self {
        NotificationEvent {
            author,
            timestamp,
            detail,
            is_read: false,
        }
    }

    pub fn event(&self) -> EventKind {
        self.detail.kind()
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            timestamp: self.timestamp,
            author: self.author.clone(),
            kind: self.event(),
            record: self.detail.record().to_string(),
        }
    }
}

/// Primary key of the `events` table. Orders by timestamp first, so iterating
/// keys in reverse yields newest-first; author, kind and record keep distinct
/// records that share a millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub timestamp: i64,
    pub author: DriveKey,
    pub kind: EventKind,
    pub record: String,
}

impl EventKey {
    /// Byte encoding whose lexicographic order matches `Ord`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(8 + self.author.as_str().len() + 1 + self.record.len());
        out.extend_from_slice(&((self.timestamp as u64) ^ (1 << 63)).to_be_bytes());
        out.extend_from_slice(self.author.as_str().as_bytes());
        out.push(self.kind.tag());
        out.extend_from_slice(self.record.as_bytes());
        out
    }
}

/// Last drive version the indexer fully processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCheckpoint {
    pub url: DriveKey,
    pub version: u64,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, IndexError> {
    Ok(bitcode::serialize(value)?)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, IndexError> {
    Ok(bitcode::deserialize(bytes)?)
}

/// Storage for the notification log and checkpoints.
///
/// Only the indexer and `mark_all_read` write, both under
/// [`LockKey::NotificationsUpdate`](crate::lock::LockKey::NotificationsUpdate).
pub trait IndexStore: Send + Sync {
    /// Insert `event` unless a row with the same key exists. Returns whether
    /// it was inserted.
    fn append_event(&self, event: &NotificationEvent) -> Result<bool, IndexError>;

    /// Page through events newest first.
    fn events(&self, offset: usize, limit: Option<usize>)
        -> Result<Vec<NotificationEvent>, IndexError>;

    fn count_events(&self) -> Result<usize, IndexError>;

    fn count_unread(&self) -> Result<usize, IndexError>;

    /// Flip every unread event to read. Returns how many changed.
    fn mark_all_read(&self) -> Result<usize, IndexError>;

    fn checkpoint(&self, drive: &DriveKey) -> Result<Option<DriveCheckpoint>, IndexError>;

    /// Store `checkpoint` unless a higher version is already recorded.
    fn save_checkpoint(&self, checkpoint: &DriveCheckpoint) -> Result<(), IndexError>;

    fn checkpoints(&self) -> Result<Vec<DriveCheckpoint>, IndexError>;
}

impl<T: IndexStore + ?Sized> IndexStore for std::sync::Arc<T> {
    fn append_event(&self, event: &NotificationEvent) -> Result<bool, IndexError> {
        (**self).append_event(event)
    }

    fn events(
        &self,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationEvent>, IndexError> {
        (**self).events(offset, limit)
    }

    fn count_events(&self) -> Result<usize, IndexError> {
        (**self).count_events()
    }

    fn count_unread(&self) -> Result<usize, IndexError> {
        (**self).count_unread()
    }

    fn mark_all_read(&self) -> Result<usize, IndexError> {
        (**self).mark_all_read()
    }

    fn checkpoint(&self, drive: &DriveKey) -> Result<Option<DriveCheckpoint>, IndexError> {
        (**self).checkpoint(drive)
    }

    fn save_checkpoint(&self, checkpoint: &DriveCheckpoint) -> Result<(), IndexError> {
        (**self).save_checkpoint(checkpoint)
    }

    fn checkpoints(&self) -> Result<Vec<DriveCheckpoint>, IndexError> {
        (**self).checkpoints()
    }
}
