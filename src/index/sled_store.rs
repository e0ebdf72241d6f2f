//! SledIndexStore - on-disk index store, one sled database per installation.

use std::path::Path;

use super::{
    decode, encode, DriveCheckpoint, IndexError, IndexStore, NotificationEvent,
};
use crate::config::IndexConfig;
use crate::key::DriveKey;

const EVENTS_TREE: &str = "events";
const DRIVES_TREE: &str = "drives";

impl From<sled::Error> for IndexError {
    fn from(err: sled::Error) -> Self {
        IndexError::Storage(err.to_string())
    }
}

#[derive(Clone)]
pub struct SledIndexStore {
    db: sled::Db,
    events: sled::Tree,
    drives: sled::Tree,
}

impl SledIndexStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open the database at `config.path`; without a path the index lives in
    /// a temporary database.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        match &config.path {
            Some(path) => Self::open(path),
            None => Self::temporary(),
        }
    }

    /// Throwaway database, removed when dropped.
    pub fn temporary() -> Result<Self, IndexError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, IndexError> {
        let events = db.open_tree(EVENTS_TREE)?;
        let drives = db.open_tree(DRIVES_TREE)?;
        Ok(Self { db, events, drives })
    }

    pub fn flush(&self) -> Result<(), IndexError> {
        self.db.flush()?;
        Ok(())
    }
}

impl IndexStore for SledIndexStore {
    fn append_event(&self, event: &NotificationEvent) -> Result<bool, IndexError> {
        let value = encode(event)?;
        let swapped = self
            .events
            .compare_and_swap(event.key().to_bytes(), None as Option<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    fn events(
        &self,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationEvent>, IndexError> {
        self.events
            .iter()
            .rev()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| {
                let (_, value) = row?;
                decode(&value)
            })
            .collect()
    }

    fn count_events(&self) -> Result<usize, IndexError> {
        Ok(self.events.len())
    }

    fn count_unread(&self) -> Result<usize, IndexError> {
        let mut unread = 0;
        for row in self.events.iter() {
            let (_, value) = row?;
            let event: NotificationEvent = decode(&value)?;
            if !event.is_read {
                unread += 1;
            }
        }
        Ok(unread)
    }

    fn mark_all_read(&self) -> Result<usize, IndexError> {
        let mut batch = sled::Batch::default();
        let mut changed = 0;
        for row in self.events.iter() {
            let (key, value) = row?;
            let mut event: NotificationEvent = decode(&value)?;
            if !event.is_read {
                event.is_read = true;
                batch.insert(key, encode(&event)?);
                changed += 1;
            }
        }
        self.events.apply_batch(batch)?;
        Ok(changed)
    }

    fn checkpoint(&self, drive: &DriveKey) -> Result<Option<DriveCheckpoint>, IndexError> {
        match self.drives.get(drive.as_str().as_bytes())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    fn save_checkpoint(&self, checkpoint: &DriveCheckpoint) -> Result<(), IndexError> {
        if let Some(existing) = self.checkpoint(&checkpoint.url)? {
            if existing.version > checkpoint.version {
                return Ok(());
            }
        }
        self.drives
            .insert(checkpoint.url.as_str().as_bytes(), encode(checkpoint)?)?;
        Ok(())
    }

    fn checkpoints(&self) -> Result<Vec<DriveCheckpoint>, IndexError> {
        self.drives
            .iter()
            .map(|row| {
                let (_, value) = row?;
                decode(&value)
            })
            .collect()
    }
}
