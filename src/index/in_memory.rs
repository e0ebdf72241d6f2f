//! MemoryIndexStore - BTreeMap-backed index store for testing and development.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{
    decode, encode, DriveCheckpoint, EventKey, IndexError, IndexStore, NotificationEvent,
};
use crate::key::DriveKey;

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventKey, Vec<u8>>,
    drives: BTreeMap<DriveKey, Vec<u8>>,
}

/// In-memory index store. Clone-friendly via Arc; clones share tables.
#[derive(Clone, Default)]
pub struct MemoryIndexStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndexStore {
    fn append_event(&self, event: &NotificationEvent) -> Result<bool, IndexError> {
        let bytes = encode(event)?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| IndexError::Poisoned("append"))?;
        let key = event.key();
        if tables.events.contains_key(&key) {
            return Ok(false);
        }
        tables.events.insert(key, bytes);
        Ok(true)
    }

    fn events(
        &self,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationEvent>, IndexError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| IndexError::Poisoned("events"))?;
        tables
            .events
            .values()
            .rev()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|bytes| decode(bytes))
            .collect()
    }

    fn count_events(&self) -> Result<usize, IndexError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| IndexError::Poisoned("count"))?;
        Ok(tables.events.len())
    }

    fn count_unread(&self) -> Result<usize, IndexError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| IndexError::Poisoned("count unread"))?;
        let mut unread = 0;
        for bytes in tables.events.values() {
            let event: NotificationEvent = decode(bytes)?;
            if !event.is_read {
                unread += 1;
            }
        }
        Ok(unread)
    }

    fn mark_all_read(&self) -> Result<usize, IndexError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| IndexError::Poisoned("mark all read"))?;
        let mut changed = 0;
        for bytes in tables.events.values_mut() {
            let mut event: NotificationEvent = decode(bytes)?;
            if !event.is_read {
                event.is_read = true;
                *bytes = encode(&event)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn checkpoint(&self, drive: &DriveKey) -> Result<Option<DriveCheckpoint>, IndexError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| IndexError::Poisoned("checkpoint"))?;
        tables.drives.get(drive).map(|bytes| decode(bytes)).transpose()
    }

    fn save_checkpoint(&self, checkpoint: &DriveCheckpoint) -> Result<(), IndexError> {
        let bytes = encode(checkpoint)?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| IndexError::Poisoned("save checkpoint"))?;
        if let Some(existing) = tables.drives.get(&checkpoint.url) {
            let existing: DriveCheckpoint = decode(existing)?;
            if existing.version > checkpoint.version {
                return Ok(());
            }
        }
        tables.drives.insert(checkpoint.url.clone(), bytes);
        Ok(())
    }

    fn checkpoints(&self) -> Result<Vec<DriveCheckpoint>, IndexError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| IndexError::Poisoned("checkpoints"))?;
        tables.drives.values().map(|bytes| decode(bytes)).collect()
    }
}
