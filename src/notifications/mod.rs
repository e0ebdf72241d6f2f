//! Notification indexer - turns new records in followed drives into a local,
//! read-state-aware event log.
//!
//! Each [`update_index`](Notifications::update_index) run diffs every drive in
//! the user's follow graph against its checkpoint, applies the [`IndexRule`]s
//! and appends matches to the [`IndexStore`]. Runs and `mark_all_read` are
//! serialized on [`LockKey::NotificationsUpdate`].

mod rules;
mod worker;

use std::sync::Arc;
#[cfg(feature = "emitter")]
use std::sync::Mutex;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::{DriveCheckpoint, IndexStore, NotificationEvent};
use crate::key::DriveKey;
use crate::lock::LockKey;
use crate::social::SocialContext;

pub use rules::IndexRule;
pub use worker::{NotificationWorker, WorkerStats};

/// Emitter event fired after a run appended events; payload is the count.
pub const NEW_EVENTS: &str = "new-events";

/// Outcome of one index run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub drives_scanned: usize,
    pub drives_failed: usize,
    pub new_events: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOpts {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ListOpts {
    pub fn page(offset: usize, limit: usize) -> Self {
        ListOpts {
            offset,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountOpts {
    pub unread: bool,
}

pub struct Notifications<S: IndexStore> {
    social: Arc<SocialContext>,
    store: S,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
}

impl<S: IndexStore> Notifications<S> {
    pub fn new(social: Arc<SocialContext>, store: S) -> Self {
        Notifications {
            social,
            store,
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn social(&self) -> &Arc<SocialContext> {
        &self.social
    }

    /// Scan the follow graph of `user` for new events.
    ///
    /// A drive that fails to scan is logged and counted; its checkpoint stays
    /// where it was so the next run retries it.
    pub fn update_index(&self, user: &DriveKey) -> Result<IndexReport> {
        let guard = self
            .social
            .locks()
            .acquire(LockKey::NotificationsUpdate)?;

        let drives = self.social.follows().graph(user)?;
        let mut report = IndexReport::default();

        for drive in &drives {
            match self.scan(drive, user) {
                Ok(appended) => {
                    report.drives_scanned += 1;
                    report.new_events += appended;
                }
                Err(e) => {
                    warn!(drive = %drive, error = %e, "failed to index drive");
                    report.drives_failed += 1;
                }
            }
        }

        if report.new_events > 0 {
            self.broadcast(report.new_events);
        }
        guard.release();

        info!(
            user = %user,
            scanned = report.drives_scanned,
            failed = report.drives_failed,
            new_events = report.new_events,
            "index updated"
        );
        Ok(report)
    }

    /// Events newest first.
    pub fn list(&self, opts: ListOpts) -> Result<Vec<NotificationEvent>> {
        Ok(self.store.events(opts.offset, opts.limit)?)
    }

    pub fn count(&self, opts: CountOpts) -> Result<usize> {
        let count = if opts.unread {
            self.store.count_unread()?
        } else {
            self.store.count_events()?
        };
        Ok(count)
    }

    /// Mark every event read. Waits for a running index update to finish.
    pub fn mark_all_read(&self) -> Result<usize> {
        let _guard = self
            .social
            .locks()
            .acquire(LockKey::NotificationsUpdate)?;
        let changed = self.store.mark_all_read()?;
        debug!(changed, "marked notifications read");
        Ok(changed)
    }

    /// Call `listener` with the number of new events after each run that
    /// appended any. Returns the listener id.
    #[cfg(feature = "emitter")]
    pub fn on_new_events<F>(&self, listener: F) -> String
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        match self.emitter.lock() {
            Ok(mut emitter) => emitter.on(NEW_EVENTS, move |count: usize| listener(count)),
            Err(poisoned) => poisoned
                .into_inner()
                .on(NEW_EVENTS, move |count: usize| listener(count)),
        }
    }

    #[cfg(feature = "emitter")]
    fn broadcast(&self, count: usize) {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                let _ = emitter.emit(NEW_EVENTS, count);
            }
            Err(_) => warn!("notification emitter poisoned, dropping broadcast"),
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn broadcast(&self, count: usize) {
        debug!(count, "new events");
    }

    fn scan(&self, drive: &DriveKey, user: &DriveKey) -> Result<usize> {
        let handle = self.social.network().open(drive)?;
        let version = handle.get_info()?.version;

        // First contact starts from the current version; older history is
        // never reported.
        let since = match self.store.checkpoint(drive)? {
            Some(checkpoint) => checkpoint.version,
            None => version,
        };

        let mut appended = 0;
        if since < version {
            for rule in IndexRule::ALL {
                for change in handle.diff(since, rule.prefix())? {
                    if !rule.matches(&change, user) {
                        continue;
                    }
                    let Some(event) = rule.to_event(&change, drive) else {
                        continue;
                    };
                    if self.store.append_event(&event)? {
                        debug!(drive = %drive, event = event.event().as_str(), timestamp = event.timestamp, "indexed");
                        appended += 1;
                    }
                }
            }
        }

        self.store.save_checkpoint(&DriveCheckpoint {
            url: drive.clone(),
            version,
        })?;
        Ok(appended)
    }
}
