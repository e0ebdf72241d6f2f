//! Background thread that keeps the notification index fresh.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::Notifications;
use crate::index::IndexStore;
use crate::key::DriveKey;

/// Statistics from the notification worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: usize,
    pub events_indexed: usize,
    pub drives_failed: usize,
    pub runs_failed: usize,
}

/// Runs [`Notifications::update_index`] for one user every poll interval.
///
/// ## Example
///
/// ```ignore
/// let worker = NotificationWorker::spawn(notifications.clone(), user, config.index.poll_interval());
/// // ...
/// let stats = worker.stop();
/// println!("indexed {} events", stats.events_indexed);
/// ```
pub struct NotificationWorker {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl NotificationWorker {
    /// Spawn the worker. The first run starts immediately.
    pub fn spawn<S>(
        notifications: Arc<Notifications<S>>,
        user: DriveKey,
        poll_interval: Duration,
    ) -> Self
    where
        S: IndexStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = WorkerStats::default();

            loop {
                stats.polls += 1;
                match notifications.update_index(&user) {
                    Ok(report) => {
                        stats.events_indexed += report.new_events;
                        stats.drives_failed += report.drives_failed;
                    }
                    Err(e) => {
                        // Closed lock or broken index; keep polling.
                        warn!(user = %user, error = %e, "index run failed");
                        stats.runs_failed += 1;
                    }
                }

                match stop_rx.recv_timeout(poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }

            debug!(polls = stats.polls, "notification worker stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the worker to stop and wait for it to finish.
    pub fn stop(mut self) -> WorkerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }

    /// Signal the worker to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for NotificationWorker {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
