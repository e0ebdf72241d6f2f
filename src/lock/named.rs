use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};

use super::{LockError, LockKey};

/// Ticket queue for one key. The lock is held while `serving < next_ticket`.
#[derive(Default)]
struct TicketQueue {
    next_ticket: u64,
    serving: u64,
}

impl TicketQueue {
    fn is_held(&self) -> bool {
        self.serving < self.next_ticket
    }
}

#[derive(Default)]
struct Registry {
    closed: bool,
    queues: HashMap<LockKey, TicketQueue>,
}

/// At-most-one-holder critical sections keyed by [`LockKey`].
///
/// Waiters are granted the lock in the order they called [`acquire`](Self::acquire).
/// Acquisition is not re-entrant: acquiring a key twice from the same thread
/// without releasing deadlocks.
pub struct NamedMutex {
    registry: Mutex<Registry>,
    wake: Condvar,
}

impl NamedMutex {
    pub fn new() -> Self {
        NamedMutex {
            registry: Mutex::new(Registry::default()),
            wake: Condvar::new(),
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>, LockError> {
        self.registry
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }

    /// Block until `key` is free and this caller is next in line.
    pub fn acquire(&self, key: LockKey) -> Result<LockGuard<'_>, LockError> {
        let mut registry = self.registry()?;
        if registry.closed {
            return Err(LockError::Closed(key.as_str()));
        }

        let queue = registry.queues.entry(key).or_default();
        let ticket = queue.next_ticket;
        queue.next_ticket += 1;

        loop {
            if registry.closed {
                return Err(LockError::Closed(key.as_str()));
            }
            let serving = registry.queues.get(&key).map(|q| q.serving);
            if serving == Some(ticket) {
                break;
            }
            registry = self
                .wake
                .wait(registry)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
        }

        Ok(LockGuard {
            mutex: self,
            key,
            released: false,
        })
    }

    /// Take the lock only if nobody holds or waits for it.
    pub fn try_acquire(&self, key: LockKey) -> Result<Option<LockGuard<'_>>, LockError> {
        let mut registry = self.registry()?;
        if registry.closed {
            return Err(LockError::Closed(key.as_str()));
        }

        let queue = registry.queues.entry(key).or_default();
        if queue.is_held() {
            return Ok(None);
        }
        queue.next_ticket += 1;

        Ok(Some(LockGuard {
            mutex: self,
            key,
            released: false,
        }))
    }

    /// Whether some caller currently holds `key`.
    pub fn is_held(&self, key: LockKey) -> Result<bool, LockError> {
        let registry = self.registry()?;
        Ok(registry.queues.get(&key).is_some_and(TicketQueue::is_held))
    }

    /// Refuse all further acquisitions and fail every pending waiter.
    ///
    /// Guards already handed out stay valid and release normally.
    pub fn close(&self) -> Result<(), LockError> {
        let mut registry = self.registry()?;
        registry.closed = true;
        self.wake.notify_all();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.registry().map(|r| r.closed).unwrap_or(true)
    }

    fn release_key(&self, key: LockKey) {
        // A poisoned registry cannot hand the lock on; waiters will observe
        // the poison themselves on their next wakeup.
        if let Ok(mut registry) = self.registry.lock() {
            if let Some(queue) = registry.queues.get_mut(&key) {
                if queue.is_held() {
                    queue.serving += 1;
                }
            }
            self.wake.notify_all();
        }
    }
}

impl Default for NamedMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a [`LockKey`]. Released explicitly or on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    mutex: &'a NamedMutex,
    key: LockKey,
    released: bool,
}

impl LockGuard<'_> {
    pub fn key(&self) -> LockKey {
        self.key
    }

    /// Hand the lock to the next waiter, if any.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.mutex.release_key(self.key);
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
