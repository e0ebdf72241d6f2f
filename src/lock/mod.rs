//! Named mutex - FIFO critical sections shared by the indexer and the social layer.
//!
//! The key space is closed: every lock the crate takes is a [`LockKey`]
//! variant, so two subsystems cannot collide on a free-form string.

mod error;
mod named;

pub use error::LockError;
pub use named::{LockGuard, NamedMutex};

/// Keys for the critical sections the crate serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Held by index updates and by `mark_all_read`.
    NotificationsUpdate,
    /// Held while walking the follow graph across every followed drive.
    ReadSocialGraph,
}

impl LockKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKey::NotificationsUpdate => "notifications-update",
            LockKey::ReadSocialGraph => "read-social-graph",
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
