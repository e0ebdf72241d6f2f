//! Incremental notification indexer and social-graph aggregation over
//! versioned, mountable drives.
//!
//! - [`store`] - the drive facade plus an in-memory network
//! - [`social`] - profiles, follows, posts, comments and votes
//! - [`notifications`] - the indexer, its rules and the polling worker
//! - [`index`] - the local event log and drive checkpoints
//! - [`lock`] - named FIFO mutexes shared by the above

pub mod config;
mod error;
pub mod index;
pub mod key;
pub mod lock;
pub mod notifications;
pub mod social;
pub mod store;

pub use config::{Config, IndexConfig, SocialConfig};
pub use error::{Error, Result};
pub use index::{
    DriveCheckpoint, EventDetail, EventKind, IndexError, IndexStore, MemoryIndexStore,
    NotificationEvent,
};
#[cfg(feature = "sled")]
pub use index::SledIndexStore;
pub use key::DriveKey;
pub use lock::{LockError, LockGuard, LockKey, NamedMutex};
pub use notifications::{IndexReport, IndexRule, NotificationWorker, Notifications};
pub use social::SocialContext;
pub use store::{Drive, DriveNetwork, MemoryNetwork, StoreError};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
