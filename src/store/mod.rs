//! Virtual store facade - versioned, path-addressed, mountable drives.
//!
//! The social layer and the indexer only ever talk to drives through the
//! [`Drive`] and [`DriveNetwork`] traits. [`MemoryNetwork`] is a complete
//! in-process backend used by the tests; a peer-to-peer backend implements
//! the same traits over the network.
//!
//! ## Example
//!
//! ```
//! use socialdrive::store::{Drive, DriveNetwork, Manifest, MemoryNetwork, QueryOpts, WriteOpts};
//!
//! let network = MemoryNetwork::new();
//! let key = network.create_drive(Manifest::titled("alice"));
//! let drive = network.open(&key).unwrap();
//!
//! drive.mkdir("/votes").unwrap();
//! drive
//!     .write_file("/votes/1700000000000.goto", "", &WriteOpts::default().meta("vote", "1"))
//!     .unwrap();
//!
//! let entries = drive.query(&QueryOpts::path("/votes/*")).unwrap();
//! assert_eq!(entries.len(), 1);
//! ```

mod error;
mod in_memory;
pub mod path;
mod read;
mod types;

use std::sync::Arc;

use crate::key::DriveKey;

pub use error::StoreError;
pub use in_memory::{MemoryDrive, MemoryNetwork};
pub use read::{ensure_dir, ensure_mount, is_binary_path, query_read, FileBody, ReadEntry};
pub use types::{
    Change, DriveInfo, Encoding, EntryKind, Manifest, Metadata, QueryEntry, QueryOpts, Sort, Stat,
    WriteOpts,
};

/// One versioned drive. Every mutation bumps the drive's version.
///
/// Paths are absolute (`/posts/news/1.md`). Reads and writes follow mounts,
/// so `/profile/posts` on a filesystem drive addresses `/posts` in the drive
/// mounted at `/profile`.
pub trait Drive: Send + Sync {
    fn key(&self) -> &DriveKey;

    fn get_info(&self) -> Result<DriveInfo, StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing lives at `path`.
    fn stat(&self, path: &str) -> Result<Stat, StoreError>;

    fn query(&self, opts: &QueryOpts) -> Result<Vec<QueryEntry>, StoreError>;

    fn read_file(&self, path: &str, encoding: Encoding) -> Result<String, StoreError>;

    fn write_file(&self, path: &str, content: &str, opts: &WriteOpts) -> Result<(), StoreError>;

    fn unlink(&self, path: &str) -> Result<(), StoreError>;

    fn mkdir(&self, path: &str) -> Result<(), StoreError>;

    fn mount(&self, path: &str, target: &DriveKey) -> Result<(), StoreError>;

    fn unmount(&self, path: &str) -> Result<(), StoreError>;

    /// Net changes under `prefix` between `since` and the current version,
    /// ordered by when each path last changed.
    fn diff(&self, since: u64, prefix: &str) -> Result<Vec<Change>, StoreError>;
}

/// Entry point to every drive the installation can reach.
pub trait DriveNetwork: Send + Sync {
    /// Turn a human-readable name into a drive key.
    fn resolve_name(&self, name: &str) -> Result<DriveKey, StoreError>;

    fn open(&self, key: &DriveKey) -> Result<Arc<dyn Drive>, StoreError>;
}
