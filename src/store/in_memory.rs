//! MemoryNetwork - HashMap-backed drives for testing and development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use super::path::{self, glob_segment};
use super::{
    Change, Drive, DriveInfo, DriveNetwork, Encoding, EntryKind, Manifest, Metadata, QueryEntry,
    QueryOpts, Sort, Stat, StoreError, WriteOpts,
};
use crate::key::DriveKey;

/// Mount chains longer than this are treated as cycles.
const MAX_MOUNT_HOPS: usize = 16;

#[derive(Clone)]
enum NodeKind {
    File(Vec<u8>),
    Directory,
    Mount(DriveKey),
}

#[derive(Clone)]
struct Node {
    kind: NodeKind,
    metadata: Metadata,
    ctime: i64,
    mtime: i64,
}

impl Node {
    fn stat(&self) -> Stat {
        let (kind, size, mount) = match &self.kind {
            NodeKind::File(bytes) => (EntryKind::File, bytes.len() as u64, None),
            NodeKind::Directory => (EntryKind::Directory, 0, None),
            NodeKind::Mount(target) => (EntryKind::Mount, 0, Some(target.clone())),
        };
        Stat {
            kind,
            size,
            ctime: self.ctime,
            mtime: self.mtime,
            metadata: self.metadata.clone(),
            mount,
            linkname: None,
        }
    }
}

fn root_stat(ctime: i64) -> Stat {
    Stat {
        kind: EntryKind::Directory,
        size: 0,
        ctime,
        mtime: ctime,
        metadata: Metadata::new(),
        mount: None,
        linkname: None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Put,
    Del,
    Mount,
    Unmount,
}

struct LogEntry {
    version: u64,
    op: Op,
    path: String,
}

struct DriveState {
    manifest: Manifest,
    created: i64,
    version: u64,
    nodes: BTreeMap<String, Node>,
    log: Vec<LogEntry>,
}

impl DriveState {
    fn new(manifest: Manifest, now: i64) -> Self {
        DriveState {
            manifest,
            created: now,
            version: 1,
            nodes: BTreeMap::new(),
            log: Vec::new(),
        }
    }

    fn record(&mut self, op: Op, path: &str) {
        self.version += 1;
        self.log.push(LogEntry {
            version: self.version,
            op,
            path: path.to_string(),
        });
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
        self.nodes
            .iter()
            .filter(move |(p, _)| p.as_str() != "/" && path::parent(p) == dir)
            .map(|(p, n)| (path::basename(p), n))
    }

    fn require_parent_dir(&self, target: &str) -> Result<(), StoreError> {
        let parent = path::parent(target);
        if parent == "/" {
            return Ok(());
        }
        match self.nodes.get(parent).map(|n| &n.kind) {
            Some(NodeKind::Directory) => Ok(()),
            Some(_) => Err(StoreError::NotADirectory(parent.to_string())),
            None => Err(StoreError::NotFound(parent.to_string())),
        }
    }
}

#[derive(Default)]
struct Inner {
    drives: HashMap<DriveKey, DriveState>,
    names: HashMap<String, DriveKey>,
    unreachable: HashSet<DriveKey>,
}

impl Inner {
    fn state(&self, key: &DriveKey) -> Result<&DriveState, StoreError> {
        if self.unreachable.contains(key) {
            return Err(StoreError::Unreachable(key.url()));
        }
        self.drives
            .get(key)
            .ok_or_else(|| StoreError::Unreachable(key.url()))
    }

    fn state_mut(&mut self, key: &DriveKey) -> Result<&mut DriveState, StoreError> {
        if self.unreachable.contains(key) {
            return Err(StoreError::Unreachable(key.url()));
        }
        self.drives
            .get_mut(key)
            .ok_or_else(|| StoreError::Unreachable(key.url()))
    }

    /// Follow mounts along `path` until the final segment; returns the owning
    /// drive and the path inside it.
    fn resolve(&self, key: &DriveKey, path: &str) -> Result<(DriveKey, String), StoreError> {
        let normalized = path::normalize(path)?;
        let segments: Vec<&str> = path::segments(&normalized).collect();
        let mut owner = key.clone();
        let mut inner = String::from("/");
        let mut hops = 0;

        for (i, segment) in segments.iter().enumerate() {
            let candidate = path::join(&inner, segment);
            let is_last = i + 1 == segments.len();
            let state = self.state(&owner)?;
            match state.nodes.get(&candidate).map(|n| &n.kind) {
                Some(NodeKind::Mount(target)) if !is_last => {
                    hops += 1;
                    if hops > MAX_MOUNT_HOPS {
                        return Err(StoreError::InvalidPath(normalized.clone()));
                    }
                    owner = target.clone();
                    inner = String::from("/");
                }
                _ => inner = candidate,
            }
        }

        Ok((owner, inner))
    }

    fn walk(
        &self,
        drive: &DriveKey,
        dir: &str,
        display: &str,
        patterns: &[&str],
        hops: usize,
        out: &mut Vec<QueryEntry>,
    ) {
        let Some((pattern, rest)) = patterns.split_first() else {
            return;
        };
        let state = match self.state(drive) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(drive = %drive, error = %e, "skipping unreachable drive during query");
                return;
            }
        };

        for (name, node) in state.children(dir) {
            if !glob_segment(pattern, name) {
                continue;
            }
            let inner_path = path::join(dir, name);
            let display_path = path::join(display, name);

            if rest.is_empty() {
                let stat = node.stat();
                out.push(QueryEntry {
                    kind: stat.kind,
                    path: display_path,
                    url: drive.join(&inner_path),
                    mount: stat.mount.clone(),
                    stat,
                    drive: drive.clone(),
                });
                continue;
            }

            match &node.kind {
                NodeKind::Directory => {
                    self.walk(drive, &inner_path, &display_path, rest, hops, out)
                }
                NodeKind::Mount(target) if hops < MAX_MOUNT_HOPS => {
                    self.walk(target, "/", &display_path, rest, hops + 1, out)
                }
                _ => {}
            }
        }
    }
}

/// In-memory network of drives.
///
/// Cloning shares the underlying drives. Every drive is writable by anyone
/// holding the network.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<RwLock<Inner>>,
    seq: Arc<AtomicU64>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned("read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned("write"))
    }

    fn next_key(&self) -> DriveKey {
        // splitmix64 over a counter: distinct, random-looking keys.
        let mut bytes = [0u8; 32];
        let mut z = self.seq.fetch_add(1, Ordering::Relaxed);
        for chunk in bytes.chunks_mut(8) {
            z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut x = z;
            x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            x ^= x >> 31;
            chunk.copy_from_slice(&x.to_be_bytes());
        }
        DriveKey::from_bytes(&bytes)
    }

    /// Create an empty drive at version 1.
    pub fn create_drive(&self, manifest: Manifest) -> DriveKey {
        let key = self.next_key();
        let now = Utc::now().timestamp_millis();
        if let Ok(mut inner) = self.write() {
            inner.drives.insert(key.clone(), DriveState::new(manifest, now));
        }
        key
    }

    /// Make `name` resolvable to `key`.
    pub fn register_name(&self, name: &str, key: &DriveKey) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.names.insert(name.to_ascii_lowercase(), key.clone());
        Ok(())
    }

    /// Simulate a peer going offline (or coming back).
    pub fn set_unreachable(&self, key: &DriveKey, unreachable: bool) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if unreachable {
            inner.unreachable.insert(key.clone());
        } else {
            inner.unreachable.remove(key);
        }
        Ok(())
    }

    /// Forget a drive entirely. Mounts pointing at it dangle.
    pub fn delete_drive(&self, key: &DriveKey) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        Ok(inner.drives.remove(key).is_some())
    }

    /// Typed handle to one drive.
    pub fn drive(&self, key: &DriveKey) -> Result<MemoryDrive, StoreError> {
        self.read()?.state(key)?;
        Ok(MemoryDrive {
            key: key.clone(),
            network: self.clone(),
        })
    }
}

impl DriveNetwork for MemoryNetwork {
    fn resolve_name(&self, name: &str) -> Result<DriveKey, StoreError> {
        if let Ok(key) = DriveKey::parse(name) {
            return Ok(key);
        }
        let bare = name
            .trim()
            .trim_start_matches(crate::key::SCHEME)
            .trim_end_matches('/')
            .to_ascii_lowercase();
        self.read()?
            .names
            .get(&bare)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn open(&self, key: &DriveKey) -> Result<Arc<dyn Drive>, StoreError> {
        Ok(Arc::new(self.drive(key)?))
    }
}

/// Handle to one drive of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryDrive {
    key: DriveKey,
    network: MemoryNetwork,
}

impl MemoryDrive {
    fn mutate<F>(&self, path: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut DriveState, &str, i64) -> Result<(), StoreError>,
    {
        let mut inner = self.network.write()?;
        let (owner, inner_path) = inner.resolve(&self.key, path)?;
        if inner_path == "/" {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let now = Utc::now().timestamp_millis();
        let state = inner.state_mut(&owner)?;
        f(state, &inner_path, now)
    }
}

impl Drive for MemoryDrive {
    fn key(&self) -> &DriveKey {
        &self.key
    }

    fn get_info(&self) -> Result<DriveInfo, StoreError> {
        let inner = self.network.read()?;
        let state = inner.state(&self.key)?;
        Ok(DriveInfo {
            key: self.key.clone(),
            version: state.version,
            manifest: state.manifest.clone(),
        })
    }

    fn stat(&self, path: &str) -> Result<Stat, StoreError> {
        let inner = self.network.read()?;
        let (owner, inner_path) = inner.resolve(&self.key, path)?;
        let state = inner.state(&owner)?;
        if inner_path == "/" {
            return Ok(root_stat(state.created));
        }
        state
            .nodes
            .get(&inner_path)
            .map(Node::stat)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn query(&self, opts: &QueryOpts) -> Result<Vec<QueryEntry>, StoreError> {
        let inner = self.network.read()?;
        inner.state(&self.key)?;

        let mut found = Vec::new();
        for pattern in &opts.path {
            let normalized = path::normalize(pattern)?;
            let patterns: Vec<&str> = path::segments(&normalized).collect();
            inner.walk(&self.key, "/", "/", &patterns, 0, &mut found);
        }
        drop(inner);

        let mut results: Vec<QueryEntry> =
            found.into_iter().filter(|e| opts.accepts(&e.stat)).collect();
        match opts.sort {
            Sort::Name => results.sort_by(|a, b| a.path.cmp(&b.path)),
            Sort::Ctime => {
                results.sort_by(|a, b| a.stat.ctime.cmp(&b.stat.ctime).then(a.path.cmp(&b.path)))
            }
            Sort::Mtime => {
                results.sort_by(|a, b| a.stat.mtime.cmp(&b.stat.mtime).then(a.path.cmp(&b.path)))
            }
        }
        if opts.reverse {
            results.reverse();
        }

        let limit = opts.limit.unwrap_or(usize::MAX);
        Ok(results.into_iter().skip(opts.offset).take(limit).collect())
    }

    fn read_file(&self, path: &str, encoding: Encoding) -> Result<String, StoreError> {
        let inner = self.network.read()?;
        let (owner, inner_path) = inner.resolve(&self.key, path)?;
        let state = inner.state(&owner)?;
        match state.nodes.get(&inner_path).map(|n| &n.kind) {
            Some(NodeKind::File(bytes)) => match encoding {
                Encoding::Utf8 => String::from_utf8(bytes.clone())
                    .map_err(|e| StoreError::Encoding(format!("{}: {}", path, e))),
                Encoding::Base64 => Ok(STANDARD.encode(bytes)),
            },
            Some(_) => Err(StoreError::InvalidPath(format!("{} is not a file", path))),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    fn write_file(&self, path: &str, content: &str, opts: &WriteOpts) -> Result<(), StoreError> {
        let bytes = match opts.encoding {
            Encoding::Utf8 => content.as_bytes().to_vec(),
            Encoding::Base64 => STANDARD
                .decode(content)
                .map_err(|e| StoreError::Encoding(format!("{}: {}", path, e)))?,
        };
        let metadata = opts.metadata.clone();

        self.mutate(path, move |state, target, now| {
            state.require_parent_dir(target)?;
            let ctime = match state.nodes.get(target) {
                Some(Node {
                    kind: NodeKind::File(_),
                    ctime,
                    ..
                }) => *ctime,
                Some(_) => return Err(StoreError::AlreadyExists(target.to_string())),
                None => now,
            };
            state.nodes.insert(
                target.to_string(),
                Node {
                    kind: NodeKind::File(bytes),
                    metadata,
                    ctime,
                    mtime: now,
                },
            );
            state.record(Op::Put, target);
            Ok(())
        })
    }

    fn unlink(&self, path: &str) -> Result<(), StoreError> {
        self.mutate(path, |state, target, _| {
            match state.nodes.get(target).map(|n| &n.kind) {
                Some(NodeKind::File(_)) => {}
                Some(_) => return Err(StoreError::InvalidPath(format!("{} is not a file", target))),
                None => return Err(StoreError::NotFound(target.to_string())),
            }
            state.nodes.remove(target);
            state.record(Op::Del, target);
            Ok(())
        })
    }

    fn mkdir(&self, path: &str) -> Result<(), StoreError> {
        self.mutate(path, |state, target, now| {
            if state.nodes.contains_key(target) {
                return Err(StoreError::AlreadyExists(target.to_string()));
            }
            state.require_parent_dir(target)?;
            state.nodes.insert(
                target.to_string(),
                Node {
                    kind: NodeKind::Directory,
                    metadata: Metadata::new(),
                    ctime: now,
                    mtime: now,
                },
            );
            state.record(Op::Put, target);
            Ok(())
        })
    }

    fn mount(&self, path: &str, target_key: &DriveKey) -> Result<(), StoreError> {
        let target_key = target_key.clone();
        self.mutate(path, move |state, target, now| {
            if state.nodes.contains_key(target) {
                return Err(StoreError::AlreadyExists(target.to_string()));
            }
            state.require_parent_dir(target)?;
            state.nodes.insert(
                target.to_string(),
                Node {
                    kind: NodeKind::Mount(target_key),
                    metadata: Metadata::new(),
                    ctime: now,
                    mtime: now,
                },
            );
            state.record(Op::Mount, target);
            Ok(())
        })
    }

    fn unmount(&self, path: &str) -> Result<(), StoreError> {
        self.mutate(path, |state, target, _| {
            match state.nodes.get(target).map(|n| &n.kind) {
                Some(NodeKind::Mount(_)) => {}
                _ => return Err(StoreError::NotFound(target.to_string())),
            }
            state.nodes.remove(target);
            state.record(Op::Unmount, target);
            Ok(())
        })
    }

    fn diff(&self, since: u64, prefix: &str) -> Result<Vec<Change>, StoreError> {
        let prefix = path::normalize(prefix)?;
        let inner = self.network.read()?;
        let state = inner.state(&self.key)?;

        // Latest log entry per path, ordered by the version it happened at.
        let mut latest: BTreeMap<&str, (u64, Op)> = BTreeMap::new();
        for entry in state.log.iter().filter(|e| e.version > since) {
            if path::is_within(&entry.path, &prefix) && entry.path != prefix {
                latest.insert(entry.path.as_str(), (entry.version, entry.op));
            }
        }
        let mut ordered: Vec<(&str, u64, Op)> =
            latest.into_iter().map(|(p, (v, op))| (p, v, op)).collect();
        ordered.sort_by_key(|(_, version, _)| *version);

        let mut changes = Vec::with_capacity(ordered.len());
        for (full, _, op) in ordered {
            let name = path::relative_to(full, &prefix).to_string();
            let node = state.nodes.get(full);
            let change = match (op, node) {
                (Op::Del, _) => Change::Del { name },
                (Op::Unmount, _) => Change::Unmount { name },
                (_, Some(node)) => match &node.kind {
                    NodeKind::Mount(target) => Change::Mount {
                        name,
                        target: target.clone(),
                        stat: Some(node.stat()),
                    },
                    _ => Change::Put {
                        name,
                        stat: node.stat(),
                    },
                },
                (_, None) => Change::Del { name },
            };
            changes.push(change);
        }

        Ok(changes)
    }
}
