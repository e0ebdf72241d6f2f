//! Values exchanged with the virtual store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::DriveKey;

/// Per-file metadata. Drives only store string values.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Mount,
}

/// Result of `stat`. Times are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub kind: EntryKind,
    pub size: u64,
    pub ctime: i64,
    pub mtime: i64,
    pub metadata: Metadata,
    pub mount: Option<DriveKey>,
    pub linkname: Option<String>,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_mount(&self) -> bool {
        self.kind == EntryKind::Mount
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    Name,
    Ctime,
    Mtime,
}

/// Selector for [`Drive::query`](super::Drive::query).
///
/// Each `path` is a glob where `*` and `?` match within one segment. Queries
/// descend through mounts, so `/profile/follows/*/posts/*/*` reaches the
/// posts of every followed drive.
#[derive(Debug, Clone, Default)]
pub struct QueryOpts {
    pub path: Vec<String>,
    pub kind: Option<EntryKind>,
    pub mount: Option<DriveKey>,
    pub metadata: Metadata,
    pub sort: Sort,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl QueryOpts {
    pub fn path(pattern: impl Into<String>) -> Self {
        QueryOpts {
            path: vec![pattern.into()],
            ..Default::default()
        }
    }

    pub fn paths<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        QueryOpts {
            path: patterns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn mount(mut self, target: DriveKey) -> Self {
        self.mount = Some(target);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether `stat` passes the kind, mount and metadata filters.
    pub fn accepts(&self, stat: &Stat) -> bool {
        if self.kind.is_some_and(|k| k != stat.kind) {
            return false;
        }
        if let Some(target) = &self.mount {
            if stat.mount.as_ref() != Some(target) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| stat.meta(k) == Some(v.as_str()))
    }
}

/// One match of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEntry {
    pub kind: EntryKind,
    /// Path as seen from the queried drive (may cross mounts).
    pub path: String,
    /// Canonical URL inside the drive that owns the entry.
    pub url: String,
    pub stat: Stat,
    /// Drive that owns the entry.
    pub drive: DriveKey,
    pub mount: Option<DriveKey>,
}

impl QueryEntry {
    pub fn name(&self) -> &str {
        super::path::basename(&self.path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOpts {
    pub metadata: Metadata,
    pub encoding: Encoding,
}

impl WriteOpts {
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Root metadata of a drive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub title: String,
    pub description: String,
    pub drive_type: Option<String>,
}

impl Manifest {
    pub fn titled(title: impl Into<String>) -> Self {
        Manifest {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn drive_type(mut self, drive_type: impl Into<String>) -> Self {
        self.drive_type = Some(drive_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    pub key: DriveKey,
    pub version: u64,
    pub manifest: Manifest,
}

impl DriveInfo {
    pub fn url(&self) -> String {
        self.key.url()
    }
}

/// One net change reported by [`Drive::diff`](super::Drive::diff).
///
/// `name` is relative to the prefix passed to `diff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Put {
        name: String,
        stat: Stat,
    },
    Del {
        name: String,
    },
    Mount {
        name: String,
        target: DriveKey,
        stat: Option<Stat>,
    },
    Unmount {
        name: String,
    },
}

impl Change {
    pub fn name(&self) -> &str {
        match self {
            Change::Put { name, .. }
            | Change::Del { name }
            | Change::Mount { name, .. }
            | Change::Unmount { name } => name,
        }
    }

    pub fn stat(&self) -> Option<&Stat> {
        match self {
            Change::Put { stat, .. } => Some(stat),
            Change::Mount { stat, .. } => stat.as_ref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Change::Put { .. } => "put",
            Change::Del { .. } => "del",
            Change::Mount { .. } => "mount",
            Change::Unmount { .. } => "unmount",
        }
    }
}
