//! Query-and-read helpers plus the best-effort `ensure_*` operations.

use std::thread;

use tracing::{debug, warn};

use super::path;
use super::{Drive, Encoding, EntryKind, QueryEntry, QueryOpts, StoreError};
use crate::key::DriveKey;

/// Extensions whose bodies are never read as text.
const BINARY_EXTENSIONS: &[&str] = &[
    "goto", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "mp3", "mp4", "m4a", "ogg",
    "oga", "wav", "webm", "mov", "pdf", "zip", "gz", "tar", "woff", "woff2", "ttf",
];

pub fn is_binary_path(p: &str) -> bool {
    path::extension(p).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileBody {
    Text(String),
    Json(serde_json::Value),
}

impl FileBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileBody::Text(text) => Some(text),
            FileBody::Json(_) => None,
        }
    }
}

/// A query match together with its body, when one was read.
#[derive(Debug, Clone)]
pub struct ReadEntry {
    pub entry: QueryEntry,
    pub body: Option<FileBody>,
}

impl ReadEntry {
    pub fn text(&self) -> Option<&str> {
        self.body.as_ref().and_then(FileBody::as_text)
    }
}

fn read_body(drive: &dyn Drive, entry: &QueryEntry) -> Option<FileBody> {
    if entry.kind != EntryKind::File || is_binary_path(&entry.path) {
        return None;
    }
    match drive.read_file(&entry.path, Encoding::Utf8) {
        Ok(text) if path::extension(&entry.path).as_deref() == Some("json") => {
            match serde_json::from_str(&text) {
                Ok(value) => Some(FileBody::Json(value)),
                Err(_) => Some(FileBody::Text(text)),
            }
        }
        Ok(text) => Some(FileBody::Text(text)),
        Err(e) => {
            debug!(path = %entry.path, error = %e, "failed to read query result");
            None
        }
    }
}

/// Run `opts` and read every matching file, at most `chunk_size` at a time.
///
/// Unreadable files come back with `body: None` instead of failing the whole
/// query.
pub fn query_read(
    drive: &dyn Drive,
    opts: &QueryOpts,
    chunk_size: usize,
) -> Result<Vec<ReadEntry>, StoreError> {
    let entries = drive.query(opts)?;
    let mut out = Vec::with_capacity(entries.len());

    for chunk in entries.chunks(chunk_size.max(1)) {
        let bodies: Vec<Option<FileBody>> = thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|entry| scope.spawn(move || read_body(drive, entry)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(None))
                .collect()
        });
        out.extend(
            chunk
                .iter()
                .cloned()
                .zip(bodies)
                .map(|(entry, body)| ReadEntry { entry, body }),
        );
    }

    Ok(out)
}

/// Create `dir` unless something already lives there. Failures are logged.
pub fn ensure_dir(drive: &dyn Drive, dir: &str) {
    match drive.stat(dir) {
        Ok(stat) if stat.is_directory() || stat.is_mount() => {}
        Ok(_) => warn!(path = dir, "expected a directory, found a file"),
        Err(e) if e.is_not_found() => {
            if let Err(e) = drive.mkdir(dir) {
                warn!(path = dir, error = %e, "failed to create directory");
            }
        }
        Err(e) => warn!(path = dir, error = %e, "failed to stat directory"),
    }
}

/// Make `at` a mount of `target`, replacing a mount of some other drive.
/// Failures are logged.
pub fn ensure_mount(drive: &dyn Drive, at: &str, target: &DriveKey) {
    match drive.stat(at) {
        Ok(stat) if stat.mount.as_ref() == Some(target) => {}
        Ok(stat) if stat.is_mount() => {
            if let Err(e) = drive.unmount(at).and_then(|_| drive.mount(at, target)) {
                warn!(path = at, error = %e, "failed to replace mount");
            }
        }
        Ok(_) => warn!(path = at, "cannot mount over an existing entry"),
        Err(e) if e.is_not_found() => {
            if let Err(e) = drive.mount(at, target) {
                warn!(path = at, error = %e, "failed to create mount");
            }
        }
        Err(e) => warn!(path = at, error = %e, "failed to stat mount point"),
    }
}
