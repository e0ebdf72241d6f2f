//! Validation and naming helpers for records written by the social layer.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use url::Url;

use crate::error::{Error, Result};
use crate::store::path;

/// Millisecond timestamps for record file names; strictly increasing within
/// one process so two records never share a name.
#[derive(Debug, Default)]
pub struct RecordClock {
    last: AtomicI64,
}

impl RecordClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Timestamp of a record named `<unix-ms>.<ext>` (`1700000000000.md` ->
/// 1700000000000). Names whose stem is not all digits, like the slug
/// `3d-printing-fans`, carry no timestamp.
pub fn timestamp_from_name(name: &str) -> Option<i64> {
    let base = path::basename(name);
    let stem = base.split_once('.').map_or(base, |(stem, _)| stem);
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Absolute URL with a non-empty host (`https://example.com/a`, `hd://<key>/x`).
pub fn is_valid_url(url: &str) -> bool {
    parse_url(url).is_some()
}

fn parse_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().is_some_and(|host| !host.is_empty()).then_some(parsed)
}

/// Trim and validate; a URL without a scheme is retried as `https://`.
pub fn normalize_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("url is required"));
    }
    if parse_url(trimmed).is_some() {
        return Ok(trimmed.to_string());
    }
    if !trimmed.contains("://") {
        let candidate = format!("https://{}", trimmed);
        if parse_url(&candidate).is_some() {
            return Ok(candidate);
        }
    }
    Err(Error::validation(format!("invalid url: {}", url)))
}

/// Lowercase, whitespace to `-`, keep only `[a-z0-9-_]`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        if c.is_whitespace() {
            if !out.ends_with('-') {
                out.push('-');
            }
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c.to_ascii_lowercase());
        }
    }
    out.trim_matches('-').to_string()
}

pub fn normalize_topic(topic: &str) -> Result<String> {
    let slug = slugify(topic);
    if slug.is_empty() {
        Err(Error::validation("topic is required"))
    } else {
        Ok(slug)
    }
}

pub fn require_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(Error::validation("title is required"))
    } else {
        Ok(trimmed.to_string())
    }
}
