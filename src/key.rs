//! Drive identities and `hd://` URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// URL scheme of every drive-addressed record.
pub const SCHEME: &str = "hd://";

const KEY_LEN: usize = 64;

/// Canonical identity of one versioned drive: 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriveKey(String);

impl DriveKey {
    /// Parse a bare key or any `hd://<key>/...` URL.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        let host = match trimmed.strip_prefix(SCHEME) {
            Some(rest) => rest.split('/').next().unwrap_or_default(),
            None => trimmed,
        };
        if host.len() == KEY_LEN && host.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(DriveKey(host.to_ascii_lowercase()))
        } else {
            Err(Error::Validation(format!("not a drive key: {}", input)))
        }
    }

    /// Build a key from raw bytes (hex-encodes the first 32).
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut hex = String::with_capacity(KEY_LEN);
        for b in bytes {
            hex.push_str(&format!("{:02x}", b));
        }
        DriveKey(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `hd://<key>`
    pub fn url(&self) -> String {
        format!("{}{}", SCHEME, self.0)
    }

    /// URL of `path` inside this drive.
    pub fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}{}", SCHEME, self.0, path)
        } else {
            format!("{}{}/{}", SCHEME, self.0, path)
        }
    }

    /// Whether `url` points into this drive.
    pub fn owns(&self, url: &str) -> bool {
        match url.strip_prefix(SCHEME).and_then(|r| r.strip_prefix(self.0.as_str())) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for DriveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DriveKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DriveKey::parse(s)
    }
}

impl AsRef<str> for DriveKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split an `hd://` URL into its drive key and absolute path.
pub fn split_url(url: &str) -> Option<(DriveKey, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.scheme() != SCHEME.trim_end_matches("://") {
        return None;
    }
    let key = DriveKey::parse(parsed.host_str()?).ok()?;
    let path = match parsed.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    Some((key, path))
}
