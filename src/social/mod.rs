//! Social data layer - profiles, follows, posts, comments and votes stored as
//! plain records in the user's drives.
//!
//! Everything hangs off one [`SocialContext`], built at startup and passed by
//! reference. Each concern is a borrowed view returned by an accessor:
//!
//! ```
//! use std::sync::Arc;
//! use socialdrive::config::SocialConfig;
//! use socialdrive::lock::NamedMutex;
//! use socialdrive::social::SocialContext;
//! use socialdrive::store::{Manifest, MemoryNetwork};
//!
//! let network = MemoryNetwork::new();
//! let fs = network.create_drive(Manifest::titled("fs"));
//! let profile = network.create_drive(Manifest::titled("alice"));
//!
//! let ctx = SocialContext::provision(
//!     Arc::new(network),
//!     &fs,
//!     &profile,
//!     Arc::new(NamedMutex::new()),
//!     SocialConfig::default(),
//! )
//! .unwrap();
//!
//! ctx.posts().add_text_post("rust", "Hello", "first post").unwrap();
//! assert_eq!(ctx.posts().list(&Default::default(), &Default::default()).unwrap().len(), 1);
//! ```
//!
//! Layout seen from the filesystem drive:
//!
//! - `/profile` - mount of the user's profile drive
//! - `/profile/follows/<name>` - one mount per followed drive
//! - `/profile/{posts/<topic>,comments,votes}/<ms>.<ext>` - the user's records

mod cache;
mod comments;
mod follows;
mod posts;
mod profiles;
pub mod util;
mod votes;

use std::sync::Arc;

use tracing::warn;

use crate::config::SocialConfig;
use crate::error::{Error, Result};
use crate::key::DriveKey;
use crate::lock::NamedMutex;
use crate::store::{self, Drive, DriveNetwork, QueryEntry, QueryOpts, ReadEntry, StoreError};

use cache::{AuthorCache, SlotCache};
use util::RecordClock;

pub use comments::{
    Comment, CommentFilter, Comments, CountOpts, NewComment, ThreadOpts, ThreadedComment,
};
pub use follows::{FollowFilter, FollowListOpts, FollowRelation, Follows};
pub use posts::{NewLinkPost, Post, PostFilter, PostKind, Posts};
pub use profiles::{Profile, Profiles};
pub use votes::{TabulateOpts, TabulatedVotes, Vote, VoteFilter, Votes};
pub(crate) use votes::parse_vote;

/// Mount point of the user's profile drive inside the filesystem drive.
pub const PROFILE_PATH: &str = "/profile";

/// Sort and pagination shared by the record listings.
#[derive(Debug, Clone, Default)]
pub struct ListOpts {
    pub sort: store::Sort,
    pub reverse: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ListOpts {
    pub fn newest_first() -> Self {
        ListOpts {
            reverse: true,
            ..Default::default()
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Explicit context for every social operation.
pub struct SocialContext {
    network: Arc<dyn DriveNetwork>,
    filesystem: Arc<dyn Drive>,
    user: DriveKey,
    locks: Arc<NamedMutex>,
    config: SocialConfig,
    clock: RecordClock,
    profile_cache: SlotCache<Profile>,
    comment_cache: AuthorCache<Vec<QueryEntry>>,
    vote_cache: AuthorCache<Vec<Vote>>,
}

impl SocialContext {
    /// Open the context for an existing filesystem drive. The user is the
    /// drive mounted at `/profile`.
    pub fn open(
        network: Arc<dyn DriveNetwork>,
        filesystem: &DriveKey,
        locks: Arc<NamedMutex>,
        config: SocialConfig,
    ) -> Result<Self> {
        let fs = network.open(filesystem)?;
        let stat = fs.stat(PROFILE_PATH)?;
        let user = stat.mount.ok_or_else(|| {
            Error::validation(format!("{} is not a mount in {}", PROFILE_PATH, filesystem))
        })?;

        Ok(SocialContext {
            network,
            filesystem: fs,
            user,
            locks,
            config,
            clock: RecordClock::new(),
            profile_cache: SlotCache::new(),
            comment_cache: AuthorCache::new(),
            vote_cache: AuthorCache::new(),
        })
    }

    /// Mount `profile` at `/profile` (best effort) and open the context.
    pub fn provision(
        network: Arc<dyn DriveNetwork>,
        filesystem: &DriveKey,
        profile: &DriveKey,
        locks: Arc<NamedMutex>,
        config: SocialConfig,
    ) -> Result<Self> {
        let fs = network.open(filesystem)?;
        store::ensure_mount(fs.as_ref(), PROFILE_PATH, profile);
        Self::open(network, filesystem, locks, config)
    }

    pub fn profiles(&self) -> Profiles<'_> {
        Profiles::new(self)
    }

    pub fn follows(&self) -> Follows<'_> {
        Follows::new(self)
    }

    pub fn posts(&self) -> Posts<'_> {
        Posts::new(self)
    }

    pub fn comments(&self) -> Comments<'_> {
        Comments::new(self)
    }

    pub fn votes(&self) -> Votes<'_> {
        Votes::new(self)
    }

    /// Key of the local user's profile drive.
    pub fn user(&self) -> &DriveKey {
        &self.user
    }

    pub fn network(&self) -> &Arc<dyn DriveNetwork> {
        &self.network
    }

    pub fn filesystem(&self) -> &Arc<dyn Drive> {
        &self.filesystem
    }

    pub fn locks(&self) -> &Arc<NamedMutex> {
        &self.locks
    }

    /// Key for a bare key, an `hd://` URL or a registered name.
    pub fn resolve(&self, url_or_name: &str) -> Result<DriveKey> {
        if let Ok(key) = DriveKey::parse(url_or_name) {
            return Ok(key);
        }
        let name = url_or_name.trim().trim_start_matches(crate::key::SCHEME);
        let name = name.split('/').next().unwrap_or_default();
        self.network.resolve_name(name).map_err(|e| match e {
            StoreError::NotFound(_) => Error::validation(format!("cannot resolve {}", url_or_name)),
            other => other.into(),
        })
    }

    /// Drop every cached value.
    pub fn clear_caches(&self) {
        self.profile_cache.clear();
        self.comment_cache.clear();
        self.vote_cache.clear();
    }

    pub(crate) fn is_user(&self, key: &DriveKey) -> bool {
        *key == self.user
    }

    pub(crate) fn next_timestamp(&self) -> i64 {
        self.clock.next()
    }

    /// Drive and path patterns holding `suffix` records of `author`. With no
    /// author, covers the user and every followed drive.
    pub(crate) fn sources(
        &self,
        author: Option<&DriveKey>,
        suffix: &str,
    ) -> Result<(Arc<dyn Drive>, Vec<String>)> {
        match author {
            None => Ok((
                Arc::clone(&self.filesystem),
                vec![
                    format!("{}/follows/*{}", PROFILE_PATH, suffix),
                    format!("{}{}", PROFILE_PATH, suffix),
                ],
            )),
            Some(key) if self.is_user(key) => Ok((
                Arc::clone(&self.filesystem),
                vec![format!("{}{}", PROFILE_PATH, suffix)],
            )),
            Some(key) => Ok((self.network.open(key)?, vec![suffix.to_string()])),
        }
    }

    /// `query` against the sources of `author`; store failures degrade to an
    /// empty result.
    pub(crate) fn query_sources(
        &self,
        author: Option<&DriveKey>,
        suffix: &str,
        build: impl FnOnce(Vec<String>) -> QueryOpts,
    ) -> Vec<QueryEntry> {
        let result = self
            .sources(author, suffix)
            .and_then(|(drive, paths)| Ok(drive.query(&build(paths))?));
        match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!(author = ?author.map(DriveKey::as_str), suffix, error = %e, "query failed");
                Vec::new()
            }
        }
    }

    /// Like [`query_sources`](Self::query_sources) but also reads bodies.
    pub(crate) fn read_sources(
        &self,
        author: Option<&DriveKey>,
        suffix: &str,
        build: impl FnOnce(Vec<String>) -> QueryOpts,
    ) -> Vec<ReadEntry> {
        let chunk = self.config.read_concurrency;
        let result = self.sources(author, suffix).and_then(|(drive, paths)| {
            Ok(store::query_read(drive.as_ref(), &build(paths), chunk)?)
        });
        match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!(author = ?author.map(DriveKey::as_str), suffix, error = %e, "query failed");
                Vec::new()
            }
        }
    }

    /// Path of `dir` in the user's profile, created if missing.
    pub(crate) fn profile_dir(&self, dir: &str) -> String {
        let path = format!("{}/{}", PROFILE_PATH, dir.trim_matches('/'));
        let mut built = PROFILE_PATH.to_string();
        for segment in store::path::segments(dir) {
            built = store::path::join(&built, segment);
            store::ensure_dir(self.filesystem.as_ref(), &built);
        }
        path
    }

    /// Path of a record URL inside the filesystem drive, when the user owns it.
    pub(crate) fn own_path(&self, url: &str) -> Result<String> {
        let (key, path) = crate::key::split_url(url)
            .ok_or_else(|| Error::validation(format!("not a record url: {}", url)))?;
        if !self.is_user(&key) {
            return Err(Error::validation(format!(
                "{} does not belong to the local user",
                url
            )));
        }
        Ok(format!("{}{}", PROFILE_PATH, path))
    }
}
