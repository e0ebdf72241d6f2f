use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{FollowFilter, FollowListOpts, SocialContext};
use crate::error::Result;
use crate::key::DriveKey;
use crate::store::{Drive, QueryOpts};

/// Derived view of a drive's root metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub key: DriveKey,
    pub url: String,
    pub title: String,
    pub description: String,
    pub drive_type: Option<String>,
    pub thumbnail: Option<String>,
    pub followers: Option<Vec<DriveKey>>,
    pub following: Option<Vec<DriveKey>>,
    pub is_following_user: Option<bool>,
    pub is_user_following: Option<bool>,
}

pub struct Profiles<'a> {
    ctx: &'a SocialContext,
}

impl<'a> Profiles<'a> {
    pub(super) fn new(ctx: &'a SocialContext) -> Self {
        Profiles { ctx }
    }

    /// Cached profile of `key`. Concurrent lookups share one fetch.
    pub fn get(&self, key: &DriveKey) -> Result<Arc<Profile>> {
        self.ctx
            .profile_cache
            .get_or_try_init(key, || self.fetch(key))
    }

    pub fn user(&self) -> Result<Arc<Profile>> {
        self.get(self.ctx.user())
    }

    /// Profile plus its follow graph relative to the local user. Never cached.
    pub fn get_with_graph(&self, key: &DriveKey) -> Result<Profile> {
        let mut profile = (*self.get(key)?).clone();
        let follows = self.ctx.follows();
        let dedupe = FollowListOpts {
            remove_duplicate_mounts: true,
            ..Default::default()
        };

        let following: Vec<DriveKey> = follows
            .list(&FollowFilter::by_author(key.clone()), &dedupe)?
            .into_iter()
            .map(|f| f.target)
            .collect();

        let mut followers: Vec<DriveKey> = Vec::new();
        for relation in follows.list(&FollowFilter::by_target(key.clone()), &FollowListOpts::default())? {
            if !followers.contains(&relation.author) {
                followers.push(relation.author);
            }
        }

        let user = self.ctx.user();
        profile.is_following_user = Some(following.contains(user));
        profile.is_user_following = Some(followers.contains(user));
        profile.following = Some(following);
        profile.followers = Some(followers);
        Ok(profile)
    }

    pub fn invalidate(&self, key: &DriveKey) {
        self.ctx.profile_cache.invalidate(key);
    }

    fn fetch(&self, key: &DriveKey) -> Result<Profile> {
        let drive = self.ctx.network.open(key)?;
        let info = drive.get_info()?;
        debug!(drive = %key, version = info.version, "fetched profile");

        Ok(Profile {
            key: key.clone(),
            url: key.url(),
            title: info.manifest.title,
            description: info.manifest.description,
            drive_type: info.manifest.drive_type,
            thumbnail: thumbnail(drive.as_ref()),
            followers: None,
            following: None,
            is_following_user: None,
            is_user_following: None,
        })
    }
}

fn thumbnail(drive: &dyn Drive) -> Option<String> {
    match drive.query(&QueryOpts::path("/thumb.*")) {
        Ok(entries) => entries.into_iter().next().map(|e| e.url),
        Err(e) => {
            debug!(drive = %drive.key(), error = %e, "no thumbnail");
            None
        }
    }
}
