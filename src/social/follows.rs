use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::util::slugify;
use super::{Profile, SocialContext, PROFILE_PATH};
use crate::error::Result;
use crate::key::DriveKey;
use crate::lock::LockKey;
use crate::store::{self, EntryKind, QueryEntry, QueryOpts};

/// Directed edge: `author` follows `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowRelation {
    pub author: DriveKey,
    pub target: DriveKey,
    /// Mount name under the author's `/follows`.
    pub name: String,
    pub created_at: i64,
    pub author_profile: Option<Arc<Profile>>,
    pub target_profile: Option<Arc<Profile>>,
}

#[derive(Debug, Clone, Default)]
pub struct FollowFilter {
    pub author: Option<DriveKey>,
    pub target: Option<DriveKey>,
}

impl FollowFilter {
    pub fn by_author(author: DriveKey) -> Self {
        FollowFilter {
            author: Some(author),
            target: None,
        }
    }

    pub fn by_target(target: DriveKey) -> Self {
        FollowFilter {
            author: None,
            target: Some(target),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FollowListOpts {
    pub include_profiles: bool,
    /// Keep only the first relation per (author, target).
    pub remove_duplicate_mounts: bool,
}

pub struct Follows<'a> {
    ctx: &'a SocialContext,
}

impl<'a> Follows<'a> {
    pub(super) fn new(ctx: &'a SocialContext) -> Self {
        Follows { ctx }
    }

    /// Follow relations matching `filter`. Without an author this walks the
    /// user's follows and their follows, under [`LockKey::ReadSocialGraph`].
    pub fn list(&self, filter: &FollowFilter, opts: &FollowListOpts) -> Result<Vec<FollowRelation>> {
        let relations = match &filter.author {
            Some(_) => self.list_unlocked(filter),
            None => {
                let _guard = self.ctx.locks.acquire(LockKey::ReadSocialGraph)?;
                self.list_unlocked(filter)
            }
        };

        let mut relations = if opts.remove_duplicate_mounts {
            dedupe(relations)
        } else {
            relations
        };
        if opts.include_profiles {
            self.hydrate(&mut relations);
        }
        Ok(relations)
    }

    /// Follow `url` from the user's profile. A second call for the same drive
    /// returns the existing mount name.
    pub fn add(&self, url: &str, title: &str) -> Result<String> {
        let target = self.ctx.resolve(url)?;
        let existing = self.own_mounts()?;
        if let Some(entry) = existing.iter().find(|e| e.mount.as_ref() == Some(&target)) {
            debug!(drive = %target, mount = entry.name(), "already following");
            return Ok(entry.name().to_string());
        }

        let dir = self.ctx.profile_dir("follows");
        let taken: HashSet<&str> = existing.iter().map(QueryEntry::name).collect();
        let name = unique_name(&mount_name(title, &target), &taken);
        self.ctx
            .filesystem
            .mount(&store::path::join(&dir, &name), &target)?;

        info!(drive = %target, mount = %name, "followed drive");
        Ok(name)
    }

    /// Unfollow by drive URL/key or by mount name. Returns how many mounts
    /// were removed; zero is not an error.
    pub fn remove(&self, url_or_name: &str) -> Result<usize> {
        let target = self.ctx.resolve(url_or_name).ok();
        let dir = format!("{}/follows", PROFILE_PATH);
        let mut removed = 0;

        for entry in self.own_mounts()? {
            let matches_target = target.is_some() && entry.mount == target;
            if matches_target || entry.name() == url_or_name {
                self.ctx
                    .filesystem
                    .unmount(&store::path::join(&dir, entry.name()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(follow = url_or_name, removed, "unfollowed drive");
        }
        Ok(removed)
    }

    /// Distinct first- and second-degree follow targets of `user`, excluding
    /// `user` itself, first-degree targets first.
    pub fn graph(&self, user: &DriveKey) -> Result<Vec<DriveKey>> {
        let _guard = self.ctx.locks.acquire(LockKey::ReadSocialGraph)?;

        let mut seen: HashSet<DriveKey> = HashSet::new();
        seen.insert(user.clone());
        let mut out = Vec::new();

        let first: Vec<DriveKey> = self
            .list_unlocked(&FollowFilter::by_author(user.clone()))
            .into_iter()
            .map(|f| f.target)
            .collect();
        for target in &first {
            if seen.insert(target.clone()) {
                out.push(target.clone());
            }
        }

        let mut visited: HashSet<&DriveKey> = HashSet::new();
        for author in &first {
            if author == user || !visited.insert(author) {
                continue;
            }
            for relation in self.list_unlocked(&FollowFilter::by_author(author.clone())) {
                if seen.insert(relation.target.clone()) {
                    out.push(relation.target);
                }
            }
        }
        Ok(out)
    }

    fn list_unlocked(&self, filter: &FollowFilter) -> Vec<FollowRelation> {
        let target = filter.target.clone();
        self.ctx
            .query_sources(filter.author.as_ref(), "/follows/*", |paths| {
                let opts = QueryOpts::paths(paths).kind(EntryKind::Mount);
                match target {
                    Some(t) => opts.mount(t),
                    None => opts,
                }
            })
            .into_iter()
            .filter_map(relation)
            .collect()
    }

    fn own_mounts(&self) -> Result<Vec<QueryEntry>> {
        let opts = QueryOpts::path(format!("{}/follows/*", PROFILE_PATH)).kind(EntryKind::Mount);
        Ok(self.ctx.filesystem.query(&opts)?)
    }

    fn hydrate(&self, relations: &mut [FollowRelation]) {
        let profiles = self.ctx.profiles();
        let lookup = |key: &DriveKey| match profiles.get(key) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(drive = %key, error = %e, "failed to load profile");
                None
            }
        };
        for relation in relations.iter_mut() {
            relation.author_profile = lookup(&relation.author);
            relation.target_profile = lookup(&relation.target);
        }
    }
}

fn relation(entry: QueryEntry) -> Option<FollowRelation> {
    let target = entry.mount.clone()?;
    Some(FollowRelation {
        name: entry.name().to_string(),
        author: entry.drive,
        target,
        created_at: entry.stat.ctime,
        author_profile: None,
        target_profile: None,
    })
}

fn dedupe(relations: Vec<FollowRelation>) -> Vec<FollowRelation> {
    let mut seen = HashSet::new();
    relations
        .into_iter()
        .filter(|r| seen.insert((r.author.clone(), r.target.clone())))
        .collect()
}

fn mount_name(title: &str, target: &DriveKey) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        target.as_str()[..8].to_string()
    } else {
        slug
    }
}

fn unique_name(base: &str, taken: &HashSet<&str>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}
