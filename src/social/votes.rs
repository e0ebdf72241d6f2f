use std::sync::Arc;

use tracing::{info, warn};

use super::util::{is_valid_url, timestamp_from_name};
use super::{Profile, SocialContext, PROFILE_PATH};
use crate::error::{Error, Result};
use crate::key::DriveKey;
use crate::store::{self, path, Drive, QueryEntry, QueryOpts, WriteOpts};

const VOTES_GLOB: &str = "/votes/*.goto";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub url: String,
    pub path: String,
    pub author: DriveKey,
    pub href: String,
    /// `1` or `-1`.
    pub vote: i8,
    pub timestamp: i64,
}

impl Vote {
    fn from_entry(entry: QueryEntry) -> Option<Self> {
        let href = entry.stat.meta("href")?.to_string();
        let vote = parse_vote(entry.stat.meta("vote")?)?;
        let timestamp = timestamp_from_name(&entry.path).unwrap_or(entry.stat.ctime);
        Some(Vote {
            href,
            vote,
            timestamp,
            author: entry.drive,
            url: entry.url,
            path: entry.path,
        })
    }
}

/// Live vote value of a record; anything but `1`/`-1` is ignored.
pub(crate) fn parse_vote(raw: &str) -> Option<i8> {
    match raw.trim().parse::<i8>() {
        Ok(v @ (1 | -1)) => Some(v),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabulatedVotes {
    pub upvotes: Vec<DriveKey>,
    pub downvotes: Vec<DriveKey>,
    /// Profiles of every voter, when requested.
    pub profiles: Vec<Arc<Profile>>,
}

impl TabulatedVotes {
    /// Fold `votes` in order; each voter's last record decides their side.
    pub fn fold<'v>(votes: impl IntoIterator<Item = &'v Vote>) -> Self {
        let mut tally = TabulatedVotes::default();
        for vote in votes {
            tally.upvotes.retain(|k| k != &vote.author);
            tally.downvotes.retain(|k| k != &vote.author);
            if vote.vote > 0 {
                tally.upvotes.push(vote.author.clone());
            } else {
                tally.downvotes.push(vote.author.clone());
            }
        }
        tally
    }

    pub fn score(&self) -> i64 {
        self.upvotes.len() as i64 - self.downvotes.len() as i64
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoteFilter {
    pub author: Option<DriveKey>,
    pub href: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TabulateOpts {
    pub include_profiles: bool,
    pub no_cache: bool,
}

pub struct Votes<'a> {
    ctx: &'a SocialContext,
}

impl<'a> Votes<'a> {
    pub(super) fn new(ctx: &'a SocialContext) -> Self {
        Votes { ctx }
    }

    pub fn list(&self, filter: &VoteFilter) -> Result<Vec<Vote>> {
        let href = filter.href.clone();
        Ok(self
            .ctx
            .query_sources(filter.author.as_ref(), VOTES_GLOB, |paths| {
                let query = QueryOpts::paths(paths);
                match href {
                    Some(h) => query.meta("href", h),
                    None => query,
                }
            })
            .into_iter()
            .filter_map(Vote::from_entry)
            .collect())
    }

    /// The user's live vote on `href`.
    pub fn get(&self, href: &str) -> Result<Option<Vote>> {
        let dir = format!("{}/votes", PROFILE_PATH);
        let mut own = own_records(self.ctx.filesystem.as_ref(), &dir, href)?;
        Ok(own.pop().and_then(Vote::from_entry))
    }

    pub fn tabulate(
        &self,
        href: &str,
        filter: &VoteFilter,
        opts: TabulateOpts,
    ) -> Result<TabulatedVotes> {
        let votes = self.raw(filter.author.as_ref(), opts.no_cache);
        let mut tally = TabulatedVotes::fold(votes.iter().filter(|v| v.href == href));

        if opts.include_profiles {
            let profiles = self.ctx.profiles();
            for voter in tally.upvotes.iter().chain(tally.downvotes.iter()) {
                match profiles.get(voter) {
                    Ok(profile) => tally.profiles.push(profile),
                    Err(e) => warn!(drive = %voter, error = %e, "failed to load voter profile"),
                }
            }
        }
        Ok(tally)
    }

    /// Replace the user's vote on `href`; `0` only clears it.
    pub fn put(&self, href: &str, vote: i8) -> Result<()> {
        self.put_in(href, vote, None)
    }

    /// Like [`put`](Self::put), but records the vote in `target` (a drive the
    /// user can write) instead of the profile when given.
    pub fn put_in(&self, href: &str, vote: i8, target: Option<&DriveKey>) -> Result<()> {
        let href = href.trim();
        if !is_valid_url(href) {
            return Err(Error::validation(format!("invalid href: {}", href)));
        }
        if !(-1..=1).contains(&vote) {
            return Err(Error::validation(format!("vote must be -1, 0 or 1, got {}", vote)));
        }

        let remote = target.filter(|key| !self.ctx.is_user(key));
        let (drive, dir, author): (Arc<dyn Drive>, String, DriveKey) = match remote {
            Some(key) => {
                (self.ctx.network.open(key)?, "/votes".to_string(), key.clone())
            }
            None => (
                Arc::clone(&self.ctx.filesystem),
                format!("{}/votes", PROFILE_PATH),
                self.ctx.user().clone(),
            ),
        };

        for existing in own_records(drive.as_ref(), &dir, href)? {
            drive.unlink(&path::join(&dir, existing.name()))?;
        }

        if vote != 0 {
            if remote.is_some() {
                store::ensure_dir(drive.as_ref(), &dir);
            } else {
                self.ctx.profile_dir("votes");
            }
            let name = format!("{}.goto", self.ctx.next_timestamp());
            let opts = WriteOpts::default()
                .meta("href", href)
                .meta("vote", vote.to_string());
            drive.write_file(&path::join(&dir, &name), "", &opts)?;
        }

        self.invalidate(&author);
        info!(href, vote, drive = %author, "put vote");
        Ok(())
    }

    pub fn invalidate(&self, author: &DriveKey) {
        self.ctx.vote_cache.invalidate(author);
    }

    fn raw(&self, author: Option<&DriveKey>, no_cache: bool) -> Arc<Vec<Vote>> {
        if !no_cache {
            if let Some(hit) = self.ctx.vote_cache.get(author) {
                return hit;
            }
        }
        let votes: Vec<Vote> = self
            .ctx
            .query_sources(author, VOTES_GLOB, QueryOpts::paths)
            .into_iter()
            .filter_map(Vote::from_entry)
            .collect();
        self.ctx.vote_cache.insert(author, votes)
    }
}

/// Every vote record on `href` under `dir` of `drive`, oldest first.
fn own_records(drive: &dyn Drive, dir: &str, href: &str) -> Result<Vec<QueryEntry>> {
    let opts = QueryOpts::path(format!("{}/*.goto", dir)).meta("href", href);
    match drive.query(&opts) {
        Ok(entries) => Ok(entries),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
