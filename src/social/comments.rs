use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::util::{is_valid_url, normalize_url};
use super::{ListOpts, SocialContext, PROFILE_PATH};
use crate::error::{Error, Result};
use crate::key::DriveKey;
use crate::store::{path, QueryEntry, QueryOpts, ReadEntry, WriteOpts};

const COMMENTS_GLOB: &str = "/comments/*.md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub url: String,
    pub path: String,
    pub author: DriveKey,
    /// What is being commented on.
    pub href: String,
    /// URL of the comment this replies to.
    pub parent: Option<String>,
    pub content: String,
    pub ctime: i64,
    pub mtime: i64,
}

impl Comment {
    fn from_read(read: ReadEntry) -> Option<Self> {
        let content = read.text().unwrap_or_default().to_string();
        let entry = read.entry;
        let href = entry.stat.meta("href")?.to_string();
        let parent = entry.stat.meta("parent").map(str::to_string);
        Some(Comment {
            href,
            parent,
            content,
            ctime: entry.stat.ctime,
            mtime: entry.stat.mtime,
            author: entry.drive,
            url: entry.url,
            path: entry.path,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadedComment {
    pub comment: Comment,
    /// `None` past the requested depth.
    pub replies: Option<Vec<ThreadedComment>>,
    pub reply_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub author: Option<DriveKey>,
    pub href: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountOpts {
    /// Re-query instead of using the per-author cache.
    pub no_cache: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadOpts {
    pub author: Option<DriveKey>,
    /// Root the forest at the replies to this comment.
    pub parent: Option<String>,
    pub depth: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub href: String,
    pub parent: Option<String>,
    pub content: String,
}

pub struct Comments<'a> {
    ctx: &'a SocialContext,
}

impl<'a> Comments<'a> {
    pub(super) fn new(ctx: &'a SocialContext) -> Self {
        Comments { ctx }
    }

    pub fn list(&self, filter: &CommentFilter, opts: &ListOpts) -> Result<Vec<Comment>> {
        let href = filter.href.clone();
        let reads = self
            .ctx
            .read_sources(filter.author.as_ref(), COMMENTS_GLOB, |paths| {
                let query = QueryOpts::paths(paths).sort(opts.sort).reverse(opts.reverse);
                match href {
                    Some(h) => query.meta("href", h),
                    None => query,
                }
            });

        Ok(reads
            .into_iter()
            .filter_map(Comment::from_read)
            .filter(|c| filter.parent.is_none() || c.parent == filter.parent)
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Number of comments matching `filter` from the cached raw listing of
    /// `filter.author`.
    pub fn count(&self, filter: &CommentFilter, opts: CountOpts) -> Result<usize> {
        let author = filter.author.as_ref();
        let cached = if opts.no_cache {
            None
        } else {
            self.ctx.comment_cache.get(author)
        };
        let entries = match cached {
            Some(entries) => entries,
            None => {
                let fresh = self
                    .ctx
                    .query_sources(author, COMMENTS_GLOB, QueryOpts::paths);
                debug!(author = ?author.map(DriveKey::as_str), count = fresh.len(), "cached comment listing");
                self.ctx.comment_cache.insert(author, fresh)
            }
        };

        Ok(entries
            .iter()
            .filter(|e| matches_filter(e, filter))
            .count())
    }

    pub fn invalidate(&self, author: &DriveKey) {
        self.ctx.comment_cache.invalidate(author);
    }

    /// Comments on `href` arranged as reply trees, in listing order.
    ///
    /// Replies whose parent is not among the fetched comments are dropped.
    pub fn thread(&self, href: &str, opts: &ThreadOpts) -> Result<Vec<ThreadedComment>> {
        let filter = CommentFilter {
            author: opts.author.clone(),
            href: Some(href.to_string()),
            parent: None,
        };
        let comments = self.list(&filter, &ListOpts::default())?;
        Ok(build_threads(comments, opts.parent.as_deref(), opts.depth))
    }

    pub fn add(&self, comment: &NewComment) -> Result<String> {
        let href = normalize_url(&comment.href)?;
        let content = comment.content.trim();
        if content.is_empty() {
            return Err(Error::validation("comment content is required"));
        }

        let mut opts = WriteOpts::default().meta("href", href);
        if let Some(parent) = comment.parent.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if !is_valid_url(parent) {
                return Err(Error::validation(format!("invalid parent url: {}", parent)));
            }
            opts = opts.meta("parent", parent);
        }

        let dir = self.ctx.profile_dir("comments");
        let name = format!("{}.md", self.ctx.next_timestamp());
        self.ctx
            .filesystem
            .write_file(&path::join(&dir, &name), content, &opts)?;
        self.invalidate(self.ctx.user());

        let url = self.ctx.user().join(&format!("/comments/{}", name));
        info!(url = %url, "wrote comment");
        Ok(url)
    }

    /// Replace the body of one of the user's comments, keeping its metadata.
    pub fn update(&self, url_or_filename: &str, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("comment content is required"));
        }
        let own = self.own_comment_path(url_or_filename)?;
        let stat = self.ctx.filesystem.stat(&own)?;
        let opts = WriteOpts {
            metadata: stat.metadata,
            ..Default::default()
        };
        self.ctx.filesystem.write_file(&own, content, &opts)?;
        self.invalidate(self.ctx.user());
        info!(path = %own, "updated comment");
        Ok(())
    }

    pub fn remove(&self, url_or_filename: &str) -> Result<()> {
        let own = self.own_comment_path(url_or_filename)?;
        self.ctx.filesystem.unlink(&own)?;
        self.invalidate(self.ctx.user());
        info!(path = %own, "removed comment");
        Ok(())
    }

    fn own_comment_path(&self, url_or_filename: &str) -> Result<String> {
        if url_or_filename.contains("://") {
            // Rejects other users' comments.
            self.ctx.own_path(url_or_filename)?;
        }
        let name = path::basename(url_or_filename);
        if name.is_empty() || path::extension(name).as_deref() != Some("md") {
            return Err(Error::validation(format!("not a comment: {}", url_or_filename)));
        }
        Ok(format!("{}/comments/{}", PROFILE_PATH, name))
    }
}

fn matches_filter(entry: &QueryEntry, filter: &CommentFilter) -> bool {
    let href_ok = filter
        .href
        .as_deref()
        .map_or(entry.stat.meta("href").is_some(), |h| entry.stat.meta("href") == Some(h));
    let parent_ok = filter
        .parent
        .as_deref()
        .map_or(true, |p| entry.stat.meta("parent") == Some(p));
    href_ok && parent_ok
}

/// Group flat comments into trees. Roots are top-level comments, or the
/// replies to `parent` when given. Below `depth` levels, `replies` is `None`.
pub(crate) fn build_threads(
    comments: Vec<Comment>,
    parent: Option<&str>,
    depth: Option<usize>,
) -> Vec<ThreadedComment> {
    let mut seen = HashSet::new();
    let mut children: HashMap<Option<String>, Vec<Comment>> = HashMap::new();
    for comment in comments {
        // Same record reached through two mounts.
        if seen.insert(comment.url.clone()) {
            children.entry(comment.parent.clone()).or_default().push(comment);
        }
    }

    let roots = children
        .remove(&parent.map(str::to_string))
        .unwrap_or_default();
    roots
        .into_iter()
        .map(|root| attach(root, &mut children, 0, depth))
        .collect()
}

fn attach(
    comment: Comment,
    children: &mut HashMap<Option<String>, Vec<Comment>>,
    level: usize,
    depth: Option<usize>,
) -> ThreadedComment {
    let direct = children.remove(&Some(comment.url.clone())).unwrap_or_default();
    let reply_count = direct.len();
    let replies: Vec<ThreadedComment> = direct
        .into_iter()
        .map(|reply| attach(reply, children, level + 1, depth))
        .collect();

    ThreadedComment {
        comment,
        replies: match depth {
            Some(max) if level + 1 > max => None,
            _ => Some(replies),
        },
        reply_count,
    }
}
