use tracing::info;

use super::util::{normalize_topic, normalize_url, require_title, slugify};
use super::{ListOpts, SocialContext};
use crate::error::{Error, Result};
use crate::key::{split_url, DriveKey};
use crate::store::{self, path, Encoding, QueryOpts, ReadEntry, WriteOpts};

const LINK_EXT: &str = "goto";
const TEXT_EXTS: &[&str] = &["md", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    /// `.goto` record pointing at `href`.
    Link,
    /// Markdown or plain text body.
    Text,
    /// Any other (binary) body.
    File,
}

impl PostKind {
    fn of(file: &str) -> Self {
        match path::extension(file).as_deref() {
            Some(LINK_EXT) => PostKind::Link,
            Some(ext) if TEXT_EXTS.contains(&ext) => PostKind::Text,
            _ => PostKind::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub url: String,
    pub path: String,
    pub author: DriveKey,
    /// Second-to-last path segment.
    pub topic: String,
    pub kind: PostKind,
    pub title: String,
    pub href: Option<String>,
    pub drive_type: Option<String>,
    pub content: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
}

impl Post {
    fn from_read(read: ReadEntry) -> Self {
        let content = read.text().map(str::to_string);
        let entry = read.entry;
        let segments: Vec<&str> = path::segments(&entry.path).collect();
        let topic = match segments.len() {
            n if n >= 2 => segments[n - 2].to_string(),
            _ => String::new(),
        };
        let meta = |k: &str| entry.stat.meta(k).map(str::to_string);

        Post {
            kind: PostKind::of(&entry.path),
            title: meta("title").unwrap_or_default(),
            href: meta("href"),
            drive_type: meta("driveType"),
            content,
            topic,
            ctime: entry.stat.ctime,
            mtime: entry.stat.mtime,
            author: entry.drive,
            url: entry.url,
            path: entry.path,
        }
    }

    /// Non-empty title, plus a valid `href` for links or a non-empty body
    /// for text posts.
    pub fn is_valid(&self) -> bool {
        if self.title.trim().is_empty() {
            return false;
        }
        match self.kind {
            PostKind::Link => self
                .href
                .as_deref()
                .is_some_and(super::util::is_valid_url),
            PostKind::Text => self.content.as_deref().is_some_and(|c| !c.trim().is_empty()),
            PostKind::File => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author: Option<DriveKey>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewLinkPost {
    pub topic: String,
    pub title: String,
    pub href: String,
    pub drive_type: Option<String>,
}

pub struct Posts<'a> {
    ctx: &'a SocialContext,
}

impl<'a> Posts<'a> {
    pub(super) fn new(ctx: &'a SocialContext) -> Self {
        Posts { ctx }
    }

    /// Valid posts matching `filter`. Pagination counts valid posts only.
    pub fn list(&self, filter: &PostFilter, opts: &ListOpts) -> Result<Vec<Post>> {
        let topic = match &filter.topic {
            Some(t) => normalize_topic(t)?,
            None => "*".to_string(),
        };
        let suffix = format!("/posts/{}/*", topic);
        let reads = self.ctx.read_sources(filter.author.as_ref(), &suffix, |paths| {
            QueryOpts::paths(paths).sort(opts.sort).reverse(opts.reverse)
        });

        Ok(reads
            .into_iter()
            .filter(|r| r.entry.stat.is_file())
            .map(Post::from_read)
            .filter(Post::is_valid)
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Post at `url`, or `None` when it does not exist or is not readable.
    pub fn get(&self, url: &str) -> Result<Option<Post>> {
        let (author, record) =
            split_url(url).ok_or_else(|| Error::validation(format!("not a record url: {}", url)))?;
        if !path::is_within(&record, "/posts") {
            return Err(Error::validation(format!("not a post url: {}", url)));
        }
        let post = self
            .ctx
            .read_sources(Some(&author), &record, QueryOpts::paths)
            .into_iter()
            .next()
            .map(Post::from_read);
        Ok(post)
    }

    pub fn add_link(&self, post: &NewLinkPost) -> Result<String> {
        let topic = normalize_topic(&post.topic)?;
        let title = require_title(&post.title)?;
        let href = normalize_url(&post.href)?;

        let mut opts = WriteOpts::default().meta("title", title).meta("href", href);
        if let Some(drive_type) = post.drive_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            opts = opts.meta("driveType", drive_type);
        }
        self.write(&topic, LINK_EXT, "", opts)
    }

    pub fn add_text_post(&self, topic: &str, title: &str, content: &str) -> Result<String> {
        let topic = normalize_topic(topic)?;
        let title = require_title(title)?;
        if content.trim().is_empty() {
            return Err(Error::validation("content is required"));
        }
        self.write(&topic, "md", content, WriteOpts::default().meta("title", title))
    }

    /// Binary post; `data` is base64.
    pub fn add_file(&self, topic: &str, title: &str, ext: &str, data: &str) -> Result<String> {
        let topic = normalize_topic(topic)?;
        let title = require_title(title)?;
        let ext = slugify(ext.trim_start_matches('.'));
        if ext.is_empty() {
            return Err(Error::validation("file extension is required"));
        }
        if ext == LINK_EXT || TEXT_EXTS.contains(&ext.as_str()) {
            return Err(Error::validation(format!(
                ".{} files must be posted as links or text",
                ext
            )));
        }
        if data.trim().is_empty() {
            return Err(Error::validation("file data is required"));
        }
        let opts = WriteOpts::default()
            .meta("title", title)
            .encoding(Encoding::Base64);
        self.write(&topic, &ext, data.trim(), opts)
    }

    /// Delete one of the user's own posts.
    pub fn remove(&self, url: &str) -> Result<()> {
        let own = self.ctx.own_path(url)?;
        if !path::is_within(&own, "/profile/posts") {
            return Err(Error::validation(format!("not a post url: {}", url)));
        }
        self.ctx.filesystem.unlink(&own)?;
        info!(url, "removed post");
        Ok(())
    }

    fn write(&self, topic: &str, ext: &str, content: &str, opts: WriteOpts) -> Result<String> {
        let dir = self.ctx.profile_dir(&format!("posts/{}", topic));
        let name = format!("{}.{}", self.ctx.next_timestamp(), ext);
        self.ctx
            .filesystem
            .write_file(&store::path::join(&dir, &name), content, &opts)?;

        let url = self.ctx.user().join(&format!("/posts/{}/{}", topic, name));
        info!(url = %url, "wrote post");
        Ok(url)
    }
}
