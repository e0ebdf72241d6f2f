//! Which drive changes become notifications.

use chrono::Utc;

use crate::index::{EventDetail, NotificationEvent};
use crate::key::DriveKey;
use crate::social::util::timestamp_from_name;
use crate::store::{path, Change};

/// One rule per event kind. Each scans one path prefix of a followed drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRule {
    /// Votes on the user's records.
    Votes,
    /// Comments on, or replies to, the user's records.
    Comments,
    /// Mounts of the user's profile.
    Follows,
}

impl IndexRule {
    pub const ALL: [IndexRule; 3] = [IndexRule::Votes, IndexRule::Comments, IndexRule::Follows];

    pub fn prefix(&self) -> &'static str {
        match self {
            IndexRule::Votes => "/votes",
            IndexRule::Comments => "/comments",
            IndexRule::Follows => "/follows",
        }
    }

    pub fn matches(&self, change: &Change, user: &DriveKey) -> bool {
        // Only direct children of the prefix are records.
        if change.name().contains('/') {
            return false;
        }
        match (self, change) {
            (IndexRule::Votes, Change::Put { name, stat }) => {
                has_extension(name, "goto")
                    && stat.meta("href").is_some_and(|href| user.owns(href))
                    && stat
                        .meta("vote")
                        .and_then(crate::social::parse_vote)
                        .is_some()
            }
            (IndexRule::Comments, Change::Put { name, stat }) => {
                has_extension(name, "md")
                    && (stat.meta("href").is_some_and(|href| user.owns(href))
                        || stat.meta("parent").is_some_and(|parent| user.owns(parent)))
            }
            (IndexRule::Follows, Change::Mount { target, .. }) => target == user,
            _ => false,
        }
    }

    /// Project a matching change of `drive` into an event.
    pub fn to_event(&self, change: &Change, drive: &DriveKey) -> Option<NotificationEvent> {
        let name = change.name();
        let url = drive.join(&path::join(self.prefix(), name));
        let timestamp = timestamp_from_name(name)
            .or_else(|| change.stat().map(|s| s.ctime))
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let detail = match (self, change) {
            (IndexRule::Votes, Change::Put { stat, .. }) => EventDetail::Vote {
                url,
                href: stat.meta("href")?.to_string(),
                vote: stat.meta("vote").and_then(crate::social::parse_vote)?,
            },
            (IndexRule::Comments, Change::Put { stat, .. }) => EventDetail::Comment {
                url,
                href: stat.meta("href")?.to_string(),
                parent: stat.meta("parent").map(str::to_string),
            },
            (IndexRule::Follows, Change::Mount { target, .. }) => EventDetail::Follow {
                name: name.to_string(),
                target: target.clone(),
            },
            _ => return None,
        };
        Some(NotificationEvent::new(drive.clone(), timestamp, detail))
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    path::extension(name).as_deref() == Some(ext)
}
