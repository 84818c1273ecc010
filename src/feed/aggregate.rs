//! Merging per-member snapshots into one newest-first feed.

use crate::records::timestamp::instant_or;
use crate::types::{FeedEntry, UserSnapshot};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;

/// Merge snapshots into a single feed, newest first.
///
/// Entries are concatenated in snapshot order and then stably sorted, so
/// logs with equal timestamps keep their concatenation order.
pub fn aggregate<'a, I>(snapshots: I) -> Vec<FeedEntry>
where
    I: IntoIterator<Item = &'a UserSnapshot>,
{
    aggregate_at(snapshots, Utc::now())
}

/// [`aggregate`] with an explicit fallback instant for unparseable tokens.
pub fn aggregate_at<'a, I>(snapshots: I, now: DateTime<Utc>) -> Vec<FeedEntry>
where
    I: IntoIterator<Item = &'a UserSnapshot>,
{
    let mut entries: Vec<FeedEntry> = snapshots
        .into_iter()
        .flat_map(|snapshot| {
            snapshot.logs.iter().map(move |log| FeedEntry {
                author: snapshot.display_name.clone(),
                author_id: snapshot.author_id.clone(),
                log: log.clone(),
            })
        })
        .collect();

    // Stable; each key is computed once so one pass sees a single "now".
    entries.sort_by_cached_key(|entry| Reverse(instant_or(&entry.log.created_at, now)));
    entries
}
