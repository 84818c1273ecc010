//! Client-side feed filters.
//!
//! Three independent predicates (tag, user, mine-only) combined with AND.
//! Filters always run over the full aggregated feed, never over a page.

use crate::config::MineMatch;
use crate::types::{FeedEntry, MemberId};
use serde::{Deserialize, Serialize};

/// User-controlled filter settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Comma-separated tag terms.
    pub tag_filter: String,
    /// Substring of the author display name.
    pub user_filter: String,
    pub show_only_mine: bool,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tag_filter = tags.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user_filter = user.into();
        self
    }

    pub fn only_mine(mut self, only_mine: bool) -> Self {
        self.show_only_mine = only_mine;
        self
    }

    /// Lowercased, trimmed tag terms. Blank terms are dropped, so a filter
    /// of `"guitar,"` means just `"guitar"`.
    ///
    /// Deliberately unlike plain substring matching, an empty term does not
    /// match every tag.
    pub fn tag_terms(&self) -> Vec<String> {
        self.tag_filter
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Whether no predicate is active.
    pub fn is_empty(&self) -> bool {
        self.tag_terms().is_empty() && self.user_filter.is_empty() && !self.show_only_mine
    }

    /// Whether `entry` passes every active predicate.
    pub fn matches(&self, entry: &FeedEntry, viewer: &ViewerIdentity) -> bool {
        Predicate::ALL
            .iter()
            .all(|p| p.evaluate(entry, self, viewer))
    }
}

/// Who is looking at the feed, for the mine-only predicate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewerIdentity {
    pub id: Option<MemberId>,
    pub display_name: Option<String>,
    pub mine_match: MineMatch,
}

/// One filter predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Tag,
    User,
    Mine,
}

impl Predicate {
    pub const ALL: [Predicate; 3] = [Predicate::Tag, Predicate::User, Predicate::Mine];

    /// Evaluate this predicate; inactive predicates pass everything.
    pub fn evaluate(&self, entry: &FeedEntry, filter: &FilterState, viewer: &ViewerIdentity) -> bool {
        match self {
            Predicate::Tag => matches_tags(entry, &filter.tag_terms()),
            Predicate::User => matches_user(entry, &filter.user_filter),
            Predicate::Mine => !filter.show_only_mine || matches_mine(entry, viewer),
        }
    }
}

/// Any term is a case-insensitive substring of any tag. No terms passes all.
pub fn matches_tags(entry: &FeedEntry, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    entry.log.tags.iter().any(|tag| {
        let tag = tag.to_lowercase();
        terms.iter().any(|term| tag.contains(term.as_str()))
    })
}

/// Case-insensitive substring of the author display name. Empty passes all.
pub fn matches_user(entry: &FeedEntry, user_filter: &str) -> bool {
    if user_filter.is_empty() {
        return true;
    }
    entry
        .author
        .to_lowercase()
        .contains(&user_filter.to_lowercase())
}

/// Whether the entry belongs to the viewer. An unknown viewer owns nothing.
pub fn matches_mine(entry: &FeedEntry, viewer: &ViewerIdentity) -> bool {
    match viewer.mine_match {
        MineMatch::DisplayName => viewer.display_name.as_deref() == Some(entry.author.as_str()),
        MineMatch::AuthorId => viewer.id.as_ref() == Some(&entry.author_id),
    }
}

/// Keep only entries that pass every active predicate.
pub fn apply_filters(feed: &[FeedEntry], filter: &FilterState, viewer: &ViewerIdentity) -> Vec<FeedEntry> {
    if filter.is_empty() {
        return feed.to_vec();
    }

    let terms = filter.tag_terms();
    feed.iter()
        .filter(|entry| {
            matches_tags(entry, &terms)
                && matches_user(entry, &filter.user_filter)
                && (!filter.show_only_mine || matches_mine(entry, viewer))
        })
        .cloned()
        .collect()
}

/// Apply a single predicate.
pub fn apply_predicate(
    feed: &[FeedEntry],
    predicate: Predicate,
    filter: &FilterState,
    viewer: &ViewerIdentity,
) -> Vec<FeedEntry> {
    feed.iter()
        .filter(|entry| predicate.evaluate(entry, filter, viewer))
        .cloned()
        .collect()
}
