//! NAPI bindings for Node.js/TypeScript.
//!
//! JavaScript owns the live listeners and forwards every member snapshot to a
//! [`JsFeed`]; the feed aggregates, filters and paginates on the Rust side.

use crate::{
    config::MineMatch, error::FeedError, normalize_snapshot, validate_log, FeedAction, FeedEntry,
    FeedState, FeedView, MemberId, NewLog, Profile, RawSnapshot, SnapshotCache, SocialGraph,
    ViewerIdentity,
};
use napi::bindgen_prelude::*;
use napi_derive::napi;
use tracing::warn;

/// Push-driven feed engine.
#[napi]
pub struct JsFeed {
    state: FeedState,
    cache: SnapshotCache,
}

/// Options for creating a feed.
#[napi(object)]
pub struct JsFeedOptions {
    pub page_size: Option<u32>,
    /// Match "mine only" by author id instead of display name.
    pub mine_by_id: Option<bool>,
}

/// Viewer profile as read by JavaScript.
#[napi(object)]
pub struct JsProfile {
    pub display_name: String,
    pub followee_ids: Vec<String>,
}

/// Feed entry returned to JavaScript.
#[napi(object)]
pub struct JsFeedEntry {
    pub author: String,
    pub author_id: String,
    pub created_at: String,
    pub duration_minutes: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl From<FeedEntry> for JsFeedEntry {
    fn from(e: FeedEntry) -> Self {
        JsFeedEntry {
            author: e.author,
            author_id: e.author_id.0,
            created_at: e.log.created_at,
            duration_minutes: e.log.duration_minutes,
            tags: e.log.tags,
            description: e.log.description,
        }
    }
}

/// What the UI renders.
#[napi(object)]
pub struct JsFeedView {
    pub status: String, // "idle" | "loading" | "ready" | "error"
    pub error: Option<String>,
    pub entries: Vec<JsFeedEntry>,
    pub filtered_len: u32,
    pub total_len: u32,
    pub has_more: bool,
    pub page: u32,
    pub loading_more: bool,
    pub members_reported: u32,
    pub members_total: u32,
}

impl From<FeedView> for JsFeedView {
    fn from(v: FeedView) -> Self {
        JsFeedView {
            status: v.status.name().to_string(),
            error: v.last_error.map(|e| e.to_string()),
            entries: v.entries.into_iter().map(Into::into).collect(),
            filtered_len: v.filtered_len as u32,
            total_len: v.total_len as u32,
            has_more: v.has_more,
            page: v.page as u32,
            loading_more: v.loading_more,
            members_reported: v.members_reported as u32,
            members_total: v.members_total as u32,
        }
    }
}

/// A new log as entered by the user.
#[napi(object)]
pub struct JsNewLog {
    pub created_at: Option<String>,
    pub duration: String,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
}

fn to_napi_error(e: FeedError) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[napi]
impl JsFeed {
    #[napi(constructor)]
    pub fn new(options: Option<JsFeedOptions>) -> Self {
        let page_size = options.as_ref().and_then(|o| o.page_size).unwrap_or(10) as usize;
        let mine_match = match options.and_then(|o| o.mine_by_id) {
            Some(true) => MineMatch::AuthorId,
            _ => MineMatch::DisplayName,
        };

        let mut state = FeedState::new(page_size);
        state.set_mine_match(mine_match);
        JsFeed {
            state,
            cache: SnapshotCache::default(),
        }
    }

    /// Start a feed for `viewer_id` and return the member ids JavaScript
    /// should subscribe to. A missing profile yields no members.
    #[napi]
    pub fn start(&mut self, viewer_id: String, profile: Option<JsProfile>) -> Vec<String> {
        let viewer = MemberId::from(viewer_id);
        let graph = match profile {
            Some(p) => SocialGraph::from_profile(
                viewer.clone(),
                Profile {
                    display_name: p.display_name,
                    followee_ids: p.followee_ids.into_iter().map(MemberId::from).collect(),
                },
            ),
            None => SocialGraph::empty(viewer.clone()),
        };

        self.state.apply(FeedAction::Subscribe);
        self.state.apply(FeedAction::ViewerResolved(ViewerIdentity {
            id: Some(viewer),
            display_name: graph.viewer_display_name.clone(),
            mine_match: self.state.viewer().mine_match,
        }));
        self.cache.reset(graph.members.clone());

        if graph.is_empty() {
            let aggregate = self.cache.recombine();
            self.state.apply(FeedAction::Aggregated(aggregate));
        }

        graph.members.into_iter().map(|m| m.0).collect()
    }

    /// Forward a member's full snapshot (`{ displayName, logs }`).
    /// Returns whether the view changed.
    #[napi]
    pub fn push_snapshot(&mut self, member_id: String, snapshot: serde_json::Value) -> Result<bool> {
        let raw: RawSnapshot =
            serde_json::from_value(snapshot).map_err(|e| to_napi_error(e.into()))?;
        let member = MemberId::from(member_id);

        let Some(aggregate) = self.cache.replace(&member, normalize_snapshot(&member, raw)) else {
            return Ok(false);
        };
        Ok(self.state.apply(FeedAction::Aggregated(aggregate)))
    }

    /// Report that a member's listener failed.
    #[napi]
    pub fn report_error(&mut self, member_id: String, message: String) -> bool {
        warn!(member = %member_id, error = %message, "Member listener failed");
        self.state.apply(FeedAction::SourceFailed(FeedError::classify(message)))
    }

    /// Tear down; JavaScript must unsubscribe its listeners.
    #[napi]
    pub fn stop(&mut self) {
        self.cache.reset(Vec::new());
        self.state.apply(FeedAction::Reset);
    }

    // --- Filters and pagination ---

    #[napi]
    pub fn set_tag_filter(&mut self, tags: String) {
        self.state.apply(FeedAction::SetTagFilter(tags));
    }

    #[napi]
    pub fn set_user_filter(&mut self, user: String) {
        self.state.apply(FeedAction::SetUserFilter(user));
    }

    #[napi]
    pub fn set_show_only_mine(&mut self, only_mine: bool) {
        self.state.apply(FeedAction::SetShowOnlyMine(only_mine));
    }

    #[napi]
    pub fn clear_filters(&mut self) {
        self.state.apply(FeedAction::ClearFilters);
    }

    /// Reveal one more page. Ignored until `pageRendered` is called for the
    /// previous one.
    #[napi]
    pub fn load_more(&mut self) -> bool {
        self.state.apply(FeedAction::LoadMore)
    }

    #[napi]
    pub fn page_rendered(&mut self) {
        self.state.apply(FeedAction::LoadSettled);
    }

    #[napi]
    pub fn view(&self) -> JsFeedView {
        self.state.view().into()
    }

    // --- Writes ---

    /// Validate a new log and return the document to store.
    #[napi]
    pub fn validate_log(input: JsNewLog) -> Result<serde_json::Value> {
        let log = NewLog {
            created_at: input.created_at,
            duration: input.duration,
            tags: input.tags.unwrap_or_default(),
            description: input.description,
        };
        let stored = validate_log(&log).map_err(to_napi_error)?;
        serde_json::to_value(stored).map_err(|e| to_napi_error(e.into()))
    }
}
