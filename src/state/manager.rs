//! Feed state: one explicit struct plus a reducer.
//!
//! Every change to what the UI shows goes through [`FeedState::apply`]. The
//! [`FeedStateManager`] wraps the state in a lock so callbacks arriving on any
//! thread can dispatch into it.

use crate::config::MineMatch;
use crate::error::FeedError;
use crate::feed::filter::{apply_filters, FilterState, ViewerIdentity};
use crate::feed::pagination::Pagination;
use crate::types::{Aggregate, FeedEntry};
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Lifecycle of the feed as exposed to the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FeedStatus {
    /// No viewer.
    #[default]
    Idle,
    /// Subscribing; no aggregate has arrived yet.
    Loading,
    /// Has data and may keep receiving updates.
    Ready,
    /// A member subscription failed. Cleared by the next aggregate.
    Error(FeedError),
}

impl FeedStatus {
    pub fn name(&self) -> &'static str {
        match self {
            FeedStatus::Idle => "idle",
            FeedStatus::Loading => "loading",
            FeedStatus::Ready => "ready",
            FeedStatus::Error(_) => "error",
        }
    }
}

/// Everything that can happen to a feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedAction {
    /// Subscriptions are being (re)built. Drops the current feed.
    Subscribe,
    ViewerResolved(ViewerIdentity),
    Aggregated(Aggregate),
    SourceFailed(FeedError),
    SetTagFilter(String),
    SetUserFilter(String),
    SetShowOnlyMine(bool),
    ClearFilters,
    LoadMore,
    /// The page revealed by the last `LoadMore` has been rendered.
    LoadSettled,
    /// Back to idle, e.g. on sign-out.
    Reset,
}

/// Aggregated feed, filters and pagination for one viewer.
#[derive(Clone, Debug)]
pub struct FeedState {
    status: FeedStatus,
    viewer: ViewerIdentity,
    /// Full aggregate, newest first.
    feed: Vec<FeedEntry>,
    /// `feed` with the current filters applied.
    filtered: Vec<FeedEntry>,
    filters: FilterState,
    pagination: Pagination,
    last_error: Option<FeedError>,
    /// Revision of the aggregate in `feed`; older ones are dropped.
    revision: u64,
    members_reported: usize,
    members_total: usize,
    /// Bumped on every `Subscribe` and `Reset`.
    generation: u64,
}

impl FeedState {
    pub fn new(page_size: usize) -> Self {
        Self {
            status: FeedStatus::Idle,
            viewer: ViewerIdentity::default(),
            feed: Vec::new(),
            filtered: Vec::new(),
            filters: FilterState::default(),
            pagination: Pagination::new(page_size),
            last_error: None,
            revision: 0,
            members_reported: 0,
            members_total: 0,
            generation: 0,
        }
    }

    /// Apply one action. Returns `true` when anything observable changed.
    pub fn apply(&mut self, action: FeedAction) -> bool {
        match action {
            FeedAction::Subscribe => {
                self.status = FeedStatus::Loading;
                self.clear_feed();
                self.last_error = None;
                self.generation += 1;
                true
            }
            FeedAction::ViewerResolved(viewer) => {
                self.viewer = viewer;
                self.refilter();
                true
            }
            FeedAction::Aggregated(aggregate) => self.on_aggregate(aggregate),
            FeedAction::SourceFailed(err) => {
                if self.status == FeedStatus::Idle {
                    return false;
                }
                self.status = FeedStatus::Error(err.clone());
                self.last_error = Some(err);
                true
            }
            FeedAction::SetTagFilter(tags) => {
                self.filters.tag_filter = tags;
                self.on_filters_changed()
            }
            FeedAction::SetUserFilter(user) => {
                self.filters.user_filter = user;
                self.on_filters_changed()
            }
            FeedAction::SetShowOnlyMine(only_mine) => {
                self.filters.show_only_mine = only_mine;
                self.on_filters_changed()
            }
            FeedAction::ClearFilters => {
                self.filters = FilterState::default();
                self.on_filters_changed()
            }
            FeedAction::LoadMore => self.pagination.load_more(self.filtered.len()),
            FeedAction::LoadSettled => {
                let was_loading = self.pagination.is_loading();
                self.pagination.settle();
                was_loading
            }
            FeedAction::Reset => {
                let page_size = self.pagination.page_size();
                let mine_match = self.viewer.mine_match;
                let generation = self.generation + 1;
                *self = Self::new(page_size);
                self.viewer.mine_match = mine_match;
                self.generation = generation;
                true
            }
        }
    }

    fn on_aggregate(&mut self, aggregate: Aggregate) -> bool {
        if self.status == FeedStatus::Idle {
            trace!(revision = aggregate.revision, "Ignoring aggregate while idle");
            return false;
        }
        if aggregate.revision <= self.revision {
            debug!(
                revision = aggregate.revision,
                current = self.revision,
                "Dropping stale aggregate"
            );
            return false;
        }

        self.revision = aggregate.revision;
        self.members_reported = aggregate.members_reported;
        self.members_total = aggregate.members_total;
        self.feed = aggregate.entries;
        self.refilter();
        // New data always brings the viewer back to the first page.
        self.pagination.reset();
        self.status = FeedStatus::Ready;
        self.last_error = None;
        true
    }

    fn on_filters_changed(&mut self) -> bool {
        self.refilter();
        self.pagination.reset();
        true
    }

    fn refilter(&mut self) {
        self.filtered = apply_filters(&self.feed, &self.filters, &self.viewer);
    }

    fn clear_feed(&mut self) {
        self.feed.clear();
        self.filtered.clear();
        self.pagination.reset();
        self.revision = 0;
        self.members_reported = 0;
        self.members_total = 0;
    }

    // --- Accessors ---

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn viewer(&self) -> &ViewerIdentity {
        &self.viewer
    }

    pub fn feed(&self) -> &[FeedEntry] {
        &self.feed
    }

    pub fn filtered(&self) -> &[FeedEntry] {
        &self.filtered
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// The paginated prefix of the filtered feed.
    pub fn visible(&self) -> &[FeedEntry] {
        self.pagination.visible(&self.filtered)
    }

    pub fn has_more(&self) -> bool {
        self.pagination.has_more(self.filtered.len())
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_mine_match(&mut self, mine_match: MineMatch) {
        self.viewer.mine_match = mine_match;
        self.refilter();
    }

    /// Owned copy of what the UI renders.
    pub fn view(&self) -> FeedView {
        FeedView {
            status: self.status.clone(),
            entries: self.visible().to_vec(),
            filtered_len: self.filtered.len(),
            total_len: self.feed.len(),
            has_more: self.has_more(),
            page: self.pagination.page(),
            loading_more: self.pagination.is_loading(),
            last_error: self.last_error.clone(),
            members_reported: self.members_reported,
            members_total: self.members_total,
        }
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(Pagination::default().page_size())
    }
}

/// Rendered view of a feed at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedView {
    pub status: FeedStatus,
    /// Visible (paginated) entries.
    pub entries: Vec<FeedEntry>,
    pub filtered_len: usize,
    pub total_len: usize,
    pub has_more: bool,
    pub page: usize,
    pub loading_more: bool,
    pub last_error: Option<FeedError>,
    pub members_reported: usize,
    pub members_total: usize,
}

/// Thread-safe owner of a [`FeedState`].
pub struct FeedStateManager {
    state: RwLock<FeedState>,
}

impl FeedStateManager {
    pub fn new(page_size: usize, mine_match: MineMatch) -> Self {
        let mut state = FeedState::new(page_size);
        state.set_mine_match(mine_match);
        Self {
            state: RwLock::new(state),
        }
    }

    /// Apply an action. Returns `true` when the state changed.
    pub fn dispatch(&self, action: FeedAction) -> bool {
        self.state.write().apply(action)
    }

    /// Apply an action only if no `Subscribe` or `Reset` has happened since
    /// `generation` was read.
    pub fn dispatch_for(&self, generation: u64, action: FeedAction) -> bool {
        let mut state = self.state.write();
        if state.generation() != generation {
            trace!(generation, current = state.generation(), "Dropping action from torn-down feed");
            return false;
        }
        state.apply(action)
    }

    /// `Subscribe` and return the new generation atomically.
    pub fn begin(&self) -> u64 {
        let mut state = self.state.write();
        state.apply(FeedAction::Subscribe);
        state.generation()
    }

    pub fn read<R>(&self, f: impl FnOnce(&FeedState) -> R) -> R {
        f(&self.state.read())
    }

    pub fn view(&self) -> FeedView {
        self.state.read().view()
    }

    pub fn status(&self) -> FeedStatus {
        self.state.read().status().clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation()
    }
}
