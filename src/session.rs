//! Feed session tying the pipeline together.
//!
//! A [`FeedSession`] owns one viewer's feed: it resolves the social graph,
//! keeps the member subscriptions (or one-shot reads) alive, dispatches every
//! aggregate into the [`FeedStateManager`], and records failures in its own
//! [`ErrorLog`].

use crate::config::FeedConfig;
use crate::diagnostics::ErrorLog;
use crate::error::{FeedError, Result};
use crate::feed::filter::ViewerIdentity;
use crate::graph::{resolve_members, ProfileStore, SocialGraph};
use crate::records::normalize::normalize_snapshot;
use crate::records::validate::NewLog;
use crate::state::{FeedAction, FeedStateManager, FeedStatus, FeedView};
use crate::subscriptions::{
    CancelHandle, LiveLogSource, MemberErrorCallback, SnapshotCache, SubscriptionManager, UpdateCallback,
};
use crate::types::{LogRecord, MemberId};
use crate::writer::{self, LogSink};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One viewer's live feed.
///
/// Dropping the session cancels every open subscription.
pub struct FeedSession {
    /// Session configuration.
    config: FeedConfig,

    /// Opens member subscriptions.
    subscriptions: SubscriptionManager,

    /// Write path for new logs, when configured.
    sink: Option<Arc<dyn LogSink>>,

    /// Feed, filters and pagination.
    state: Arc<FeedStateManager>,

    /// Recent failures.
    errors: Arc<ErrorLog>,

    /// Handle of the live subscription set, if any.
    active: Mutex<Option<CancelHandle>>,

    /// Graph of the current viewer.
    graph: Mutex<Option<SocialGraph>>,

    /// Latest snapshots in one-shot read mode.
    snapshots: Mutex<SnapshotCache>,

    /// Bumped on every observable state change.
    changes: Arc<watch::Sender<u64>>,
}

impl FeedSession {
    /// Create an idle session.
    pub fn new(
        config: FeedConfig,
        profiles: Arc<dyn ProfileStore>,
        source: Arc<dyn LiveLogSource>,
    ) -> Result<Self> {
        config.validate()?;

        let (changes, _) = watch::channel(0);
        Ok(Self {
            subscriptions: SubscriptionManager::new(profiles, source, config.retry.clone()),
            sink: None,
            state: Arc::new(FeedStateManager::new(config.page_size, config.mine_match)),
            errors: Arc::new(ErrorLog::new(config.error_log_capacity)),
            active: Mutex::new(None),
            graph: Mutex::new(None),
            snapshots: Mutex::new(SnapshotCache::default()),
            changes: Arc::new(changes),
            config,
        })
    }

    /// Create a session reading and writing through one backend.
    pub fn with_backend<B>(config: FeedConfig, backend: Arc<B>) -> Result<Self>
    where
        B: ProfileStore + LiveLogSource + LogSink + 'static,
    {
        let session = Self::new(config, backend.clone(), backend.clone())?;
        Ok(session.with_sink(backend))
    }

    /// Attach a log sink for [`FeedSession::append_log`].
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // --- Lifecycle ---

    /// Build the feed for `viewer`, replacing any feed already running.
    ///
    /// Returns the resolved graph. A failed profile read (after retries) or a
    /// configuration failure while subscribing is returned to the caller and
    /// also moves the feed to the error state.
    pub async fn start(&self, viewer: &MemberId) -> Result<SocialGraph> {
        let generation = self.restart();
        self.notify();
        info!(viewer = %viewer, realtime = self.config.realtime, "Starting feed");

        let profiles = self.subscriptions.profiles().as_ref();
        let graph = match resolve_members(profiles, viewer, self.subscriptions.retry()).await {
            Ok(graph) => graph,
            Err(e) => {
                self.fail(generation, format!("resolve:{viewer}"), e.clone());
                return Err(e);
            }
        };

        if self.state.generation() != generation {
            debug!(viewer = %viewer, "Feed restarted while resolving, abandoning");
            return Err(FeedError::Cancelled);
        }

        self.state.dispatch_for(
            generation,
            FeedAction::ViewerResolved(ViewerIdentity {
                id: Some(viewer.clone()),
                display_name: graph.viewer_display_name.clone(),
                mine_match: self.config.mine_match,
            }),
        );
        *self.graph.lock() = Some(graph.clone());

        if self.config.realtime {
            self.open_live(generation, &graph)?;
        } else {
            self.snapshots.lock().reset(graph.members.clone());
            self.read_members(generation, &graph.members).await?;
        }

        Ok(graph)
    }

    /// Tear everything down and rebuild for the current viewer.
    ///
    /// Needed after the viewer follows or unfollows someone, since the graph
    /// is only read at start. Returns `None` when the session is idle.
    pub async fn rebuild(&self) -> Result<Option<SocialGraph>> {
        let viewer = self.graph.lock().as_ref().and_then(|g| g.viewer.clone());
        match viewer {
            Some(viewer) => self.start(&viewer).await.map(Some),
            None => Ok(None),
        }
    }

    /// Re-read every member once. Only meaningful when `realtime` is off;
    /// live feeds are already current.
    pub async fn refresh(&self) -> Result<()> {
        if self.config.realtime {
            debug!("Refresh requested on a live feed, nothing to do");
            return Ok(());
        }

        let members = match self.graph.lock().as_ref() {
            Some(graph) => graph.members.clone(),
            None => return Ok(()),
        };
        let generation = self.state.generation();
        self.read_members(generation, &members).await
    }

    /// Cancel all subscriptions and return to idle. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel_active();
        *self.graph.lock() = None;
        self.snapshots.lock().reset(Vec::new());
        if self.state.status() != FeedStatus::Idle {
            info!("Feed stopped");
        }
        self.state.dispatch(FeedAction::Reset);
        self.notify();
    }

    fn cancel_active(&self) {
        let handle = self.active.lock().take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Take the running handle and open a new generation in one step, so a
    /// concurrent `start` cannot install a handle between the two.
    fn restart(&self) -> u64 {
        let mut active = self.active.lock();
        let previous = active.take();
        let generation = self.state.begin();
        drop(active);

        if let Some(handle) = previous {
            handle.cancel();
        }
        generation
    }

    fn open_live(&self, generation: u64, graph: &SocialGraph) -> Result<()> {
        let on_update: UpdateCallback = {
            let state = Arc::clone(&self.state);
            let changes = Arc::clone(&self.changes);
            Arc::new(move |aggregate| {
                if state.dispatch_for(generation, FeedAction::Aggregated(aggregate)) {
                    bump(&changes);
                }
            })
        };

        let on_error: MemberErrorCallback = {
            let state = Arc::clone(&self.state);
            let errors = Arc::clone(&self.errors);
            let changes = Arc::clone(&self.changes);
            Arc::new(move |member, err| {
                errors.record(format!("subscription:{member}"), &err);
                if state.dispatch_for(generation, FeedAction::SourceFailed(err)) {
                    bump(&changes);
                }
            })
        };

        let handle = match self.subscriptions.open(&graph.members, on_update, on_error) {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(generation, "subscribe", e.clone());
                return Err(e);
            }
        };

        let mut active = self.active.lock();
        if self.state.generation() != generation {
            drop(active);
            handle.cancel();
            return Err(FeedError::Cancelled);
        }
        let previous = active.replace(handle);
        drop(active);

        if let Some(previous) = previous {
            previous.cancel();
        }
        Ok(())
    }

    /// Read each member's snapshot once, concurrently, and publish one
    /// aggregate. Failed members are reported and left out.
    async fn read_members(&self, generation: u64, members: &[MemberId]) -> Result<()> {
        let source = self.subscriptions.source();
        let retry = self.subscriptions.retry();

        let reads = members.iter().map(|member| async move {
            let result = retry.run("read_snapshot", || source.read_snapshot(member)).await;
            (member, result)
        });
        let results = join_all(reads).await;

        let mut failures = Vec::new();
        let aggregate = {
            let mut cache = self.snapshots.lock();
            for (member, result) in results {
                match result {
                    Ok(Some(raw)) => {
                        cache.store(member, normalize_snapshot(member, raw));
                    }
                    Ok(None) => debug!(member = %member, "Member has no logs"),
                    Err(e) => failures.push((member.clone(), e)),
                }
            }
            cache.recombine()
        };

        debug!(
            members = members.len(),
            failed = failures.len(),
            entries = aggregate.entries.len(),
            "Read member snapshots"
        );
        if self.state.dispatch_for(generation, FeedAction::Aggregated(aggregate)) {
            self.notify();
        }

        let mut fatal = None;
        for (member, e) in failures {
            warn!(member = %member, error = %e, "Member read failed");
            if matches!(e, FeedError::Configuration(_)) && fatal.is_none() {
                fatal = Some(e.clone());
            }
            self.fail(generation, format!("read:{member}"), e);
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&self, generation: u64, context: impl Into<String>, err: FeedError) {
        self.errors.record(context, &err);
        if self.state.dispatch_for(generation, FeedAction::SourceFailed(err)) {
            self.notify();
        }
    }

    // --- Filters and pagination ---

    pub fn set_tag_filter(&self, tags: impl Into<String>) {
        self.dispatch(FeedAction::SetTagFilter(tags.into()));
    }

    pub fn set_user_filter(&self, user: impl Into<String>) {
        self.dispatch(FeedAction::SetUserFilter(user.into()));
    }

    pub fn set_show_only_mine(&self, only_mine: bool) {
        self.dispatch(FeedAction::SetShowOnlyMine(only_mine));
    }

    pub fn clear_filters(&self) {
        self.dispatch(FeedAction::ClearFilters);
    }

    /// Reveal one more page. Returns `false` when nothing happened.
    ///
    /// Call [`page_rendered`](Self::page_rendered) once the new page is on
    /// screen. Until then further calls are ignored, unless new data or a
    /// filter change resets paging first.
    pub fn load_more(&self) -> bool {
        self.dispatch(FeedAction::LoadMore)
    }

    /// The page revealed by `load_more` has been rendered.
    pub fn page_rendered(&self) {
        self.dispatch(FeedAction::LoadSettled);
    }

    fn dispatch(&self, action: FeedAction) -> bool {
        let changed = self.state.dispatch(action);
        if changed {
            self.notify();
        }
        changed
    }

    fn notify(&self) {
        bump(&self.changes);
    }

    // --- Writes ---

    /// Validate and append a new log for `owner`.
    ///
    /// Live subscribers (including this session, when `owner` is a member)
    /// see the log through the source's next push.
    pub async fn append_log(&self, owner: &MemberId, input: &NewLog) -> Result<LogRecord> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| FeedError::Configuration("no log sink configured".to_string()))?;

        match writer::append_log(sink.as_ref(), owner, input, &self.config.retry).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.errors.record(format!("append:{owner}"), &e);
                Err(e)
            }
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn view(&self) -> FeedView {
        self.state.view()
    }

    pub fn status(&self) -> FeedStatus {
        self.state.status()
    }

    pub fn state(&self) -> &FeedStateManager {
        &self.state
    }

    pub fn graph(&self) -> Option<SocialGraph> {
        self.graph.lock().clone()
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Member subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |handle| handle.active_subscriptions())
    }

    /// Receiver that changes whenever the view may have changed.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

fn bump(changes: &watch::Sender<u64>) {
    changes.send_modify(|version| *version = version.wrapping_add(1));
}
