//! Subscription manager with a composite, idempotent cancel handle.
//!
//! Callbacks may arrive on any thread. Internal locks are never held while
//! consumer callbacks run, so a consumer may cancel from inside a callback.

use crate::error::{FeedError, Result};
use crate::graph::{resolve_members, ProfileStore, SocialGraph};
use crate::records::normalize::normalize_snapshot;
use crate::retry::RetryPolicy;
use crate::subscriptions::cache::SnapshotCache;
use crate::subscriptions::{CancelFn, ErrorCallback, LiveLogSource, SnapshotCallback};
use crate::types::{Aggregate, MemberId, RawSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Receives every recombined aggregate.
pub type UpdateCallback = Arc<dyn Fn(Aggregate) + Send + Sync>;

/// Receives a member's subscription failure.
pub type MemberErrorCallback = Arc<dyn Fn(MemberId, FeedError) + Send + Sync>;

/// State shared between the cancel handle and every member callback.
struct Shared {
    cache: Mutex<SnapshotCache>,
    cancels: Mutex<Vec<(MemberId, CancelFn)>>,
    cancelled: AtomicBool,
}

impl Shared {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Tears down every member subscription of one feed at once.
///
/// Cloning yields another handle to the same subscription set. Cancelling
/// more than once is a no-op.
///
/// Once `cancel` returns no new callback starts. A callback already running
/// on another thread may still finish its current delivery.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancel every member subscription and clear the snapshot cache.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let cancels = std::mem::take(&mut *self.shared.cancels.lock());
        let count = cancels.len();
        for (member, cancel) in cancels {
            trace!(member = %member, "Closing member subscription");
            cancel();
        }

        self.shared.cache.lock().clear();
        debug!(subscriptions = count, "Feed subscriptions cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Number of member subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.cancels.lock().len()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .field("active", &self.active_subscriptions())
            .finish()
    }
}

/// A started feed: the resolved graph and the handle that tears it down.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub graph: SocialGraph,
    pub handle: CancelHandle,
}

/// Opens and owns one live subscription per social-graph member.
pub struct SubscriptionManager {
    profiles: Arc<dyn ProfileStore>,
    source: Arc<dyn LiveLogSource>,
    retry: RetryPolicy,
}

impl SubscriptionManager {
    pub fn new(profiles: Arc<dyn ProfileStore>, source: Arc<dyn LiveLogSource>, retry: RetryPolicy) -> Self {
        Self {
            profiles,
            source,
            retry,
        }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub fn source(&self) -> &Arc<dyn LiveLogSource> {
        &self.source
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolve the viewer's graph once and subscribe to every member.
    ///
    /// The aggregate is emitted on every push from any member; there is no
    /// barrier waiting for all members' first snapshots. An empty graph
    /// emits one empty aggregate.
    pub async fn start(
        &self,
        viewer: &MemberId,
        on_update: UpdateCallback,
        on_error: MemberErrorCallback,
    ) -> Result<Subscription> {
        let graph = resolve_members(self.profiles.as_ref(), viewer, &self.retry).await?;
        let handle = self.open(&graph.members, on_update, on_error)?;
        Ok(Subscription { graph, handle })
    }

    /// Subscribe to an already-resolved member set.
    ///
    /// A configuration failure while opening any member aborts the whole set;
    /// other open failures are reported through `on_error` and the remaining
    /// members are still opened.
    pub fn open(
        &self,
        members: &[MemberId],
        on_update: UpdateCallback,
        on_error: MemberErrorCallback,
    ) -> Result<CancelHandle> {
        let shared = Arc::new(Shared {
            cache: Mutex::new(SnapshotCache::new(members.to_vec())),
            cancels: Mutex::new(Vec::with_capacity(members.len())),
            cancelled: AtomicBool::new(false),
        });
        let handle = CancelHandle {
            shared: Arc::clone(&shared),
        };

        if members.is_empty() {
            let aggregate = shared.cache.lock().recombine();
            on_update(aggregate);
            return Ok(handle);
        }

        info!(members = members.len(), "Opening feed subscriptions");

        for member in members {
            if shared.is_cancelled() {
                break;
            }

            let on_snapshot = snapshot_callback(&shared, member, &on_update);
            let on_member_error = error_callback(&shared, member, &on_error);

            match self.source.subscribe(member, on_snapshot, on_member_error) {
                Ok(cancel) => {
                    let mut cancels = shared.cancels.lock();
                    if shared.is_cancelled() {
                        // Torn down while this member was opening.
                        drop(cancels);
                        cancel();
                    } else {
                        cancels.push((member.clone(), cancel));
                    }
                }
                Err(e @ FeedError::Configuration(_)) => {
                    warn!(member = %member, error = %e, "Backend unavailable, aborting feed");
                    handle.cancel();
                    return Err(e);
                }
                Err(e) => {
                    warn!(member = %member, error = %e, "Failed to open member subscription");
                    on_error(member.clone(), e);
                }
            }
        }

        Ok(handle)
    }
}

fn snapshot_callback(shared: &Arc<Shared>, member: &MemberId, on_update: &UpdateCallback) -> SnapshotCallback {
    let shared = Arc::clone(shared);
    let member = member.clone();
    let on_update = Arc::clone(on_update);

    Arc::new(move |raw: RawSnapshot| {
        if shared.is_cancelled() {
            return;
        }

        let snapshot = normalize_snapshot(&member, raw);
        let aggregate = {
            let mut cache = shared.cache.lock();
            if shared.is_cancelled() {
                return;
            }
            cache.replace(&member, snapshot)
        };

        if let Some(aggregate) = aggregate {
            deliver(&shared, &member, aggregate, &on_update);
        }
    })
}

/// Hand a recombined aggregate to the consumer unless the set was cancelled
/// after the cache lock was released.
fn deliver(shared: &Shared, member: &MemberId, aggregate: Aggregate, on_update: &UpdateCallback) {
    if shared.is_cancelled() {
        trace!(member = %member, revision = aggregate.revision, "Dropping aggregate of cancelled feed");
        return;
    }
    trace!(
        member = %member,
        revision = aggregate.revision,
        entries = aggregate.entries.len(),
        "Recombined feed"
    );
    on_update(aggregate);
}

fn error_callback(shared: &Arc<Shared>, member: &MemberId, on_error: &MemberErrorCallback) -> ErrorCallback {
    let shared = Arc::clone(shared);
    let member = member.clone();
    let on_error = Arc::clone(on_error);

    Arc::new(move |err: FeedError| {
        if shared.is_cancelled() {
            return;
        }
        warn!(member = %member, error = %err, "Member subscription failed");
        on_error(member.clone(), err);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::types::Profile;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    type Updates = Arc<Mutex<Vec<Aggregate>>>;
    type Errors = Arc<Mutex<Vec<(MemberId, FeedError)>>>;

    fn recorders() -> (Updates, UpdateCallback, Errors, MemberErrorCallback) {
        let updates: Updates = Arc::new(Mutex::new(Vec::new()));
        let errors: Errors = Arc::new(Mutex::new(Vec::new()));

        let u = Arc::clone(&updates);
        let on_update: UpdateCallback = Arc::new(move |agg| u.lock().push(agg));
        let e = Arc::clone(&errors);
        let on_error: MemberErrorCallback = Arc::new(move |member, err| e.lock().push((member, err)));

        (updates, on_update, errors, on_error)
    }

    fn manager(backend: &Arc<MemoryBackend>) -> SubscriptionManager {
        SubscriptionManager::new(backend.clone(), backend.clone(), RetryPolicy::default())
    }

    fn setup() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.put_profile("u1", Profile::new("Ada").following("u2"));
        backend.put_profile("u2", Profile::new("Bo"));
        backend
    }

    #[tokio::test]
    async fn test_one_subscription_per_member() {
        let backend = setup();
        let (_updates, on_update, _errors, on_error) = recorders();

        let sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();

        assert_eq!(sub.graph.members.len(), 2);
        assert_eq!(sub.handle.active_subscriptions(), 2);
        assert_eq!(backend.subscriber_count(&"u1".into()), 1);
        assert_eq!(backend.subscriber_count(&"u2".into()), 1);
    }

    #[tokio::test]
    async fn test_each_push_recombines() {
        let backend = setup();
        let (updates, on_update, _errors, on_error) = recorders();
        let _sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();

        // Each member's current (empty) snapshot arrives on subscribe.
        {
            let initial = updates.lock();
            assert_eq!(initial.len(), 2);
            assert_eq!(initial[0].members_reported, 1);
            assert_eq!(initial[1].members_reported, 2);
            assert!(initial[1].entries.is_empty());
        }
        updates.lock().clear();

        backend.push_raw_log(&"u2".into(), json!({"createdAt": "2024-01-15-19-00", "duration": "45"}));
        backend.push_raw_log(&"u1".into(), json!({"createdAt": "2024-01-16-14-00", "duration": "60"}));

        let updates = updates.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].entries.len(), 1);
        assert_eq!(updates[1].entries.len(), 2);
        assert_eq!(updates[1].entries[0].author, "Ada");
        assert!(updates[1].revision > updates[0].revision);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let backend = setup();
        let (updates, on_update, _errors, on_error) = recorders();
        let sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();
        let delivered = updates.lock().len();

        sub.handle.cancel();
        sub.handle.cancel();

        assert!(sub.handle.is_cancelled());
        assert_eq!(sub.handle.active_subscriptions(), 0);
        assert_eq!(backend.subscriber_count(&"u1".into()), 0);
        assert_eq!(backend.subscriber_count(&"u2".into()), 0);

        backend.push_raw_log(&"u1".into(), json!({"createdAt": "2024-01-16-14-00", "duration": "60"}));
        assert_eq!(updates.lock().len(), delivered);
    }

    #[tokio::test]
    async fn test_cancel_from_inside_callback() {
        let backend = setup();
        let slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let on_update: UpdateCallback = {
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            Arc::new(move |_agg| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = slot.lock().clone() {
                    handle.cancel();
                    handle.cancel();
                }
            })
        };
        let on_error: MemberErrorCallback = Arc::new(|_, _| {});

        let sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        *slot.lock() = Some(sub.handle.clone());

        backend.push_raw_log(&"u1".into(), json!({"createdAt": "2024-01-16-14-00", "duration": "60"}));
        backend.push_raw_log(&"u2".into(), json!({"createdAt": "2024-01-16-15-00", "duration": "60"}));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(sub.handle.is_cancelled());
        assert_eq!(backend.subscriber_count(&"u2".into()), 0);
    }

    #[test]
    fn test_cancel_between_recombine_and_delivery() {
        let (updates, on_update, _errors, _on_error) = recorders();
        let members = vec![MemberId::from("u1")];
        let shared = Shared {
            cache: Mutex::new(SnapshotCache::new(members.clone())),
            cancels: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        };

        let first = shared.cache.lock().recombine();
        deliver(&shared, &members[0], first, &on_update);
        assert_eq!(updates.lock().len(), 1);

        let second = shared.cache.lock().recombine();
        shared.cancelled.store(true, Ordering::Release);
        deliver(&shared, &members[0], second, &on_update);
        assert_eq!(updates.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_member_error_keeps_siblings_alive() {
        let backend = setup();
        let (updates, on_update, errors, on_error) = recorders();
        let sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();

        backend.fail_member(&"u2".into(), FeedError::Source("permission-denied".into()));
        backend.push_raw_log(&"u1".into(), json!({"createdAt": "2024-01-16-14-00", "duration": "60"}));

        assert_eq!(errors.lock().len(), 1);
        assert_eq!(errors.lock()[0].0, MemberId::from("u2"));
        assert_eq!(updates.lock().len(), 3);
        assert_eq!(updates.lock()[2].entries.len(), 1);
        assert!(!sub.handle.is_cancelled());
        assert_eq!(backend.subscriber_count(&"u1".into()), 1);
    }

    #[tokio::test]
    async fn test_empty_graph_emits_empty_aggregate() {
        let backend = Arc::new(MemoryBackend::new());
        let (updates, on_update, _errors, on_error) = recorders();

        let sub = manager(&backend).start(&"ghost".into(), on_update, on_error).await.unwrap();

        assert!(sub.graph.is_empty());
        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].entries.is_empty());
        assert_eq!(updates[0].members_total, 0);
    }

    #[tokio::test]
    async fn test_configuration_failure_aborts_open() {
        let backend = setup();
        backend.fail_next_subscribe(&"u2".into(), FeedError::Configuration("no backend".into()));
        let (_updates, on_update, _errors, on_error) = recorders();

        let result = manager(&backend).start(&"u1".into(), on_update, on_error).await;

        assert!(matches!(result, Err(FeedError::Configuration(_))));
        assert_eq!(backend.subscriber_count(&"u1".into()), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_reported_per_member() {
        let backend = setup();
        backend.fail_next_subscribe(&"u2".into(), FeedError::Source("denied".into()));
        let (_updates, on_update, errors, on_error) = recorders();

        let sub = manager(&backend).start(&"u1".into(), on_update, on_error).await.unwrap();

        assert_eq!(sub.handle.active_subscriptions(), 1);
        assert_eq!(errors.lock()[0].0, MemberId::from("u2"));
    }
}
