//! In-memory backend implementing every storage port.
//!
//! Used by tests and demos. Subscribers receive the member's current snapshot
//! on subscribe and again after every change. Failures can be injected per
//! operation.

use crate::error::{FeedError, Result};
use crate::graph::ProfileStore;
use crate::records::validate::StoredLog;
use crate::subscriptions::{CancelFn, ErrorCallback, LiveLogSource, SnapshotCallback};
use crate::types::{MemberId, Profile, RawSnapshot};
use crate::writer::LogSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::trace;

struct Subscriber {
    member: MemberId,
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
}

/// Remaining injected failures for one operation kind.
#[derive(Default)]
struct Failures {
    remaining: u32,
    error: Option<FeedError>,
}

impl Failures {
    fn arm(&mut self, count: u32, error: FeedError) {
        self.remaining = count;
        self.error = Some(error);
    }

    fn take(&mut self) -> Option<FeedError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.error.clone()
    }
}

#[derive(Default)]
struct Inner {
    profiles: HashMap<MemberId, Profile>,
    logs: HashMap<MemberId, Vec<Value>>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
    reads: Failures,
    writes: Failures,
    subscribes: HashMap<MemberId, FeedError>,
}

impl Inner {
    /// A member has a log document once it has a profile or any logs.
    fn snapshot(&self, member: &MemberId) -> Option<RawSnapshot> {
        let profile = self.profiles.get(member);
        let logs = self.logs.get(member);
        if profile.is_none() && logs.is_none() {
            return None;
        }

        Some(RawSnapshot::new(
            profile.map(|p| p.display_name.clone()).unwrap_or_default(),
            logs.cloned().unwrap_or_default(),
        ))
    }

    fn snapshot_callbacks(&self, member: &MemberId) -> Vec<SnapshotCallback> {
        self.subscribers
            .values()
            .filter(|s| &s.member == member)
            .map(|s| Arc::clone(&s.on_snapshot))
            .collect()
    }
}

/// Profiles, logs and live subscriptions held in memory.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Data ---

    /// Insert or replace a profile. Subscribers of that member are notified.
    pub fn put_profile(&self, id: impl Into<MemberId>, profile: Profile) {
        let id = id.into();
        self.inner.lock().profiles.insert(id.clone(), profile);
        self.notify(&id);
    }

    pub fn profile(&self, id: &MemberId) -> Option<Profile> {
        self.inner.lock().profiles.get(id).cloned()
    }

    /// Add `followee` to `viewer`'s profile, creating an unnamed profile if needed.
    pub fn follow(&self, viewer: impl Into<MemberId>, followee: impl Into<MemberId>) {
        let viewer = viewer.into();
        let followee = followee.into();
        {
            let mut inner = self.inner.lock();
            let profile = inner.profiles.entry(viewer.clone()).or_default();
            if !profile.followee_ids.contains(&followee) {
                profile.followee_ids.push(followee);
            }
        }
        self.notify(&viewer);
    }

    /// Append a raw stored document to a member's log array and notify.
    ///
    /// The value is stored as given, so malformed records can be injected.
    pub fn push_raw_log(&self, member: &MemberId, log: Value) {
        self.inner.lock().logs.entry(member.clone()).or_default().push(log);
        self.notify(member);
    }

    /// Raw stored documents of one member.
    pub fn logs(&self, member: &MemberId) -> Vec<Value> {
        self.inner.lock().logs.get(member).cloned().unwrap_or_default()
    }

    // --- Failure injection ---

    /// End every live subscription of `member` with `error`.
    pub fn fail_member(&self, member: &MemberId, error: FeedError) {
        let callbacks: Vec<ErrorCallback> = {
            let mut inner = self.inner.lock();
            let ids: Vec<u64> = inner
                .subscribers
                .iter()
                .filter(|(_, s)| &s.member == member)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| inner.subscribers.remove(id))
                .map(|s| s.on_error)
                .collect()
        };

        for on_error in callbacks {
            on_error(error.clone());
        }
    }

    /// Fail the next `count` profile and snapshot reads.
    pub fn fail_next_reads(&self, count: u32, error: FeedError) {
        self.inner.lock().reads.arm(count, error);
    }

    /// Fail the next `count` log appends.
    pub fn fail_next_writes(&self, count: u32, error: FeedError) {
        self.inner.lock().writes.arm(count, error);
    }

    /// Fail the next subscribe call for `member`.
    pub fn fail_next_subscribe(&self, member: &MemberId, error: FeedError) {
        self.inner.lock().subscribes.insert(member.clone(), error);
    }

    /// Live subscriptions currently open for `member`.
    pub fn subscriber_count(&self, member: &MemberId) -> usize {
        self.inner
            .lock()
            .subscribers
            .values()
            .filter(|s| &s.member == member)
            .count()
    }

    /// Deliver the member's current snapshot to its subscribers.
    fn notify(&self, member: &MemberId) {
        let (snapshot, callbacks) = {
            let inner = self.inner.lock();
            (inner.snapshot(member), inner.snapshot_callbacks(member))
        };

        let Some(snapshot) = snapshot else { return };
        trace!(member = %member, subscribers = callbacks.len(), "Delivering snapshot");
        for on_snapshot in callbacks {
            on_snapshot(snapshot.clone());
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn read_profile(&self, id: &MemberId) -> Result<Option<Profile>> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.reads.take() {
            return Err(error);
        }
        Ok(inner.profiles.get(id).cloned())
    }
}

#[async_trait]
impl LiveLogSource for MemoryBackend {
    fn subscribe(
        &self,
        member: &MemberId,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<CancelFn> {
        let (id, current) = {
            let mut inner = self.inner.lock();
            if let Some(error) = inner.subscribes.remove(member) {
                return Err(error);
            }

            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner.subscribers.insert(
                id,
                Subscriber {
                    member: member.clone(),
                    on_snapshot: Arc::clone(&on_snapshot),
                    on_error,
                },
            );
            (id, inner.snapshot(member))
        };

        if let Some(snapshot) = current {
            on_snapshot(snapshot);
        }

        let inner: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().subscribers.remove(&id);
            }
        }))
    }

    async fn read_snapshot(&self, member: &MemberId) -> Result<Option<RawSnapshot>> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.reads.take() {
            return Err(error);
        }
        Ok(inner.snapshot(member))
    }
}

#[async_trait]
impl LogSink for MemoryBackend {
    async fn append_log(&self, owner: &MemberId, log: &StoredLog) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(error) = inner.writes.take() {
                return Err(error);
            }
            let value = serde_json::to_value(log)?;
            inner.logs.entry(owner.clone()).or_default().push(value);
        }
        self.notify(owner);
        Ok(())
    }
}
