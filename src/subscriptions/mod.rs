//! Live per-member subscriptions.
//!
//! A [`LiveLogSource`] pushes the full log array of one member on every
//! change. The [`SubscriptionManager`] opens one subscription per member of
//! the viewer's social graph, keeps the latest snapshot per member in a
//! [`SnapshotCache`], and recombines the feed on every push.

pub mod cache;
pub mod manager;

pub use cache::SnapshotCache;
pub use manager::{CancelHandle, MemberErrorCallback, Subscription, SubscriptionManager, UpdateCallback};

use crate::error::{FeedError, Result};
use crate::types::{MemberId, RawSnapshot};
use async_trait::async_trait;
use std::sync::Arc;

/// Called with a member's full snapshot on every change.
pub type SnapshotCallback = Arc<dyn Fn(RawSnapshot) + Send + Sync>;

/// Called when a member's live source ends with an error.
pub type ErrorCallback = Arc<dyn Fn(FeedError) + Send + Sync>;

/// Stops delivery for one subscription.
pub type CancelFn = Box<dyn FnOnce() + Send>;

/// Push-based source of member logs.
#[async_trait]
pub trait LiveLogSource: Send + Sync {
    /// Open a live subscription for `member`.
    ///
    /// Every delivery carries the member's complete current log array, never
    /// a delta. Returning `Err` means the subscription could not be opened.
    fn subscribe(
        &self,
        member: &MemberId,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<CancelFn>;

    /// Read a member's current snapshot once. `Ok(None)` when the member has
    /// no log document.
    async fn read_snapshot(&self, member: &MemberId) -> Result<Option<RawSnapshot>>;
}
