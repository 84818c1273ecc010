//! Client-side feed engine for a practice-logging social app.
//!
//! Resolves who a viewer follows, keeps one live subscription per member,
//! merges every member's logs into one newest-first feed, and exposes it
//! filtered and paginated through an explicit state machine.
//!
//! ```text
//! ProfileStore ──► graph ──► SubscriptionManager ──► SnapshotCache
//!                                   ▲                     │ recombine
//!                         LiveLogSource pushes            ▼
//!                                                FeedState (filter, page)
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod feed;
pub mod graph;
pub mod memory;
pub mod records;
pub mod retry;
pub mod session;
pub mod state;
pub mod subscriptions;
pub mod types;
pub mod writer;

#[cfg(feature = "napi")]
mod napi;

pub use config::{FeedConfig, MineMatch};
pub use diagnostics::{ErrorEntry, ErrorLog};
pub use error::{FeedError, Result};
pub use feed::{aggregate, apply_filters, FilterState, Pagination, Predicate, ViewerIdentity};
pub use graph::{resolve_members, ProfileStore, SocialGraph};
pub use memory::MemoryBackend;
pub use records::{
    compare_newest_first, format_token, normalize_log, normalize_snapshot, parse_token, unwrap_value,
    validate_log, NewLog, StoredLog,
};
pub use retry::RetryPolicy;
pub use session::FeedSession;
pub use state::{FeedAction, FeedState, FeedStateManager, FeedStatus, FeedView};
pub use subscriptions::{CancelHandle, LiveLogSource, SnapshotCache, Subscription, SubscriptionManager};
pub use types::{Aggregate, FeedEntry, LogRecord, MemberId, Profile, RawSnapshot, UserSnapshot};
pub use writer::{append_log, LogSink};
