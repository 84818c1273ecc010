//! UI-facing feed state.

pub mod manager;

pub use manager::{FeedAction, FeedState, FeedStateManager, FeedStatus, FeedView};
