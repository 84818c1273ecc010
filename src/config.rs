//! Feed configuration.

use crate::error::{FeedError, Result};
use crate::retry::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// How the "mine only" filter decides a log belongs to the viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MineMatch {
    /// Author display name equals the viewer's display name (case-sensitive).
    ///
    /// Two users sharing a display name both match. Kept as the default
    /// because existing clients rely on it.
    #[default]
    DisplayName,
    /// Author id equals the viewer's id.
    AuthorId,
}

/// Feed engine configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Entries revealed per page.
    pub page_size: usize,

    /// Keep live subscriptions open; otherwise read each member once.
    pub realtime: bool,

    /// Retry policy for one-shot reads and writes.
    pub retry: RetryPolicy,

    /// Entries retained by the diagnostics error log.
    pub error_log_capacity: usize,

    pub mine_match: MineMatch,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            realtime: true,
            retry: RetryPolicy::default(),
            error_log_capacity: 100,
            mine_match: MineMatch::default(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from `FEED_*` environment variables, falling back
    /// to defaults for unset keys.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let retry = RetryPolicy {
            max_attempts: try_load("FEED_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: Duration::from_millis(try_load(
                "FEED_RETRY_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            ..defaults.retry
        };

        let config = Self {
            page_size: try_load("FEED_PAGE_SIZE", defaults.page_size)?,
            realtime: try_load("FEED_REALTIME", defaults.realtime)?,
            retry,
            error_log_capacity: try_load("FEED_ERROR_LOG_CAPACITY", defaults.error_log_capacity)?,
            mine_match: if try_load("FEED_MINE_BY_ID", false)? {
                MineMatch::AuthorId
            } else {
                MineMatch::DisplayName
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FeedError::Configuration("page_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(FeedError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            FeedError::Configuration(format!("Invalid {key} value '{raw}': {e}"))
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
