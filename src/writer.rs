//! Append-only write path for new practice logs.

use crate::error::Result;
use crate::records::validate::{validate_log, NewLog, StoredLog};
use crate::retry::RetryPolicy;
use crate::types::{LogRecord, MemberId};
use async_trait::async_trait;
use tracing::info;

/// Append-only log storage. There is no update-in-place.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append_log(&self, owner: &MemberId, log: &StoredLog) -> Result<()>;
}

/// Validate `input` and append it to `owner`'s logs.
///
/// Validation failures are returned without touching the sink. Transient
/// write failures are retried per `retry`.
pub async fn append_log(
    sink: &dyn LogSink,
    owner: &MemberId,
    input: &NewLog,
    retry: &RetryPolicy,
) -> Result<LogRecord> {
    let stored = validate_log(input)?;

    retry
        .run("append_log", || sink.append_log(owner, &stored))
        .await?;

    info!(
        owner = %owner,
        created_at = %stored.created_at,
        duration = %stored.duration,
        "Appended practice log"
    );
    Ok(stored.to_record())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::memory::MemoryBackend;

    #[tokio::test]
    async fn test_append_valid_log() {
        let backend = MemoryBackend::new();
        let owner = MemberId::from("u1");

        let record = append_log(
            &backend,
            &owner,
            &NewLog::new("45").at("2024-01-15-19-00").tag("Piano"),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(record.tags, vec!["Piano"]);
        let stored = backend.logs(&owner);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["normalizedTags"][0], "piano");
        assert_eq!(stored[0]["duration"], "45");
    }

    #[tokio::test]
    async fn test_invalid_log_is_not_written() {
        let backend = MemoryBackend::new();
        let owner = MemberId::from("u1");

        let result = append_log(&backend, &owner, &NewLog::new("2000"), &RetryPolicy::default()).await;

        assert!(matches!(result, Err(FeedError::Validation(_))));
        assert!(backend.logs(&owner).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_write_is_retried() {
        let backend = MemoryBackend::new();
        let owner = MemberId::from("u1");
        backend.fail_next_writes(2, FeedError::TransientNetwork("network down".into()));

        append_log(&backend, &owner, &NewLog::new("30"), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(backend.logs(&owner).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_fails_after_retries() {
        let backend = MemoryBackend::new();
        let owner = MemberId::from("u1");
        backend.fail_next_writes(5, FeedError::TransientNetwork("network down".into()));

        let result = append_log(&backend, &owner, &NewLog::new("30"), &RetryPolicy::default()).await;
        assert!(matches!(result, Err(FeedError::TransientNetwork(_))));
        assert!(backend.logs(&owner).is_empty());
    }
}
