//! Write-time validation of new practice logs.

use crate::error::{FeedError, Result};
use crate::records::timestamp::{format_token, is_valid_token};
use crate::types::LogRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shortest accepted session, in minutes.
pub const MIN_DURATION_MINUTES: u32 = 1;

/// Longest accepted session: one day.
pub const MAX_DURATION_MINUTES: u32 = 1440;

/// A log as submitted by the user, before validation.
#[derive(Clone, Debug, Default)]
pub struct NewLog {
    /// Explicit timestamp token; `None` stamps the log with the current time.
    pub created_at: Option<String>,
    pub duration: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl NewLog {
    pub fn new(duration: impl Into<String>) -> Self {
        Self {
            duration: duration.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, token: impl Into<String>) -> Self {
        self.created_at = Some(token.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// The document written to the store for one log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLog {
    pub created_at: String,
    pub duration: String,
    /// Tags as entered, for display.
    pub tags: Vec<String>,
    /// Lowercased, de-duplicated tags, for analytics.
    pub normalized_tags: Vec<String>,
    pub description: Option<String>,
}

impl StoredLog {
    /// The canonical record this document normalizes to.
    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            created_at: self.created_at.clone(),
            duration_minutes: self.duration.clone(),
            tags: self.tags.clone(),
            description: self.description.clone(),
        }
    }
}

/// Validate a new log against the current time.
pub fn validate_log(input: &NewLog) -> Result<StoredLog> {
    validate_log_at(input, Utc::now())
}

/// Validate a new log, stamping it with `now` when no timestamp is given.
pub fn validate_log_at(input: &NewLog, now: DateTime<Utc>) -> Result<StoredLog> {
    let duration = validate_duration(&input.duration)?;

    let created_at = match &input.created_at {
        Some(token) if is_valid_token(token) => token.trim().to_string(),
        Some(token) => {
            return Err(FeedError::Validation(format!(
                "Invalid timestamp token '{}'",
                token
            )))
        }
        None => format_token(now),
    };

    let tags: Vec<String> = input
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let mut normalized_tags: Vec<String> = Vec::with_capacity(tags.len());
    for tag in &tags {
        let lower = tag.to_lowercase();
        if !normalized_tags.contains(&lower) {
            normalized_tags.push(lower);
        }
    }

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(StoredLog {
        created_at,
        duration: duration.to_string(),
        tags,
        normalized_tags,
        description,
    })
}

fn validate_duration(raw: &str) -> Result<u32> {
    let minutes: u32 = raw.trim().parse().map_err(|_| {
        FeedError::Validation(format!("Duration '{}' is not a whole number of minutes", raw))
    })?;

    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(FeedError::Validation(format!(
            "Duration {} out of range ({}-{})",
            minutes, MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
        )));
    }

    Ok(minutes)
}
