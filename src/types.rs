//! Core data types shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a user (a member of the social graph).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A practice log in canonical, normalized form.
///
/// Logs are immutable once written; the store is append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Timestamp token (`YYYY-MM-DD-HH-mm`, UTC).
    pub created_at: String,
    /// Free-form numeric string, validated to 1..=1440 at write time.
    pub duration_minutes: String,
    /// Topic labels as entered.
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// A log annotated with its author, as it appears in the aggregated feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    /// Author display name at aggregation time.
    pub author: String,
    pub author_id: MemberId,
    #[serde(flatten)]
    pub log: LogRecord,
}

/// Latest known state of one member's logs.
///
/// Replaced wholesale on every push from that member's source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSnapshot {
    pub author_id: MemberId,
    pub display_name: String,
    pub logs: Vec<LogRecord>,
}

/// Snapshot as delivered by a live source, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
}

impl RawSnapshot {
    pub fn new(display_name: impl Into<String>, logs: Vec<serde_json::Value>) -> Self {
        Self {
            display_name: display_name.into(),
            logs,
        }
    }
}

/// Persisted user profile, read once when the subscription set is built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub followee_ids: Vec<MemberId>,
}

impl Profile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            followee_ids: Vec::new(),
        }
    }

    /// Add a followee (builder style).
    pub fn following(mut self, id: impl Into<MemberId>) -> Self {
        self.followee_ids.push(id.into());
        self
    }
}

/// One recombination of all cached snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Increases by one on every recombination within a subscription set.
    pub revision: u64,
    /// Entries sorted newest first.
    pub entries: Vec<FeedEntry>,
    /// Members that have delivered at least one snapshot.
    pub members_reported: usize,
    /// Members in the resolved social graph.
    pub members_total: usize,
}
