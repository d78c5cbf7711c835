//! Task model

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Locally-assigned task identity.
///
/// Unique within the local store only; two devices may assign the same id
/// until their records are reconciled. Together with [`OwnerId`] it addresses
/// a task uniquely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    /// Sentinel for a task the local store has not assigned an id to yet
    pub const UNASSIGNED: Self = Self(0);

    /// Wrap a raw id
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw id value
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Whether the local store still has to assign this id
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 <= 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Identity of the owning user; every query and subscription is scoped to it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a raw owner identity
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get the string representation of this owner
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// A task record, the unit of synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Locally-assigned identifier
    pub id: TaskId,
    /// Short description shown in lists
    pub title: String,
    /// Course or subject the task belongs to
    pub subject: String,
    /// Due date string; `None` or empty means no due date
    #[serde(default)]
    pub due_date: Option<String>,
    /// Completion flag
    #[serde(default)]
    pub is_completed: bool,
    /// Creation timestamp string.
    ///
    /// The sole recency signal: no separate modification timestamp exists,
    /// so conflict resolution approximates "newer" from this value. Kept as
    /// a string because unparseable values must survive round trips.
    pub created_at: String,
    /// Optional scheduled-notification timestamp
    #[serde(default)]
    pub reminder_at: Option<String>,
    /// Import-origin identifier, used for de-duplication on course import
    /// (never for conflict matching)
    #[serde(default)]
    pub external_source_id: Option<String>,
    /// Owning user
    pub owner_id: OwnerId,
}

impl Task {
    /// Create a task stamped with the current time, id still unassigned
    #[must_use]
    pub fn draft(owner: OwnerId, title: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: TaskId::UNASSIGNED,
            title: title.into(),
            subject: subject.into(),
            due_date: None,
            is_completed: false,
            created_at: Utc::now().to_rfc3339(),
            reminder_at: None,
            external_source_id: None,
            owner_id: owner,
        }
    }

    /// Map a remote row document to a task.
    ///
    /// Fallible per row: the caller drops malformed rows without aborting
    /// the batch they arrived in.
    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(document.clone())
            .map_err(|error| Error::MalformedRecord(error.to_string()))
    }

    /// Serialize this task into a remote row document
    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse `created_at`; `None` when absent or unparseable
    #[must_use]
    pub fn parsed_created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    /// Whether a non-empty due date is set
    #[must_use]
    pub fn has_due_date(&self) -> bool {
        matches!(self.due_date.as_deref(), Some(date) if !date.trim().is_empty())
    }
}

/// Parse a timestamp string.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare `YYYY-MM-DD` (midnight
/// UTC). Returns `None` for anything else, including the empty string.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}
