//! Domain models and wire payloads.
//!
//! The store persists these fields exactly; request/patch types carry only
//! the optional subsets the endpoints accept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an [`Update`].
///
/// Stored as plain TEXT in SQLite; the constraint to these four values is
/// application logic, not a store-level enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::InProgress => "in-progress",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UpdateStatus::Pending),
            "in-progress" => Some(UpdateStatus::InProgress),
            "completed" => Some(UpdateStatus::Completed),
            "failed" => Some(UpdateStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trackable unit of change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub version: String,
    pub status: UpdateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only on successful apply, cleared on successful rollback.
    pub applied_at: Option<DateTime<Utc>>,
    pub rollback_possible: bool,
}

/// Payload for creating an update record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUpdate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
}

/// Partial edit of an update record.
///
/// Only the fields that are present are written; this deliberately bypasses
/// the apply/rollback transition checks (escape hatch for operators).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<UpdateStatus>,
}

impl UpdatePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// Response body for a successful apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub message: String,
    pub status: UpdateStatus,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Response body for a successful rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub message: String,
    pub status: UpdateStatus,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

/// One immutable audit record tied to an update.
///
/// `level` stays a free-form string: unrecognized levels are accepted and
/// mirrored to the process log at debug severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLog {
    pub id: i64,
    pub update_id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub component: Option<String>,
}

/// One page of audit log entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<UpdateLog>,
    /// Filtered count before pagination, not the page length.
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
}

/// A per-user todo item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Partial edit of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Body for the completion toggle endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComplete {
    pub completed: bool,
}

/// A stored account. The password hash never leaves the store layer;
/// responses use [`UserInfo`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing view of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

/// Registration request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: i64,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            UpdateStatus::Pending,
            UpdateStatus::InProgress,
            UpdateStatus::Completed,
            UpdateStatus::Failed,
        ] {
            assert_eq!(UpdateStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UpdateStatus::parse("unknown"), None);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&UpdateStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn patch_reports_empty() {
        assert!(UpdatePatch::default().is_empty());
        let patch = UpdatePatch {
            description: Some("note".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
