//! User-facing notifications built from remote failures.

use chrono::{DateTime, Utc};
use syncwell_core::{ErrorKind, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub action: Option<NotificationAction>,
    /// Input the failure is attributed to, for validation errors.
    pub field: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            action: None,
            field: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, "Done", message)
    }

    /// Report a failed `operation` (e.g. "update ticket").
    pub fn from_remote(operation: &str, err: &RemoteError) -> Self {
        match err.kind {
            ErrorKind::Network => Self::new(
                NotificationLevel::Error,
                "Network error",
                format!("Could not {}: {}", operation, err.message),
            )
            .with_action(NotificationAction::Retry),
            ErrorKind::Validation => {
                let notification = Self::new(
                    NotificationLevel::Warning,
                    "Validation failed",
                    err.message.clone(),
                );
                match err.field() {
                    Some(field) => notification.with_field(field),
                    None => notification,
                }
            }
            ErrorKind::Server | ErrorKind::Unknown => Self::new(
                NotificationLevel::Error,
                format!("Failed to {}", operation),
                "Something went wrong, please try again later",
            )
            .with_action(NotificationAction::Dismiss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_offers_retry() {
        let n = Notification::from_remote("update ticket", &RemoteError::network("offline"));
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.title, "Network error");
        assert_eq!(n.action, Some(NotificationAction::Retry));
    }

    #[test]
    fn test_validation_names_field() {
        let err = RemoteError::validation("validation_error", "title is required")
            .with_details(json!({ "field": "title" }));
        let n = Notification::from_remote("create ticket", &err);
        assert_eq!(n.title, "Validation failed");
        assert_eq!(n.message, "title is required");
        assert_eq!(n.field.as_deref(), Some("title"));
    }

    #[test]
    fn test_server_error_is_generic() {
        let err = RemoteError::server("internal_error", "db pool exhausted");
        let n = Notification::from_remote("delete tag", &err);
        assert_eq!(n.title, "Failed to delete tag");
        assert!(!n.message.contains("db pool"));
    }
}
