//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// Kind stored for availability notices
pub const KIND_BOOK_AVAILABLE: &str = "book_available";

/// Persisted notification
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub book_id: Option<i32>,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Emitted when a book is handed to the next reader of its wait queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityNotice {
    pub user_id: i32,
    pub book_id: i32,
    pub book_title: String,
}

impl AvailabilityNotice {
    pub fn message(&self) -> String {
        format!(
            "\"{}\" is waiting for you. Pick it up at the front desk.",
            self.book_title
        )
    }
}

/// Notification listing parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct NotificationQuery {
    /// Only unread notifications
    pub unread: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
