use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to staff over the live notification stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveEvent {
    /// A notification row was created and fanned out to active users
    NotificationCreate(NotificationPayload),
}

impl LiveEvent {
    /// SSE `event:` name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotificationCreate(_) => "notification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub complaint_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
