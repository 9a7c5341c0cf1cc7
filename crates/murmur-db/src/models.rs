//! Database row types — these map directly to SQLite rows.
//! Distinct from murmur-types API models to keep the DB layer independent.

use murmur_types::api::{SortField, SortOrder};
use murmur_types::{Category, Priority, Status};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

pub struct ComplaintRow {
    pub id: String,
    pub tracking_code: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub attachment_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewComplaint<'a> {
    pub id: &'a str,
    pub tracking_code: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub category: Category,
    pub priority: Priority,
}

pub struct AttachmentRow {
    pub id: String,
    pub complaint_id: String,
    pub file_name: String,
    pub storage_key: String,
    pub file_size: i64,
    pub mime_type: String,
    pub sha256: String,
    pub created_at: String,
}

pub struct NewAttachment<'a> {
    pub id: &'a str,
    pub complaint_id: &'a str,
    pub file_name: &'a str,
    pub storage_key: &'a str,
    pub file_size: i64,
    pub mime_type: &'a str,
    pub sha256: &'a str,
}

/// Fields an administrator may change. `None` leaves the column untouched.
#[derive(Default)]
pub struct ComplaintChanges {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
}

/// Outcome of an update: the row as it was and as it is now.
pub struct ComplaintUpdate {
    pub before: ComplaintRow,
    pub after: ComplaintRow,
}

/// Filter, sort and page window for the admin complaint list.
pub struct ComplaintFilter {
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: u32,
    pub offset: u64,
}

impl Default for ComplaintFilter {
    fn default() -> Self {
        Self {
            status: None,
            category: None,
            priority: None,
            search: None,
            sort_by: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
            limit: 10,
            offset: 0,
        }
    }
}

pub struct NewNotification<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub kind: &'a str,
    pub complaint_id: Option<&'a str>,
    pub created_at: &'a str,
}

/// A notification joined with one user's read flag.
pub struct UserNotificationRow {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub complaint_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// Grouped counts for the analytics dashboard. Keys are the stored enum text.
#[derive(Debug, Default)]
pub struct ComplaintCounts {
    pub total: u64,
    pub by_category: Vec<(String, u64)>,
    pub by_status: Vec<(String, u64)>,
    pub by_priority: Vec<(String, u64)>,
}
