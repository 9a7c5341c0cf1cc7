//! Conversions from database rows to API shapes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use murmur_db::models::{AttachmentRow, ComplaintRow, UserNotificationRow};
use murmur_db::timestamp;
use murmur_types::api::{
    AdminAttachmentView, AttachmentView, ComplaintDetail, ComplaintSummary, NotificationView,
    TrackingResponse,
};

fn uuid(value: &str) -> Result<Uuid> {
    value.parse().with_context(|| format!("stored id '{value}' is not a UUID"))
}

fn time(value: &str) -> Result<DateTime<Utc>> {
    timestamp::parse(value).with_context(|| format!("stored timestamp '{value}' is invalid"))
}

/// Download link that carries the tracking code as its credential.
pub fn public_download_url(attachment_id: &str, tracking_code: &str) -> String {
    format!("/api/attachments/{attachment_id}/download?code={tracking_code}")
}

pub fn staff_download_url(attachment_id: &str) -> String {
    format!("/api/attachments/{attachment_id}/download")
}

pub fn attachment_view(row: &AttachmentRow, tracking_code: &str) -> Result<AttachmentView> {
    Ok(AttachmentView {
        id: uuid(&row.id)?,
        file_name: row.file_name.clone(),
        file_size: row.file_size.max(0) as u64,
        mime_type: row.mime_type.clone(),
        download_url: public_download_url(&row.id, tracking_code),
        created_at: time(&row.created_at)?,
    })
}

pub fn admin_attachment_view(row: &AttachmentRow) -> Result<AdminAttachmentView> {
    Ok(AdminAttachmentView {
        id: uuid(&row.id)?,
        file_name: row.file_name.clone(),
        file_size: row.file_size.max(0) as u64,
        mime_type: row.mime_type.clone(),
        sha256: row.sha256.clone(),
        download_url: staff_download_url(&row.id),
        created_at: time(&row.created_at)?,
    })
}

pub fn tracking_response(row: ComplaintRow, attachments: &[AttachmentRow]) -> Result<TrackingResponse> {
    let attachments = attachments
        .iter()
        .map(|a| attachment_view(a, &row.tracking_code))
        .collect::<Result<Vec<_>>>()?;

    Ok(TrackingResponse {
        category: row.category.parse()?,
        priority: row.priority.parse()?,
        status: row.status.parse()?,
        created_at: time(&row.created_at)?,
        updated_at: time(&row.updated_at)?,
        tracking_code: row.tracking_code,
        title: row.title,
        description: row.description,
        attachments,
    })
}

pub fn complaint_summary(row: ComplaintRow) -> Result<ComplaintSummary> {
    Ok(ComplaintSummary {
        id: uuid(&row.id)?,
        category: row.category.parse()?,
        priority: row.priority.parse()?,
        status: row.status.parse()?,
        attachment_count: row.attachment_count,
        created_at: time(&row.created_at)?,
        updated_at: time(&row.updated_at)?,
        tracking_code: row.tracking_code,
        title: row.title,
        description: row.description,
    })
}

pub fn complaint_detail(row: ComplaintRow, attachments: &[AttachmentRow]) -> Result<ComplaintDetail> {
    Ok(ComplaintDetail {
        id: uuid(&row.id)?,
        category: row.category.parse()?,
        priority: row.priority.parse()?,
        status: row.status.parse()?,
        created_at: time(&row.created_at)?,
        updated_at: time(&row.updated_at)?,
        tracking_code: row.tracking_code,
        title: row.title,
        description: row.description,
        attachments: attachments
            .iter()
            .map(admin_attachment_view)
            .collect::<Result<Vec<_>>>()?,
    })
}

pub fn notification_view(row: UserNotificationRow) -> Result<NotificationView> {
    Ok(NotificationView {
        id: uuid(&row.id)?,
        complaint_id: row.complaint_id.as_deref().map(uuid).transpose()?,
        read: row.is_read,
        created_at: time(&row.created_at)?,
        title: row.title,
        message: row.message,
        kind: row.kind,
    })
}
