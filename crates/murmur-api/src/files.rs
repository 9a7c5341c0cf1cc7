use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::session::MaybeSession;
use crate::state::AppState;
use crate::upload::sanitize_filename;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub code: Option<String>,
}

/// GET /api/attachments/{id}/download
///
/// Allowed for any staff session, or for anyone presenting the tracking
/// code of the complaint that owns the attachment.
pub async fn download(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    Path(id): Path<String>,
    WithRejection(Query(query), _): WithRejection<Query<DownloadQuery>, AppError>,
) -> AppResult<Response> {
    let id = id
        .parse::<Uuid>()
        .map_err(|_| AppError::not_found("Attachment"))?
        .to_string();

    let (attachment, tracking_code) = state
        .run_db(move |db| db.get_attachment_with_owner(&id))
        .await?
        .ok_or_else(|| AppError::not_found("Attachment"))?;

    let code_matches = query
        .code
        .as_deref()
        .map(|c| c.trim().eq_ignore_ascii_case(&tracking_code))
        .unwrap_or(false);
    if session.is_none() && !code_matches {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    let file = state.store.open(&attachment.storage_key).await.map_err(|e| {
        error!("Stored file {} unreadable: {}", attachment.storage_key, e);
        AppError::not_found("Attachment")
    })?;
    debug!("Serving attachment {} ({} bytes)", attachment.id, attachment.file_size);

    let content_type = HeaderValue::from_str(&attachment.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&attachment.file_name)
    ))
    .map_err(anyhow::Error::from)?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
