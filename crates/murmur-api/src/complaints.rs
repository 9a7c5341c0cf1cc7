//! Anonymous submission and tracking.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use murmur_db::models::NewComplaint;
use murmur_types::api::{SubmitComplaintResponse, TrackingResponse, UploadAttachmentsResponse};
use murmur_types::tracking::{generate_tracking_code, is_tracking_code};
use murmur_types::{Category, Priority};

use crate::error::{AppError, AppResult};
use crate::rate_limit::client_key;
use crate::state::AppState;
use crate::upload::{self, MultipartForm};
use crate::views;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

#[derive(Debug)]
struct Submission {
    title: String,
    description: String,
    category: Category,
    priority: Priority,
}

fn required_text(form: &MultipartForm, name: &str, label: &str, max_chars: usize) -> AppResult<String> {
    let value = form.field(name).map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::validation(format!("{label} is required")));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "{label} must be at most {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

fn parse_submission(form: &MultipartForm) -> AppResult<Submission> {
    let title = required_text(form, "title", "Title", MAX_TITLE_CHARS)?;
    let description = required_text(form, "description", "Description", MAX_DESCRIPTION_CHARS)?;

    let category = form
        .field("category")
        .map(str::trim)
        .ok_or_else(|| AppError::validation("Category is required"))?
        .parse::<Category>()
        .map_err(|e| AppError::validation(format!("Invalid category: {}", e.value)))?;
    let priority = form
        .field("priority")
        .map(str::trim)
        .ok_or_else(|| AppError::validation("Priority is required"))?
        .parse::<Priority>()
        .map_err(|e| AppError::validation(format!("Invalid priority: {}", e.value)))?;

    Ok(Submission {
        title,
        description,
        category,
        priority,
    })
}

/// POST /api/complaints
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> AppResult<(StatusCode, Json<SubmitComplaintResponse>)> {
    state.submit_limiter.enforce(&client_key(&headers)).await?;

    let mut form = upload::read_multipart(multipart, state.config.max_files).await?;
    let submission = parse_submission(&form)?;
    let files = std::mem::take(&mut form.files);

    // Reject bad files before anything is persisted.
    state.validator.validate_all(&files).await?;

    let id = Uuid::new_v4();
    let tracking_code = generate_tracking_code();

    // Files first, then the complaint and its attachment rows in one
    // transaction. A failure at either step leaves nothing behind.
    let complaint_id = id.to_string();
    let pending = upload::write_files(&state.store, &complaint_id, files).await?;
    let code = tracking_code.clone();
    let stored = upload::record_attachments(&state, pending, move |db, pending| {
        db.insert_complaint_with_attachments(
            &NewComplaint {
                id: &complaint_id,
                tracking_code: &code,
                title: &submission.title,
                description: &submission.description,
                category: submission.category,
                priority: submission.priority,
            },
            &upload::new_attachments(&complaint_id, pending),
        )
    })
    .await?;
    info!(
        "Complaint {} submitted with {} attachment(s)",
        tracking_code,
        stored.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitComplaintResponse { id, tracking_code }),
    ))
}

/// Tracking codes are issued uppercase; accept any casing from clients.
fn normalize_code(raw: &str) -> AppResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if is_tracking_code(&code) {
        Ok(code)
    } else {
        Err(AppError::not_found("Complaint"))
    }
}

/// POST /api/complaints/{tracking_code}/attachments
pub async fn upload_attachments(
    State(state): State<AppState>,
    Path(tracking_code): Path<String>,
    headers: HeaderMap,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> AppResult<(StatusCode, Json<UploadAttachmentsResponse>)> {
    state.submit_limiter.enforce(&client_key(&headers)).await?;

    let code = normalize_code(&tracking_code)?;
    let lookup = code.clone();
    let complaint = state
        .run_db(move |db| db.get_complaint_by_tracking_code(&lookup))
        .await?
        .ok_or_else(|| AppError::not_found("Complaint"))?;

    let form = upload::read_multipart(multipart, state.config.max_files).await?;
    if form.files.is_empty() {
        return Err(AppError::validation("At least one file is required"));
    }
    state.validator.validate_all(&form.files).await?;

    let rows = upload::store_attachments(&state, &complaint.id, form.files).await?;
    let attachments = rows
        .iter()
        .map(|row| views::attachment_view(row, &code))
        .collect::<anyhow::Result<Vec<_>>>()?;
    info!("Added {} attachment(s) to {}", attachments.len(), code);

    Ok((
        StatusCode::CREATED,
        Json(UploadAttachmentsResponse {
            tracking_code: code,
            attachments,
        }),
    ))
}

/// GET /api/track/{tracking_code}
pub async fn track(
    State(state): State<AppState>,
    Path(tracking_code): Path<String>,
) -> AppResult<Json<TrackingResponse>> {
    let code = normalize_code(&tracking_code)?;

    let (complaint, attachments) = state
        .run_db(move |db| {
            let Some(complaint) = db.get_complaint_by_tracking_code(&code)? else {
                return Ok(None);
            };
            let attachments = db.list_attachments(&complaint.id)?;
            Ok(Some((complaint, attachments)))
        })
        .await?
        .ok_or_else(|| AppError::not_found("Complaint"))?;

    Ok(Json(views::tracking_response(complaint, &attachments)?))
}
