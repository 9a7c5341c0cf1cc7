use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};
use uuid::Uuid;

use murmur_db::models::{ComplaintChanges, ComplaintFilter};
use murmur_types::Status;
use murmur_types::api::{
    ComplaintDetail, ComplaintSummary, ListComplaintsQuery, Paginated, Pagination,
    UpdateComplaintRequest,
};

use crate::error::{AppError, AppResult};
use crate::session::{AdminOnly, Authorized, StaffOnly};
use crate::state::AppState;
use crate::views;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page number and size after clamping client input.
fn page_window(query: &ListComplaintsQuery) -> (u32, u32) {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

fn complaint_id(raw: &str) -> AppResult<String> {
    raw.parse::<Uuid>()
        .map(|id| id.to_string())
        .map_err(|_| AppError::not_found("Complaint"))
}

/// GET /api/admin/complaints
pub async fn list_complaints(
    State(state): State<AppState>,
    _auth: Authorized<StaffOnly>,
    WithRejection(Query(query), _): WithRejection<Query<ListComplaintsQuery>, AppError>,
) -> AppResult<Json<Paginated<ComplaintSummary>>> {
    let (page, limit) = page_window(&query);
    let filter = ComplaintFilter {
        status: query.status,
        category: query.category,
        priority: query.priority,
        search: query.search,
        sort_by: query.sort_by,
        sort_order: query.sort_order,
        limit,
        offset: u64::from(page - 1) * u64::from(limit),
    };

    let (rows, total) = state.run_db(move |db| db.list_complaints(&filter)).await?;
    let data = rows
        .into_iter()
        .map(views::complaint_summary)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(Paginated {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        },
    }))
}

/// GET /api/admin/complaints/{id}
pub async fn get_complaint(
    State(state): State<AppState>,
    _auth: Authorized<StaffOnly>,
    Path(id): Path<String>,
) -> AppResult<Json<ComplaintDetail>> {
    let id = complaint_id(&id)?;
    let (complaint, attachments) = state
        .run_db(move |db| {
            let Some(complaint) = db.get_complaint(&id)? else {
                return Ok(None);
            };
            let attachments = db.list_attachments(&id)?;
            Ok(Some((complaint, attachments)))
        })
        .await?
        .ok_or_else(|| AppError::not_found("Complaint"))?;

    Ok(Json(views::complaint_detail(complaint, &attachments)?))
}

/// PATCH /api/admin/complaints/{id}
pub async fn update_complaint(
    State(state): State<AppState>,
    auth: Authorized<AdminOnly>,
    Path(id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateComplaintRequest>, AppError>,
) -> AppResult<Json<ComplaintDetail>> {
    if req.is_empty() {
        return Err(AppError::validation(
            "Provide at least one of status, priority or category",
        ));
    }
    let id = complaint_id(&id)?;

    let changes = ComplaintChanges {
        status: req.status,
        priority: req.priority,
        category: req.category,
    };
    let lookup = id.clone();
    let (update, attachments) = state
        .run_db(move |db| {
            let Some(update) = db.update_complaint(&lookup, &changes)? else {
                return Ok(None);
            };
            let attachments = db.list_attachments(&lookup)?;
            Ok(Some((update, attachments)))
        })
        .await?
        .ok_or_else(|| AppError::not_found("Complaint"))?;

    let before: Status = update.before.status.parse().map_err(anyhow::Error::from)?;
    let after: Status = update.after.status.parse().map_err(anyhow::Error::from)?;
    info!(
        "{} updated complaint {} (status {} -> {})",
        auth.email, update.after.tracking_code, before, after
    );

    if before != after {
        // Detached: the response does not wait for notification delivery.
        drop(state.notifier.status_changed(&id, &update.after.title, after));
    }

    Ok(Json(views::complaint_detail(update.after, &attachments)?))
}

/// DELETE /api/admin/complaints/{id}
pub async fn delete_complaint(
    State(state): State<AppState>,
    auth: Authorized<AdminOnly>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = complaint_id(&id)?;
    let lookup = id.clone();
    let storage_keys = state
        .run_db(move |db| db.delete_complaint(&lookup))
        .await?
        .ok_or_else(|| AppError::not_found("Complaint"))?;

    for key in &storage_keys {
        if let Err(e) = state.store.delete(key).await {
            warn!("Failed to remove stored file {}: {}", key, e);
        }
    }
    info!(
        "{} deleted complaint {} ({} file(s))",
        auth.email,
        id,
        storage_keys.len()
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps_input() {
        let q = |page, limit| ListComplaintsQuery {
            page,
            limit,
            ..Default::default()
        };
        assert_eq!(page_window(&q(None, None)), (1, 10));
        assert_eq!(page_window(&q(Some(0), Some(0))), (1, 1));
        assert_eq!(page_window(&q(Some(3), Some(500))), (3, 100));
    }

    #[test]
    fn non_uuid_ids_are_not_found() {
        assert!(matches!(complaint_id("../etc"), Err(AppError::NotFound(_))));
        let id = Uuid::new_v4().to_string();
        assert_eq!(complaint_id(&id).unwrap(), id);
    }
}
