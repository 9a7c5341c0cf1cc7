use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use murmur_types::api::{NotificationView, UnreadCountResponse};
use murmur_types::events::LiveEvent;

use crate::error::{AppError, AppResult};
use crate::session::{Authorized, StaffOnly};
use crate::state::AppState;
use crate::views;

/// Most recent notifications returned by the list endpoint.
pub const LIST_LIMIT: u32 = 50;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

fn notification_id(raw: &str) -> AppResult<String> {
    raw.parse::<Uuid>()
        .map(|id| id.to_string())
        .map_err(|_| AppError::not_found("Notification"))
}

/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
) -> AppResult<Json<Vec<NotificationView>>> {
    let user_id = auth.user_id.to_string();
    let rows = state
        .run_db(move |db| db.list_user_notifications(&user_id, LIST_LIMIT))
        .await?;
    let views = rows
        .into_iter()
        .map(views::notification_view)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(views))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
) -> AppResult<Json<UnreadCountResponse>> {
    let user_id = auth.user_id.to_string();
    let count = state
        .run_db(move |db| db.unread_notification_count(&user_id))
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// PATCH /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = notification_id(&id)?;
    let user_id = auth.user_id.to_string();
    state
        .run_db(move |db| db.mark_notification_read(&user_id, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
) -> AppResult<StatusCode> {
    let user_id = auth.user_id.to_string();
    state
        .run_db(move |db| db.mark_all_notifications_read(&user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/notifications/{id}
///
/// Removes only the caller's copy; other recipients keep theirs.
pub async fn remove(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = notification_id(&id)?;
    let user_id = auth.user_id.to_string();
    state
        .run_db(move |db| db.remove_user_notification(&user_id, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/notifications/stream
///
/// Server-sent events. The broker subscription lives inside the stream, so
/// it is released as soon as the client disconnects and axum drops the body.
pub async fn stream(
    State(state): State<AppState>,
    auth: Authorized<StaffOnly>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.broker.subscribe();
    let email = auth.into_session().email;
    debug!("{} opened the notification stream", email);

    let events = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().comment("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let LiveEvent::NotificationCreate(payload) = &event;
                    match Event::default().event(event.name()).json_data(payload) {
                        Ok(frame) => {
                            yield Ok::<_, Infallible>(frame);
                        }
                        Err(e) => warn!("Failed to encode live event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{} lagged behind the notification stream by {} event(s)", email, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
