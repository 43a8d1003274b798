//! Notification endpoints, including the live availability stream

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::notification::{Notification, NotificationQuery},
};

use super::{books::PaginatedResponse, AuthenticatedUser};

#[derive(Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Serialize, ToSchema)]
pub struct MarkedCount {
    pub marked: u64,
}

/// Own notifications, newest first
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications", body = PaginatedNotifications)
    )
)]
pub async fn list_notifications(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<PaginatedResponse<Notification>>> {
    let (items, total) = state
        .services
        .notifications
        .list(claims.user_id, &query)
        .await?;
    Ok(Json(PaginatedResponse::new(items, total, query.page, query.per_page, 20)))
}

#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount)
    )
)]
pub async fn unread_count(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UnreadCount>> {
    let unread = state.services.notifications.count_unread(claims.user_id).await?;
    Ok(Json(UnreadCount { unread }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_read(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.notifications.mark_read(id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All notifications marked read", body = MarkedCount)
    )
)]
pub async fn mark_all_read(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MarkedCount>> {
    let marked = state.services.notifications.mark_all_read(claims.user_id).await?;
    Ok(Json(MarkedCount { marked }))
}

/// Live stream of own notifications (server-sent events, event `notification`)
#[utoipa::path(
    get,
    path = "/notifications/stream",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "text/event-stream of Notification objects")
    )
)]
pub async fn stream(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = claims.user_id;
    let receiver = state.services.notifications.hub().subscribe();

    tracing::debug!(user_id, "Notification stream opened");

    // Lagged receivers skip what they missed; the rows stay in the database
    let events = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(notification) if notification.user_id == user_id => {
            Event::default().event("notification").json_data(&notification).ok().map(Ok)
        }
        _ => None,
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
