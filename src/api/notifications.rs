// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::Auth,
    error::ApiError,
    models::{Envelope, ListQuery, NotificationView},
    state::AppState,
    storage::StoreError,
};

/// List the caller's notifications, newest first by default.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "Notifications",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of notifications", body = Envelope<Vec<NotificationView>>),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<NotificationView>>>, ApiError> {
    let store = state.notifications.clone();
    let request = query.page_request();
    let page = tokio::task::spawn_blocking(move || store.notifications_for(&user.user_id, request))
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;
    Ok(Json(Envelope::page(page)))
}

/// Mark one of the caller's notifications as read.
#[utoipa::path(
    put,
    path = "/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    params(("notification_id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = Envelope<NotificationView>),
        (status = 404, description = "No such notification for this caller")
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Envelope<NotificationView>>, ApiError> {
    let store = state.notifications.clone();
    let updated =
        tokio::task::spawn_blocking(move || store.mark_read(&user.user_id, notification_id))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??
            .ok_or_else(|| ApiError::not_found("notification not found"))?;
    Ok(Json(Envelope::success(updated.into())))
}
