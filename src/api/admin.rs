// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator endpoints for the event queue. Require the admin role.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AdminOnly,
    error::ApiError,
    models::{DeadLetterQuery, DeadLetterView, Envelope, RedriveView},
    state::AppState,
};

/// List events parked in the dead-letter table.
#[utoipa::path(
    get,
    path = "/v1/admin/dead-letters",
    tag = "Admin",
    params(DeadLetterQuery),
    responses(
        (status = 200, description = "Dead-lettered events", body = Envelope<Vec<DeadLetterView>>),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an admin")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_dead_letters(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Query(query): Query<DeadLetterQuery>,
) -> Result<Json<Envelope<Vec<DeadLetterView>>>, ApiError> {
    let letters = state.queue.dead_letters(query.limit()).await?;
    tracing::debug!(admin = %admin.user_id, count = letters.len(), "Dead letters listed");
    Ok(Json(Envelope::success(
        letters.into_iter().map(DeadLetterView::from).collect(),
    )))
}

/// Put a dead-lettered event back on the queue with a fresh attempt count.
#[utoipa::path(
    post,
    path = "/v1/admin/dead-letters/{event_id}/redrive",
    tag = "Admin",
    params(("event_id" = Uuid, Path, description = "Dead-lettered event id")),
    responses(
        (status = 200, description = "Event requeued", body = Envelope<RedriveView>),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No dead letter with this id")
    ),
    security(("bearer_auth" = []))
)]
pub async fn redrive_dead_letter(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Envelope<RedriveView>>, ApiError> {
    state.queue.redrive(event_id).await?;
    tracing::info!(admin = %admin.user_id, %event_id, "Dead letter redriven by operator");
    Ok(Json(Envelope::success(RedriveView { event_id })))
}
