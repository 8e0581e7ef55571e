// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer endpoints: move funds and read the caller's transfer history.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::Auth,
    error::ApiError,
    ledger::LedgerError,
    models::{Envelope, ListQuery, TransferHistoryItem, TransferRequest, TransferView},
    state::AppState,
};

/// Transfer funds from the caller's wallet to another user.
#[utoipa::path(
    post,
    path = "/v1/transfers",
    tag = "Transfers",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer committed", body = Envelope<TransferView>),
        (status = 400, description = "Invalid amount or self-transfer"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Sender or recipient wallet not found"),
        (status = 422, description = "Insufficient balance"),
        (status = 503, description = "Transfer could not be completed; nothing was applied")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    Auth(user): Auth,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<Envelope<TransferView>>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let amount = u64::try_from(request.amount)
        .ok()
        .filter(|amount| *amount > 0)
        .ok_or(LedgerError::InvalidAmount)?;
    let to_user_id = request.to_user_id.trim();

    let record = state
        .ledger
        .transfer(&user.user_id, to_user_id, amount)
        .await?;

    Ok(Json(Envelope::success(record.into())))
}

/// List transfers where the caller is sender or recipient.
#[utoipa::path(
    get,
    path = "/v1/transfers",
    tag = "Transfers",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of the caller's transfers", body = Envelope<Vec<TransferHistoryItem>>),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_transfers(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<TransferHistoryItem>>>, ApiError> {
    let page = state
        .history
        .list(&user.user_id, query.page_request())
        .await?;
    Ok(Json(Envelope::page(page)))
}

/// Fetch one transfer the caller took part in.
#[utoipa::path(
    get,
    path = "/v1/transfers/{transfer_id}",
    tag = "Transfers",
    params(("transfer_id" = Uuid, Path, description = "Transfer id")),
    responses(
        (status = 200, description = "The transfer", body = Envelope<TransferView>),
        (status = 404, description = "No such transfer for this caller")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<Envelope<TransferView>>, ApiError> {
    let record = state
        .ledger
        .get_transfer(&user.user_id, transfer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("transfer not found"))?;
    Ok(Json(Envelope::success(record.into())))
}
