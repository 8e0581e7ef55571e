// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ledger::LedgerError;
use crate::queue::QueueError;
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// `{"status":"fail","message":...}`
#[derive(Serialize)]
struct FailBody {
    status: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(FailBody {
            status: "fail",
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InvalidAmount
            | LedgerError::BalanceOverflow
            | LedgerError::SameAccountTransfer => Self::bad_request(err.to_string()),
            LedgerError::SenderNotFound(_) | LedgerError::RecipientNotFound(_) => {
                Self::not_found(err.to_string())
            }
            LedgerError::InsufficientBalance { .. } => Self::unprocessable(err.to_string()),
            LedgerError::LockTimeout(_)
            | LedgerError::Persistence(_)
            | LedgerError::TaskAborted(_) => {
                tracing::error!(error = %err, "Transfer failed on infrastructure");
                Self::unavailable("transfer could not be completed, please retry")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Storage failure");
        Self::unavailable("storage unavailable, please retry")
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(event_id) => Self::not_found(format!("event {event_id} not found")),
            QueueError::StaleReceipt(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            QueueError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::time::Duration;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn into_response_uses_fail_envelope() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"status":"fail","message":"bad data"}"#);
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::InvalidAmount, StatusCode::BAD_REQUEST),
            (LedgerError::SameAccountTransfer, StatusCode::BAD_REQUEST),
            (
                LedgerError::RecipientNotFound("bob".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                LedgerError::InsufficientBalance {
                    available: 1,
                    requested: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::LockTimeout(Duration::from_secs(5)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn persistence_failures_hide_details() {
        let err = LedgerError::Persistence(StoreError::Corrupt("wallet row".into()));
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!api.message.contains("wallet row"));
    }

    #[test]
    fn queue_errors_map_to_statuses() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(ApiError::from(QueueError::NotFound(id)).status, StatusCode::NOT_FOUND);
        let store = QueueError::Store(StoreError::Corrupt("dead letter row".into()));
        let api = ApiError::from(store);
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!api.message.contains("dead letter row"));
    }
}
