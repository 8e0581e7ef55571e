// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound webhook delivery for completed transfers.
//!
//! Bodies are JSON. When a secret is configured the body is signed with
//! HMAC-SHA256 and the base64 digest sent in `X-Signature`. `X-Event-Id`
//! carries the queue event id, which stays the same across redeliveries.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::ledger::TransferRecord;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const EVENT_ID_HEADER: &str = "X-Event-Id";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook endpoint returned {0}")]
    Status(u16),

    #[error("webhook payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid webhook signing key")]
    SigningKey,
}

impl DeliveryError {
    /// Client errors other than 408/429 will not succeed on retry.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Status(code) => (400..500).contains(code) && *code != 408 && *code != 429,
            DeliveryError::Encode(_) | DeliveryError::SigningKey => true,
            DeliveryError::Transport(_) => false,
        }
    }
}

/// JSON body posted to the webhook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TransferWebhook<'a> {
    pub event_id: Uuid,
    pub event_type: &'a str,
    pub transfer_id: Uuid,
    pub from_user_id: &'a str,
    pub to_user_id: &'a str,
    pub amount: u64,
    pub status: &'a str,
    pub created_at: String,
}

impl<'a> TransferWebhook<'a> {
    pub fn new(event_id: Uuid, event_type: &'a str, record: &'a TransferRecord) -> Self {
        Self {
            event_id,
            event_type,
            transfer_id: record.id,
            from_user_id: &record.from_user_id,
            to_user_id: &record.to_user_id,
            amount: record.amount,
            status: record.status.as_str(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, payload: &TransferWebhook<'_>) -> Result<(), DeliveryError>;
}

/// Used when no webhook URL is configured.
pub struct NoopWebhookSink;

#[async_trait]
impl WebhookSink for NoopWebhookSink {
    async fn deliver(&self, _payload: &TransferWebhook<'_>) -> Result<(), DeliveryError> {
        Ok(())
    }
}

pub struct HttpWebhookSink {
    http: Client,
    url: Url,
    secret: Option<String>,
}

impl HttpWebhookSink {
    pub fn new(url: Url, secret: Option<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { http, url, secret })
    }
}

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, DeliveryError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| DeliveryError::SigningKey)?;
    mac.update(body);
    Ok(Base64::encode_string(&mac.finalize().into_bytes()))
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, payload: &TransferWebhook<'_>) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .http
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header(EVENT_ID_HEADER, payload.event_id.to_string());
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        tracing::debug!(
            event_id = %payload.event_id,
            transfer_id = %payload.transfer_id,
            "Webhook delivered"
        );
        Ok(())
    }
}
