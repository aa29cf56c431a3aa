//! Provider callbacks: WhatsApp Cloud API, payment gateway and carrier tracking.
//!
//! Every event is keyed by `(provider, external_id)`. The store records the key and
//! applies the downstream effects in one call, so a redelivered event is answered
//! with success without touching anything twice.

pub mod payments;
pub mod storage;
pub mod tracking;
pub mod whatsapp;

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::core::shared::store::StoreError;

pub use payments::{payment_effect, PaymentEffect, PaymentWebhook};
pub use tracking::{resolve_shipping_status, TrackingWebhook};
pub use whatsapp::{InboundMessage, WhatsAppWebhook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    WhatsApp,
    Payments,
    Tracking,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Payments => "payments",
            Self::Tracking => "tracking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub provider: Provider,
    pub external_id: String,
}

impl IdempotencyKey {
    pub fn new(provider: Provider, external_id: impl Into<String>) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
        }
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider.as_str(), self.external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<usize>,
}

impl WebhookAck {
    pub fn single(outcome: IngestOutcome) -> Self {
        let status = match outcome {
            IngestOutcome::Processed => "processed",
            IngestOutcome::Duplicate => "duplicate",
        };
        Self {
            status,
            processed: None,
            duplicates: None,
        }
    }

    pub fn ignored() -> Self {
        Self {
            status: "ignored",
            processed: None,
            duplicates: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Invalid payload: {0}")]
    BadPayload(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadPayload(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Webhook processing failed; provider will retry");
        } else {
            tracing::warn!(error = %self, "Webhook rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Write side used by the webhook handlers. Every method that takes an
/// [`IdempotencyKey`] records it and applies its effects atomically.
#[async_trait]
pub trait InboundLedger: Send + Sync {
    async fn org_for_phone_number_id(&self, phone_number_id: &str) -> Result<Option<Uuid>, StoreError>;
    /// Matches the sender to a lead (creating one at stage `new`) and stores the message.
    async fn record_whatsapp_message(
        &self,
        key: &IdempotencyKey,
        message: &InboundMessage,
    ) -> Result<IngestOutcome, StoreError>;
    /// Advances the delivery status of a stored outbound or inbound message.
    /// Returns false when the message is unknown or the status would go backwards.
    async fn update_message_status(
        &self,
        external_id: &str,
        status: &str,
    ) -> Result<bool, StoreError>;
    async fn apply_payment_event(
        &self,
        key: &IdempotencyKey,
        sale_id: Option<Uuid>,
        effect: &PaymentEffect,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, StoreError>;
    async fn apply_tracking_event(
        &self,
        key: &IdempotencyKey,
        event: &TrackingWebhook,
        payload: &serde_json::Value,
    ) -> Result<IngestOutcome, StoreError>;
}

pub fn configure_webhook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/webhook/whatsapp",
            get(whatsapp::handle_verify).post(whatsapp::handle_webhook),
        )
        .route("/webhook/payments", post(payments::handle_webhook))
        .route("/webhook/tracking", post(tracking::handle_webhook))
}
