use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::finance::SaleStatus;
use crate::security::webhook::{header_str, verify_shared_token, WEBHOOK_TOKEN_HEADER};

use super::{IdempotencyKey, IngestOutcome, InboundLedger, Provider, WebhookAck, WebhookError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentWebhook {
    /// Event id assigned by the gateway; the idempotency key.
    pub id: String,
    pub event: String,
    pub payment: PaymentPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentPayload {
    pub id: String,
    #[serde(default)]
    pub sale_id: Option<Uuid>,
    pub value_cents: i64,
    #[serde(default)]
    pub net_value_cents: Option<i64>,
}

/// What a payment event does to the sale and the tenant's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEffect {
    /// Mark paid and hold `net_cents` as pending until `release_at`. Applied only
    /// when the sale is not already paid, so CONFIRMED followed by RECEIVED credits once.
    Confirm {
        net_cents: i64,
        release_at: DateTime<Utc>,
    },
    SetStatus(SaleStatus),
    RecordOnly,
}

pub fn payment_effect(
    event: &PaymentWebhook,
    now: DateTime<Utc>,
    holding: Duration,
) -> PaymentEffect {
    match event.event.as_str() {
        "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED" => {
            let net_cents = event
                .payment
                .net_value_cents
                .unwrap_or(event.payment.value_cents);
            if net_cents <= 0 {
                warn!(event_id = %event.id, net_cents, "Payment with non-positive net value");
                return PaymentEffect::RecordOnly;
            }
            PaymentEffect::Confirm {
                net_cents,
                release_at: now + holding,
            }
        }
        "PAYMENT_REFUNDED" => PaymentEffect::SetStatus(SaleStatus::Refunded),
        "PAYMENT_OVERDUE" => PaymentEffect::SetStatus(SaleStatus::Overdue),
        _ => PaymentEffect::RecordOnly,
    }
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let check = verify_shared_token(
        &state.config.webhooks.payments_token,
        header_str(&headers, WEBHOOK_TOKEN_HEADER),
    );
    if !check.is_valid() {
        return Err(WebhookError::Unauthorized(check.error_message()));
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WebhookError::BadPayload(e.to_string()))?;
    let event: PaymentWebhook = serde_json::from_value(payload.clone())
        .map_err(|e| WebhookError::BadPayload(e.to_string()))?;

    let holding = Duration::days(state.config.finance.release_holding_days);
    let outcome = ingest(state.store.as_ref(), &event, &payload, Utc::now(), holding).await?;
    Ok(Json(WebhookAck::single(outcome)))
}

pub async fn ingest<L: InboundLedger + ?Sized>(
    ledger: &L,
    event: &PaymentWebhook,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
    holding: Duration,
) -> Result<IngestOutcome, WebhookError> {
    let key = IdempotencyKey::new(Provider::Payments, &event.id);
    let effect = payment_effect(event, now, holding);
    let outcome = ledger
        .apply_payment_event(&key, event.payment.sale_id, &effect, payload, now)
        .await?;

    info!(
        %key,
        event = %event.event,
        sale_id = ?event.payment.sale_id,
        outcome = ?outcome,
        "Payment webhook handled"
    );
    Ok(outcome)
}
