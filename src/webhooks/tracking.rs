use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::shared::state::AppState;
use crate::finance::CarrierTrackingStatusConfig;
use crate::security::webhook::{header_str, verify_shared_token, WEBHOOK_TOKEN_HEADER};

use super::{IdempotencyKey, IngestOutcome, InboundLedger, Provider, WebhookAck, WebhookError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingWebhook {
    pub event_id: String,
    pub carrier: String,
    pub tracking_code: String,
    pub status: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Tenant mapping for a carrier status. Carrier names and statuses compare
/// case-insensitively since carriers are inconsistent about casing.
pub fn resolve_shipping_status<'a>(
    configs: &'a [CarrierTrackingStatusConfig],
    carrier: &str,
    carrier_status: &str,
) -> Option<&'a CarrierTrackingStatusConfig> {
    let carrier = carrier.trim();
    let carrier_status = carrier_status.trim();
    configs.iter().find(|c| {
        c.carrier.eq_ignore_ascii_case(carrier) && c.carrier_status.eq_ignore_ascii_case(carrier_status)
    })
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let check = verify_shared_token(
        &state.config.webhooks.tracking_token,
        header_str(&headers, WEBHOOK_TOKEN_HEADER),
    );
    if !check.is_valid() {
        return Err(WebhookError::Unauthorized(check.error_message()));
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WebhookError::BadPayload(e.to_string()))?;
    let event: TrackingWebhook = serde_json::from_value(payload.clone())
        .map_err(|e| WebhookError::BadPayload(e.to_string()))?;

    let outcome = ingest(state.store.as_ref(), &event, &payload).await?;
    Ok(Json(WebhookAck::single(outcome)))
}

pub async fn ingest<L: InboundLedger + ?Sized>(
    ledger: &L,
    event: &TrackingWebhook,
    payload: &serde_json::Value,
) -> Result<IngestOutcome, WebhookError> {
    if event.event_id.trim().is_empty() || event.tracking_code.trim().is_empty() {
        return Err(WebhookError::BadPayload(
            "event_id and tracking_code are required".to_string(),
        ));
    }

    let key = IdempotencyKey::new(Provider::Tracking, &event.event_id);
    let outcome = ledger.apply_tracking_event(&key, event, payload).await?;
    info!(
        %key,
        carrier = %event.carrier,
        tracking_code = %event.tracking_code,
        status = %event.status,
        outcome = ?outcome,
        "Tracking webhook handled"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::MemoryStore;
    use uuid::Uuid;

    fn config(org: Uuid, carrier: &str, status: &str, shipping: &str) -> CarrierTrackingStatusConfig {
        CarrierTrackingStatusConfig {
            organization_id: org,
            carrier: carrier.to_string(),
            carrier_status: status.to_string(),
            shipping_status: shipping.to_string(),
            notify_customer: false,
        }
    }

    fn event(id: &str, code: &str, status: &str) -> TrackingWebhook {
        TrackingWebhook {
            event_id: id.to_string(),
            carrier: "correios".to_string(),
            tracking_code: code.to_string(),
            status: status.to_string(),
            occurred_at: None,
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let org = Uuid::new_v4();
        let configs = vec![
            config(org, "Correios", "BDE", "delivered"),
            config(org, "Correios", "OEC", "out_for_delivery"),
        ];
        let found = resolve_shipping_status(&configs, "correios", " bde ").unwrap();
        assert_eq!(found.shipping_status, "delivered");
        assert!(resolve_shipping_status(&configs, "jadlog", "BDE").is_none());
    }

    #[tokio::test]
    async fn test_mapped_status_updates_sale_once() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let sale = store.add_pending_sale(org, 5_000);
        store.set_tracking_code(sale, "BR123456789");
        store.add_carrier_status(config(org, "correios", "BDE", "delivered"));

        let delivered = event("trk-1", "BR123456789", "BDE");
        let payload = serde_json::to_value(&delivered).unwrap();
        assert_eq!(
            ingest(&store, &delivered, &payload).await.unwrap(),
            IngestOutcome::Processed
        );
        assert_eq!(
            ingest(&store, &delivered, &payload).await.unwrap(),
            IngestOutcome::Duplicate
        );
        assert_eq!(
            store.sale(sale).unwrap().shipping_status.as_deref(),
            Some("delivered")
        );
    }

    #[tokio::test]
    async fn test_unmapped_status_is_recorded_only() {
        let store = MemoryStore::new();
        let sale = store.add_pending_sale(Uuid::new_v4(), 5_000);
        store.set_tracking_code(sale, "BR000");

        let unknown = event("trk-2", "BR000", "XYZ");
        let payload = serde_json::to_value(&unknown).unwrap();
        assert_eq!(
            ingest(&store, &unknown, &payload).await.unwrap(),
            IngestOutcome::Processed
        );
        assert!(store.sale(sale).unwrap().shipping_status.is_none());

        let missing = event("", "BR000", "XYZ");
        assert!(matches!(
            ingest(&store, &missing, &payload).await,
            Err(WebhookError::BadPayload(_))
        ));
    }
}
