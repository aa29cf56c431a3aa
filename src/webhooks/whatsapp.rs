use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::crm::normalize_whatsapp;
use crate::security::webhook::{header_str, verify_hub_signature, HUB_SIGNATURE_HEADER};

use super::{IdempotencyKey, IngestOutcome, InboundLedger, Provider, WebhookAck, WebhookError};

const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppWebhook {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppEntry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppChange {
    pub field: String,
    pub value: WhatsAppValue,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: WhatsAppMetadata,
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    #[serde(default)]
    pub statuses: Vec<WhatsAppStatus>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WhatsAppMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppContact {
    pub wa_id: String,
    pub profile: WhatsAppProfile,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppProfile {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppMessage {
    pub id: String,
    pub from: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<WhatsAppText>,
    #[serde(default)]
    pub image: Option<WhatsAppMedia>,
    #[serde(default)]
    pub audio: Option<WhatsAppMedia>,
    #[serde(default)]
    pub video: Option<WhatsAppMedia>,
    #[serde(default)]
    pub document: Option<WhatsAppMedia>,
    #[serde(default)]
    pub location: Option<WhatsAppLocation>,
    #[serde(default)]
    pub interactive: Option<WhatsAppInteractive>,
    #[serde(default)]
    pub button: Option<WhatsAppButton>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppText {
    pub body: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppMedia {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppInteractive {
    #[serde(rename = "type")]
    pub interactive_type: String,
    #[serde(default)]
    pub button_reply: Option<WhatsAppReply>,
    #[serde(default)]
    pub list_reply: Option<WhatsAppReply>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppReply {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppButton {
    pub payload: String,
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WhatsAppStatus {
    pub id: String,
    pub status: String,
    pub timestamp: String,
    pub recipient_id: String,
}

/// A provider message reduced to what the CRM stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    pub organization_id: Uuid,
    pub external_id: String,
    /// Normalized sender number.
    pub from: String,
    pub contact_name: Option<String>,
    pub message_type: String,
    pub body: Option<String>,
    pub media_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl WhatsAppMessage {
    pub fn body(&self) -> Option<String> {
        if let Some(text) = &self.text {
            return Some(text.body.clone());
        }
        if let Some(reply) = self
            .interactive
            .as_ref()
            .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
        {
            return Some(reply.title.clone());
        }
        if let Some(button) = &self.button {
            return Some(button.text.clone());
        }
        if let Some(location) = &self.location {
            return Some(match &location.name {
                Some(name) => format!("{name} ({}, {})", location.latitude, location.longitude),
                None => format!("{}, {}", location.latitude, location.longitude),
            });
        }
        self.media().and_then(|m| m.caption.clone())
    }

    pub fn media(&self) -> Option<&WhatsAppMedia> {
        self.image
            .as_ref()
            .or(self.audio.as_ref())
            .or(self.video.as_ref())
            .or(self.document.as_ref())
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }

    /// `None` when the sender is not a usable Brazilian number.
    pub fn to_inbound(
        &self,
        organization_id: Uuid,
        contacts: &[WhatsAppContact],
    ) -> Option<InboundMessage> {
        let from = normalize_whatsapp(&self.from)?;
        let contact_name = contacts
            .iter()
            .find(|c| c.wa_id == self.from)
            .or(contacts.first())
            .map(|c| c.profile.name.trim().to_string())
            .filter(|n| !n.is_empty());

        Some(InboundMessage {
            organization_id,
            external_id: self.id.clone(),
            from,
            contact_name,
            message_type: self.message_type.clone(),
            body: self.body(),
            media_id: self.media().map(|m| m.id.clone()),
            sent_at: self.sent_at(),
            payload: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        })
    }
}

fn status_rank(status: &str) -> u8 {
    match status {
        "sent" => 1,
        "delivered" => 2,
        "read" => 3,
        "failed" => 4,
        _ => 0,
    }
}

/// Delivery statuses arrive out of order; a late `delivered` never overwrites `read`.
pub fn status_advances(current: &str, next: &str) -> bool {
    status_rank(next) > status_rank(current)
}

pub async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookVerifyQuery>,
) -> impl IntoResponse {
    info!("WhatsApp webhook verification request received");

    let mode = params.mode.unwrap_or_default();
    let token = params.verify_token.unwrap_or_default();
    let expected = &state.config.webhooks.whatsapp_verify_token;

    if mode != "subscribe" {
        warn!(mode = %mode, "Invalid webhook mode");
        return (StatusCode::FORBIDDEN, "Invalid mode".to_string());
    }
    if expected.is_empty() || token != *expected {
        warn!("Invalid verify token");
        return (StatusCode::FORBIDDEN, "Invalid verify token".to_string());
    }

    info!("Webhook verification successful");
    (StatusCode::OK, params.challenge.unwrap_or_default())
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let check = verify_hub_signature(
        &state.config.webhooks.whatsapp_app_secret,
        &body,
        header_str(&headers, HUB_SIGNATURE_HEADER),
    );
    if !check.is_valid() {
        return Err(WebhookError::Unauthorized(check.error_message()));
    }

    let payload: WhatsAppWebhook =
        serde_json::from_slice(&body).map_err(|e| WebhookError::BadPayload(e.to_string()))?;
    if payload.object != BUSINESS_ACCOUNT_OBJECT {
        debug!(object = %payload.object, "Ignoring non WhatsApp object");
        return Ok(Json(WebhookAck::ignored()));
    }

    ingest(state.store.as_ref(), payload).await.map(Json)
}

/// Applies every message and status in the payload.
pub async fn ingest<L: InboundLedger + ?Sized>(
    ledger: &L,
    payload: WhatsAppWebhook,
) -> Result<WebhookAck, WebhookError> {
    let (mut processed, mut duplicates) = (0usize, 0usize);

    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        if change.field != "messages" {
            continue;
        }
        let value = change.value;

        if !value.messages.is_empty() {
            let phone_number_id = value.metadata.phone_number_id.as_deref().unwrap_or_default();
            let Some(org) = ledger.org_for_phone_number_id(phone_number_id).await? else {
                warn!(phone_number_id, "No tenant owns this WhatsApp number; messages dropped");
                continue;
            };

            for message in &value.messages {
                let Some(inbound) = message.to_inbound(org, &value.contacts) else {
                    warn!(message_id = %message.id, "Sender is not a valid WhatsApp number");
                    continue;
                };
                let key = IdempotencyKey::new(Provider::WhatsApp, &message.id);
                match ledger.record_whatsapp_message(&key, &inbound).await? {
                    IngestOutcome::Processed => processed += 1,
                    IngestOutcome::Duplicate => {
                        debug!(%key, "Duplicate WhatsApp message");
                        duplicates += 1;
                    }
                }
            }
        }

        for status in &value.statuses {
            if !ledger.update_message_status(&status.id, &status.status).await? {
                debug!(message_id = %status.id, status = %status.status, "Status update not applied");
            }
        }
    }

    let status = if duplicates > 0 && processed == 0 {
        "duplicate"
    } else {
        "processed"
    };
    Ok(WebhookAck {
        status,
        processed: Some(processed),
        duplicates: Some(duplicates),
    })
}
