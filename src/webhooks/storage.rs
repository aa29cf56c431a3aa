use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{
    carrier_tracking_status_configs, inbound_events, leads, sales, whatsapp_channels,
    whatsapp_messages,
};
use crate::core::shared::store::{PgStore, StoreError};
use crate::crm::format_whatsapp;
use crate::crm::storage::{lead_by_whatsapp, DbLead};
use crate::crm::{CanonicalStage, Lead};
use crate::finance::storage::credit_pending;
use crate::finance::{CarrierTrackingStatusConfig, SaleStatus};

use super::tracking::{resolve_shipping_status, TrackingWebhook};
use super::whatsapp::{status_advances, InboundMessage};
use super::{IdempotencyKey, IngestOutcome, InboundLedger, PaymentEffect, Provider};

const INBOUND_DIRECTION: &str = "inbound";
const RECEIVED_STATUS: &str = "received";

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = carrier_tracking_status_configs)]
pub struct DbCarrierStatus {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub carrier: String,
    pub carrier_status: String,
    pub shipping_status: String,
    pub notify_customer: bool,
}

impl From<DbCarrierStatus> for CarrierTrackingStatusConfig {
    fn from(db: DbCarrierStatus) -> Self {
        Self {
            organization_id: db.organization_id,
            carrier: db.carrier,
            carrier_status: db.carrier_status,
            shipping_status: db.shipping_status,
            notify_customer: db.notify_customer,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = whatsapp_messages)]
pub struct NewWhatsAppMessage {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub lead_id: Uuid,
    pub provider: String,
    pub external_id: String,
    pub direction: String,
    pub body: Option<String>,
    pub message_type: String,
    pub media_id: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn status_strings(statuses: &[SaleStatus]) -> Vec<&'static str> {
    statuses.iter().map(SaleStatus::as_str).collect()
}

/// Records the idempotency key. `false` means the event was seen before.
fn claim_event(
    conn: &mut PgConnection,
    key: &IdempotencyKey,
    organization_id: Option<Uuid>,
    payload: &serde_json::Value,
) -> Result<bool, StoreError> {
    let inserted = diesel::insert_into(inbound_events::table)
        .values((
            inbound_events::provider.eq(key.provider.as_str()),
            inbound_events::external_id.eq(&key.external_id),
            inbound_events::organization_id.eq(organization_id),
            inbound_events::payload.eq(payload),
            inbound_events::received_at.eq(Utc::now()),
        ))
        .on_conflict((inbound_events::provider, inbound_events::external_id))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}

fn find_or_create_lead(
    conn: &mut PgConnection,
    message: &InboundMessage,
) -> Result<Lead, StoreError> {
    if let Some(lead) = lead_by_whatsapp(conn, message.organization_id, &message.from)? {
        return Ok(lead);
    }

    let name = message
        .contact_name
        .clone()
        .or_else(|| format_whatsapp(&message.from))
        .unwrap_or_else(|| message.from.clone());
    let mut lead = Lead::new(message.organization_id, name);
    lead.stage = CanonicalStage::New;
    lead.whatsapp = Some(message.from.clone());
    lead.source = Some(Provider::WhatsApp.as_str().to_string());

    diesel::insert_into(leads::table)
        .values(DbLead::from(&lead))
        .on_conflict_do_nothing()
        .execute(conn)?;

    // a concurrent delivery may have created it first
    lead_by_whatsapp(conn, message.organization_id, &message.from)?
        .ok_or_else(|| StoreError::Database(format!("lead for {} vanished", message.from)))
}

#[async_trait]
impl InboundLedger for PgStore {
    async fn org_for_phone_number_id(&self, phone_number_id: &str) -> Result<Option<Uuid>, StoreError> {
        let phone_number_id = phone_number_id.to_string();
        self.run(move |conn| {
            Ok(whatsapp_channels::table
                .find(phone_number_id)
                .select(whatsapp_channels::organization_id)
                .first::<Uuid>(conn)
                .optional()?)
        })
        .await
    }

    async fn record_whatsapp_message(
        &self,
        key: &IdempotencyKey,
        message: &InboundMessage,
    ) -> Result<IngestOutcome, StoreError> {
        let key = key.clone();
        let message = message.clone();
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                if !claim_event(conn, &key, Some(message.organization_id), &message.payload)? {
                    return Ok(IngestOutcome::Duplicate);
                }

                let lead = find_or_create_lead(conn, &message)?;
                let now = Utc::now();
                diesel::insert_into(whatsapp_messages::table)
                    .values(NewWhatsAppMessage {
                        id: Uuid::new_v4(),
                        organization_id: message.organization_id,
                        lead_id: lead.id,
                        provider: key.provider.as_str().to_string(),
                        external_id: key.external_id.clone(),
                        direction: INBOUND_DIRECTION.to_string(),
                        body: message.body.clone(),
                        message_type: message.message_type.clone(),
                        media_id: message.media_id.clone(),
                        status: RECEIVED_STATUS.to_string(),
                        sent_at: message.sent_at,
                        created_at: now,
                    })
                    .on_conflict((whatsapp_messages::provider, whatsapp_messages::external_id))
                    .do_nothing()
                    .execute(conn)?;
                Ok(IngestOutcome::Processed)
            })
        })
        .await
    }

    async fn update_message_status(&self, external_id: &str, status: &str) -> Result<bool, StoreError> {
        let (external_id, status) = (external_id.to_string(), status.to_string());
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let current: Option<(Uuid, String)> = whatsapp_messages::table
                    .filter(whatsapp_messages::provider.eq(Provider::WhatsApp.as_str()))
                    .filter(whatsapp_messages::external_id.eq(&external_id))
                    .select((whatsapp_messages::id, whatsapp_messages::status))
                    .for_update()
                    .first(conn)
                    .optional()?;

                let Some((id, current)) = current else {
                    return Ok(false);
                };
                if !status_advances(&current, &status) {
                    return Ok(false);
                }
                diesel::update(whatsapp_messages::table.find(id))
                    .set(whatsapp_messages::status.eq(&status))
                    .execute(conn)?;
                Ok(true)
            })
        })
        .await
    }

    async fn apply_payment_event(
        &self,
        key: &IdempotencyKey,
        sale_id: Option<Uuid>,
        effect: &PaymentEffect,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, StoreError> {
        let (key, effect, payload) = (key.clone(), *effect, payload.clone());
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let organization_id: Option<Uuid> = match sale_id {
                    Some(id) => sales::table
                        .find(id)
                        .select(sales::organization_id)
                        .first(conn)
                        .optional()?,
                    None => None,
                };

                if !claim_event(conn, &key, organization_id, &payload)? {
                    return Ok(IngestOutcome::Duplicate);
                }

                let (Some(sale_id), Some(organization_id)) = (sale_id, organization_id) else {
                    tracing::warn!(%key, "Payment event references no known sale; recorded only");
                    return Ok(IngestOutcome::Processed);
                };

                match effect {
                    PaymentEffect::Confirm {
                        net_cents,
                        release_at,
                    } => {
                        let newly_paid = diesel::update(
                            sales::table.filter(sales::id.eq(sale_id)).filter(
                                sales::status.eq_any(status_strings(SaleStatus::Paid.reachable_from())),
                            ),
                        )
                        .set((
                            sales::status.eq(SaleStatus::Paid.as_str()),
                            sales::paid_at.eq(Some(now)),
                            sales::updated_at.eq(now),
                        ))
                        .execute(conn)?;

                        if newly_paid == 1
                            && !credit_pending(conn, organization_id, sale_id, net_cents, release_at, now)?
                        {
                            tracing::warn!(%key, %sale_id, "Sale already credited; pending balance unchanged");
                        }
                    }
                    PaymentEffect::SetStatus(status) => {
                        let changed = diesel::update(
                            sales::table
                                .filter(sales::id.eq(sale_id))
                                .filter(sales::status.eq_any(status_strings(status.reachable_from()))),
                        )
                        .set((
                            sales::status.eq(status.as_str()),
                            sales::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                        if changed == 0 {
                            tracing::info!(%key, %sale_id, status = status.as_str(), "Sale status change not applicable");
                        }
                    }
                    PaymentEffect::RecordOnly => {}
                }
                Ok(IngestOutcome::Processed)
            })
        })
        .await
    }

    async fn apply_tracking_event(
        &self,
        key: &IdempotencyKey,
        event: &TrackingWebhook,
        payload: &serde_json::Value,
    ) -> Result<IngestOutcome, StoreError> {
        let (key, event, payload) = (key.clone(), event.clone(), payload.clone());
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let sale: Option<(Uuid, Uuid)> = sales::table
                    .filter(sales::tracking_code.eq(&event.tracking_code))
                    .order(sales::created_at.desc())
                    .select((sales::id, sales::organization_id))
                    .first(conn)
                    .optional()?;

                if !claim_event(conn, &key, sale.map(|(_, org)| org), &payload)? {
                    return Ok(IngestOutcome::Duplicate);
                }
                let Some((sale_id, organization_id)) = sale else {
                    return Ok(IngestOutcome::Processed);
                };

                let configs: Vec<CarrierTrackingStatusConfig> = carrier_tracking_status_configs::table
                    .filter(carrier_tracking_status_configs::organization_id.eq(organization_id))
                    .select(DbCarrierStatus::as_select())
                    .load::<DbCarrierStatus>(conn)?
                    .into_iter()
                    .map(CarrierTrackingStatusConfig::from)
                    .collect();

                if let Some(mapped) = resolve_shipping_status(&configs, &event.carrier, &event.status) {
                    diesel::update(sales::table.find(sale_id))
                        .set((
                            sales::shipping_status.eq(Some(&mapped.shipping_status)),
                            sales::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)?;
                }
                Ok(IngestOutcome::Processed)
            })
        })
        .await
    }
}
