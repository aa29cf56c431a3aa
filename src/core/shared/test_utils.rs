//! In-memory `Store` used by unit tests. Mirrors the guarantees of `PgStore`:
//! unique keys reject duplicates, multi-step writes happen under one lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::shared::store::{HealthProbe, StoreError};
use crate::crm::{format_whatsapp, CanonicalStage, FunnelStageCustom, Lead, LeadRepository};
use crate::demands::{
    Demand, DemandBoard, DemandColumn, DemandComment, DemandHistory, DemandNotification,
    DemandRepository, NotificationSink,
};
use crate::finance::{
    CarrierTrackingStatusConfig, Ledger, MatchStatus, PosRepository, PosTransaction,
    ReleaseOutcome, Sale, SaleStatus, TransactionStatus, VirtualAccount, VirtualTransaction,
};
use crate::tenancy::{MemberRole, Membership, MembershipDirectory, TenantContext};
use crate::webhooks::whatsapp::status_advances;
use crate::webhooks::{
    resolve_shipping_status, IdempotencyKey, InboundLedger, InboundMessage, IngestOutcome,
    PaymentEffect, Provider, TrackingWebhook,
};

/// Tenant context for a fresh random user.
pub fn tenant(organization_id: Uuid, role: MemberRole) -> TenantContext {
    TenantContext {
        organization_id,
        user_id: Uuid::new_v4(),
        role,
        team_id: None,
        is_sales_manager: false,
    }
}

/// Application state over a fresh `MemoryStore`.
pub fn test_state(config: AppConfig) -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone()).expect("http client builds");
    (Arc::new(state), store)
}

/// Sink that rejects every batch.
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _batch: &[DemandNotification]) -> Result<(), StoreError> {
        Err(StoreError::Database("notification table unavailable".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub organization_id: Uuid,
    pub lead_id: Uuid,
    pub external_id: String,
    pub body: Option<String>,
    pub status: String,
}

#[derive(Debug, Default)]
struct Inner {
    memberships: HashMap<Uuid, Membership>,
    stages: Vec<FunnelStageCustom>,
    leads: Vec<Lead>,
    profiles: HashMap<Uuid, Option<String>>,
    boards: Vec<DemandBoard>,
    columns: Vec<DemandColumn>,
    demands: HashMap<Uuid, Demand>,
    history: Vec<DemandHistory>,
    comments: Vec<DemandComment>,
    notifications: Vec<DemandNotification>,
    inbound_events: HashSet<(Provider, String)>,
    channels: HashMap<String, Uuid>,
    messages: Vec<StoredMessage>,
    sales: HashMap<Uuid, Sale>,
    accounts: HashMap<Uuid, VirtualAccount>,
    transactions: Vec<VirtualTransaction>,
    release_failures: HashSet<Uuid>,
    pos_transactions: Vec<PosTransaction>,
    carrier_statuses: Vec<CarrierTrackingStatusConfig>,
    unreachable: bool,
}

impl Inner {
    fn claim(&mut self, key: &IdempotencyKey) -> bool {
        self.inbound_events
            .insert((key.provider, key.external_id.clone()))
    }

    fn account_mut(&mut self, organization_id: Uuid) -> &mut VirtualAccount {
        self.accounts
            .entry(organization_id)
            .or_insert_with(|| VirtualAccount::new(organization_id))
    }

    fn credit_pending(
        &mut self,
        organization_id: Uuid,
        sale_id: Option<Uuid>,
        net_cents: i64,
        release_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Uuid {
        let account = self.account_mut(organization_id);
        account.pending_balance_cents += net_cents;
        account.updated_at = now;
        let account_id = account.id;

        let tx = VirtualTransaction {
            id: Uuid::new_v4(),
            account_id,
            organization_id,
            sale_id,
            status: TransactionStatus::Pending,
            net_amount_cents: net_cents,
            release_at,
            released_at: None,
            created_at: now,
        };
        let id = tx.id;
        self.transactions.push(tx);
        id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn add_membership(&self, membership: Membership) {
        self.with(|s| {
            s.memberships.insert(membership.user_id, membership);
        })
    }

    pub fn add_stage(
        &self,
        organization_id: Uuid,
        position: i32,
        enum_value: CanonicalStage,
        name: &str,
    ) -> Uuid {
        let stage = FunnelStageCustom {
            id: Uuid::new_v4(),
            organization_id,
            position,
            enum_value,
            name: name.to_string(),
            is_active: true,
        };
        let id = stage.id;
        self.with(|s| s.stages.push(stage));
        id
    }

    pub fn leads(&self, organization_id: Uuid) -> Vec<Lead> {
        self.with(|s| {
            s.leads
                .iter()
                .filter(|l| l.organization_id == organization_id)
                .cloned()
                .collect()
        })
    }

    /// Board with one column per `(name, is_final)`, positions starting at 1.
    pub fn add_board(
        &self,
        organization_id: Uuid,
        columns: &[(&str, bool)],
    ) -> (DemandBoard, Vec<DemandColumn>) {
        let board = DemandBoard {
            id: Uuid::new_v4(),
            organization_id,
            name: "Demands".to_string(),
            default_column_id: None,
        };
        let columns: Vec<DemandColumn> = columns
            .iter()
            .enumerate()
            .map(|(i, (name, is_final))| DemandColumn {
                id: Uuid::new_v4(),
                board_id: board.id,
                name: name.to_string(),
                position: i as i32 + 1,
                is_final: *is_final,
            })
            .collect();

        self.with(|s| {
            s.boards.push(board.clone());
            s.columns.extend(columns.iter().cloned());
        });
        (board, columns)
    }

    pub fn notifications(&self) -> Vec<DemandNotification> {
        self.with(|s| s.notifications.clone())
    }

    pub fn add_whatsapp_channel(&self, phone_number_id: &str, organization_id: Uuid) {
        self.with(|s| {
            s.channels
                .insert(phone_number_id.to_string(), organization_id);
        })
    }

    pub fn messages(&self) -> Vec<StoredMessage> {
        self.with(|s| s.messages.clone())
    }

    pub fn add_sale(&self, sale: Sale) {
        self.with(|s| {
            s.sales.insert(sale.id, sale);
        })
    }

    pub fn add_pending_sale(&self, organization_id: Uuid, total_cents: i64) -> Uuid {
        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4(),
            organization_id,
            lead_id: None,
            total_cents,
            status: SaleStatus::Pending,
            payment_charge_id: None,
            tracking_code: None,
            shipping_status: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = sale.id;
        self.add_sale(sale);
        id
    }

    pub fn sale(&self, sale_id: Uuid) -> Option<Sale> {
        self.with(|s| s.sales.get(&sale_id).cloned())
    }

    pub fn set_tracking_code(&self, sale_id: Uuid, code: &str) {
        self.with(|s| {
            if let Some(sale) = s.sales.get_mut(&sale_id) {
                sale.tracking_code = Some(code.to_string());
            }
        })
    }

    pub fn add_carrier_status(&self, config: CarrierTrackingStatusConfig) {
        self.with(|s| s.carrier_statuses.push(config))
    }

    pub fn add_pending_transaction(
        &self,
        organization_id: Uuid,
        net_cents: i64,
        release_at: DateTime<Utc>,
    ) -> Uuid {
        self.with(|s| s.credit_pending(organization_id, None, net_cents, release_at, Utc::now()))
    }

    pub fn transactions(&self, organization_id: Uuid) -> Vec<VirtualTransaction> {
        self.with(|s| {
            s.transactions
                .iter()
                .filter(|t| t.organization_id == organization_id)
                .cloned()
                .collect()
        })
    }

    pub fn account(&self, organization_id: Uuid) -> Option<VirtualAccount> {
        self.with(|s| s.accounts.get(&organization_id).cloned())
    }

    /// Makes `release_transaction` fail for `transaction_id` until cleared.
    pub fn fail_release_of(&self, transaction_id: Uuid) {
        self.with(|s| {
            s.release_failures.insert(transaction_id);
        })
    }

    pub fn clear_release_failures(&self) {
        self.with(|s| s.release_failures.clear())
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.with(|s| s.unreachable = unreachable)
    }

    pub fn add_pos_transaction(&self, tx: PosTransaction) {
        self.with(|s| s.pos_transactions.push(tx))
    }

    pub fn pos_transaction(&self, transaction_id: Uuid) -> Option<PosTransaction> {
        self.with(|s| {
            s.pos_transactions
                .iter()
                .find(|t| t.id == transaction_id)
                .cloned()
        })
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.with(|s| s.unreachable) {
            return Err(StoreError::Pool("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipDirectory for MemoryStore {
    async fn find_membership(&self, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        Ok(self.with(|s| s.memberships.get(&user_id).cloned()))
    }
}

#[async_trait]
impl LeadRepository for MemoryStore {
    async fn list_stages(&self, organization_id: Uuid) -> Result<Vec<FunnelStageCustom>, StoreError> {
        let mut stages: Vec<FunnelStageCustom> = self.with(|s| {
            s.stages
                .iter()
                .filter(|st| st.organization_id == organization_id)
                .cloned()
                .collect()
        });
        stages.sort_by_key(|st| st.position);
        Ok(stages)
    }

    async fn list_leads(&self, organization_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        Ok(self.leads(organization_id))
    }

    async fn find_lead(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.with(|s| {
            s.leads
                .iter()
                .find(|l| l.id == lead_id && l.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn find_lead_by_whatsapp(
        &self,
        organization_id: Uuid,
        whatsapp: &str,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(self.with(|s| {
            s.leads
                .iter()
                .find(|l| l.organization_id == organization_id && l.whatsapp.as_deref() == Some(whatsapp))
                .cloned()
        }))
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        self.with(|s| {
            let taken = lead.whatsapp.is_some()
                && s.leads.iter().any(|l| {
                    l.organization_id == lead.organization_id && l.whatsapp == lead.whatsapp
                });
            if taken {
                return Err(StoreError::Conflict(
                    "duplicate key value violates unique constraint \"idx_leads_org_whatsapp\""
                        .to_string(),
                ));
            }
            s.leads.push(lead.clone());
            Ok(())
        })
    }

    async fn update_lead_stage(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        stage: CanonicalStage,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(self.with(|s| {
            s.leads
                .iter_mut()
                .find(|l| l.id == lead_id && l.organization_id == organization_id)
                .map(|lead| {
                    lead.stage = stage;
                    lead.updated_at = now;
                    lead.clone()
                })
        }))
    }

    async fn profile_whatsapp_owner(&self, whatsapp: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.with(|s| {
            s.profiles
                .iter()
                .find(|(_, number)| number.as_deref() == Some(whatsapp))
                .map(|(user_id, _)| *user_id)
        }))
    }

    async fn set_profile_whatsapp(&self, user_id: Uuid, whatsapp: Option<String>) -> Result<(), StoreError> {
        self.with(|s| {
            let taken = whatsapp.is_some()
                && s.profiles
                    .iter()
                    .any(|(owner, number)| *owner != user_id && *number == whatsapp);
            if taken {
                return Err(StoreError::Conflict(
                    "duplicate key value violates unique constraint \"profiles_whatsapp_key\""
                        .to_string(),
                ));
            }
            s.profiles.insert(user_id, whatsapp);
            Ok(())
        })
    }
}

#[async_trait]
impl DemandRepository for MemoryStore {
    async fn find_board(
        &self,
        organization_id: Uuid,
        board_id: Uuid,
    ) -> Result<Option<DemandBoard>, StoreError> {
        Ok(self.with(|s| {
            s.boards
                .iter()
                .find(|b| b.id == board_id && b.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn list_columns(&self, board_id: Uuid) -> Result<Vec<DemandColumn>, StoreError> {
        let mut columns: Vec<DemandColumn> = self.with(|s| {
            s.columns
                .iter()
                .filter(|c| c.board_id == board_id)
                .cloned()
                .collect()
        });
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    async fn find_column(&self, column_id: Uuid) -> Result<Option<DemandColumn>, StoreError> {
        Ok(self.with(|s| s.columns.iter().find(|c| c.id == column_id).cloned()))
    }

    async fn find_demand(
        &self,
        organization_id: Uuid,
        demand_id: Uuid,
    ) -> Result<Option<Demand>, StoreError> {
        Ok(self.with(|s| {
            s.demands
                .get(&demand_id)
                .filter(|d| d.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn insert_demand(&self, demand: &Demand) -> Result<(), StoreError> {
        self.with(|s| {
            if s.demands.contains_key(&demand.id) {
                return Err(StoreError::Conflict(format!("demand {} exists", demand.id)));
            }
            s.demands.insert(demand.id, demand.clone());
            Ok(())
        })
    }

    async fn save_demand(&self, demand: &Demand) -> Result<(), StoreError> {
        self.with(|s| {
            if let Some(stored) = s
                .demands
                .get_mut(&demand.id)
                .filter(|d| d.organization_id == demand.organization_id)
            {
                stored.title = demand.title.clone();
                stored.description = demand.description.clone();
                stored.assignee_ids = demand.assignee_ids.clone();
                stored.urgency = demand.urgency;
                stored.labels = demand.labels.clone();
                stored.sla_config = demand.sla_config;
                stored.updated_at = demand.updated_at;
            }
        });
        Ok(())
    }

    async fn apply_move(
        &self,
        organization_id: Uuid,
        entry: &DemandHistory,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Demand>, StoreError> {
        Ok(self.with(|s| {
            let demand = s
                .demands
                .get_mut(&entry.demand_id)
                .filter(|d| d.organization_id == organization_id)?;
            demand.column_id = entry.to_column_id;
            demand.updated_at = entry.created_at;
            demand.completed_at = completed_at;
            let moved = demand.clone();
            s.history.push(entry.clone());
            Some(moved)
        }))
    }

    async fn list_history(&self, demand_id: Uuid) -> Result<Vec<DemandHistory>, StoreError> {
        Ok(self.with(|s| {
            s.history
                .iter()
                .filter(|h| h.demand_id == demand_id)
                .cloned()
                .collect()
        }))
    }

    async fn insert_comment(&self, comment: &DemandComment) -> Result<(), StoreError> {
        self.with(|s| s.comments.push(comment.clone()));
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn deliver(&self, batch: &[DemandNotification]) -> Result<(), StoreError> {
        self.with(|s| s.notifications.extend(batch.iter().cloned()));
        Ok(())
    }
}

#[async_trait]
impl InboundLedger for MemoryStore {
    async fn org_for_phone_number_id(&self, phone_number_id: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.with(|s| s.channels.get(phone_number_id).copied()))
    }

    async fn record_whatsapp_message(
        &self,
        key: &IdempotencyKey,
        message: &InboundMessage,
    ) -> Result<IngestOutcome, StoreError> {
        Ok(self.with(|s| {
            if !s.claim(key) {
                return IngestOutcome::Duplicate;
            }

            let existing = s
                .leads
                .iter()
                .find(|l| {
                    l.organization_id == message.organization_id
                        && l.whatsapp.as_deref() == Some(message.from.as_str())
                })
                .map(|l| l.id);
            let lead_id = match existing {
                Some(id) => id,
                None => {
                    let name = message
                        .contact_name
                        .clone()
                        .or_else(|| format_whatsapp(&message.from))
                        .unwrap_or_else(|| message.from.clone());
                    let mut lead = Lead::new(message.organization_id, name);
                    lead.whatsapp = Some(message.from.clone());
                    lead.source = Some(Provider::WhatsApp.as_str().to_string());
                    let id = lead.id;
                    s.leads.push(lead);
                    id
                }
            };

            s.messages.push(StoredMessage {
                organization_id: message.organization_id,
                lead_id,
                external_id: key.external_id.clone(),
                body: message.body.clone(),
                status: "received".to_string(),
            });
            IngestOutcome::Processed
        }))
    }

    async fn update_message_status(&self, external_id: &str, status: &str) -> Result<bool, StoreError> {
        Ok(self.with(|s| {
            match s.messages.iter_mut().find(|m| m.external_id == external_id) {
                Some(message) if status_advances(&message.status, status) => {
                    message.status = status.to_string();
                    true
                }
                _ => false,
            }
        }))
    }

    async fn apply_payment_event(
        &self,
        key: &IdempotencyKey,
        sale_id: Option<Uuid>,
        effect: &PaymentEffect,
        _payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, StoreError> {
        Ok(self.with(|s| {
            if !s.claim(key) {
                return IngestOutcome::Duplicate;
            }
            let Some(sale) = sale_id.and_then(|id| s.sales.get_mut(&id)) else {
                return IngestOutcome::Processed;
            };

            match *effect {
                PaymentEffect::Confirm {
                    net_cents,
                    release_at,
                } => {
                    if sale.status.can_become(SaleStatus::Paid) {
                        sale.status = SaleStatus::Paid;
                        sale.paid_at = Some(now);
                        sale.updated_at = now;
                        let (org, id) = (sale.organization_id, sale.id);
                        let credited = s.transactions.iter().any(|tx| tx.sale_id == Some(id));
                        if !credited {
                            s.credit_pending(org, Some(id), net_cents, release_at, now);
                        }
                    }
                }
                PaymentEffect::SetStatus(status) => {
                    if sale.status.can_become(status) {
                        sale.status = status;
                        sale.updated_at = now;
                    }
                }
                PaymentEffect::RecordOnly => {}
            }
            IngestOutcome::Processed
        }))
    }

    async fn apply_tracking_event(
        &self,
        key: &IdempotencyKey,
        event: &TrackingWebhook,
        _payload: &serde_json::Value,
    ) -> Result<IngestOutcome, StoreError> {
        Ok(self.with(|s| {
            if !s.claim(key) {
                return IngestOutcome::Duplicate;
            }
            let Some(sale_id) = s
                .sales
                .values()
                .find(|sale| sale.tracking_code.as_deref() == Some(event.tracking_code.as_str()))
                .map(|sale| sale.id)
            else {
                return IngestOutcome::Processed;
            };

            let org = s.sales[&sale_id].organization_id;
            let configs: Vec<CarrierTrackingStatusConfig> = s
                .carrier_statuses
                .iter()
                .filter(|c| c.organization_id == org)
                .cloned()
                .collect();
            if let Some(mapped) = resolve_shipping_status(&configs, &event.carrier, &event.status) {
                if let Some(sale) = s.sales.get_mut(&sale_id) {
                    sale.shipping_status = Some(mapped.shipping_status.clone());
                    sale.updated_at = Utc::now();
                }
            }
            IngestOutcome::Processed
        }))
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn due_transactions(&self, now: DateTime<Utc>) -> Result<Vec<VirtualTransaction>, StoreError> {
        let mut due: Vec<VirtualTransaction> = self.with(|s| {
            s.transactions
                .iter()
                .filter(|t| t.is_due(now))
                .cloned()
                .collect()
        });
        due.sort_by_key(|t| t.release_at);
        Ok(due)
    }

    async fn release_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError> {
        self.with(|s| {
            if s.release_failures.contains(&transaction_id) {
                return Err(StoreError::Database(format!(
                    "could not release transaction {transaction_id}"
                )));
            }
            let Some(tx) = s
                .transactions
                .iter_mut()
                .find(|t| t.id == transaction_id && t.status == TransactionStatus::Pending)
            else {
                return Ok(ReleaseOutcome::Skipped);
            };
            tx.status = TransactionStatus::Released;
            tx.released_at = Some(now);
            let (org, net_cents) = (tx.organization_id, tx.net_amount_cents);

            s.account_mut(org).release(net_cents, now);
            Ok(ReleaseOutcome::Released { net_cents })
        })
    }

    async fn find_account(&self, organization_id: Uuid) -> Result<Option<VirtualAccount>, StoreError> {
        Ok(self.account(organization_id))
    }
}

#[async_trait]
impl PosRepository for MemoryStore {
    async fn unmatched_pos_transactions(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<PosTransaction>, StoreError> {
        let mut unmatched: Vec<PosTransaction> = self.with(|s| {
            s.pos_transactions
                .iter()
                .filter(|t| {
                    t.organization_id == organization_id && t.match_status == MatchStatus::Unmatched
                })
                .cloned()
                .collect()
        });
        unmatched.sort_by_key(|t| t.captured_at);
        Ok(unmatched)
    }

    async fn candidate_sales(
        &self,
        organization_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        Ok(self.with(|s| {
            let claimed: HashSet<Uuid> = s
                .pos_transactions
                .iter()
                .filter(|t| t.organization_id == organization_id)
                .filter_map(|t| t.sale_id)
                .collect();
            let in_window = |at: DateTime<Utc>| at >= since && at <= until;

            s.sales
                .values()
                .filter(|sale| sale.organization_id == organization_id)
                .filter(|sale| in_window(sale.created_at) || sale.paid_at.is_some_and(in_window))
                .filter(|sale| !claimed.contains(&sale.id))
                .cloned()
                .collect()
        }))
    }

    async fn set_pos_match(
        &self,
        organization_id: Uuid,
        transaction_id: Uuid,
        status: MatchStatus,
        sale_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.with(|s| {
            if let Some(tx) = s
                .pos_transactions
                .iter_mut()
                .find(|t| t.id == transaction_id && t.organization_id == organization_id)
            {
                tx.match_status = status;
                tx.sale_id = sale_id;
            }
        });
        Ok(())
    }
}
