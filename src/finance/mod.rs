//! Virtual accounts, the balance release job and POS reconciliation.

pub mod handlers;
pub mod pos;
pub mod release;
pub mod storage;
pub mod types;

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::core::shared::store::StoreError;

pub use handlers::*;
pub use pos::{match_pos_transaction, reconcile_pos, PosMatch, PosReconcileReport};
pub use release::{run_release_job, ReleaseReport};
pub use types::*;

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Pending transactions with `release_at <= now`, across all tenants.
    async fn due_transactions(&self, now: DateTime<Utc>) -> Result<Vec<VirtualTransaction>, StoreError>;
    /// Flips one transaction to released and moves its amount on the owning account,
    /// as a single unit. Returns `Skipped` when it is no longer pending.
    async fn release_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError>;
    async fn find_account(&self, organization_id: Uuid) -> Result<Option<VirtualAccount>, StoreError>;
}

#[async_trait]
pub trait PosRepository: Send + Sync {
    async fn unmatched_pos_transactions(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<PosTransaction>, StoreError>;
    /// Sales created or paid in `[since, until]` that no POS capture has claimed yet.
    async fn candidate_sales(
        &self,
        organization_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError>;
    async fn set_pos_match(
        &self,
        organization_id: Uuid,
        transaction_id: Uuid,
        status: MatchStatus,
        sale_id: Option<Uuid>,
    ) -> Result<(), StoreError>;
}

pub fn configure_finance_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/finance/account", get(handle_get_account))
        .route("/api/finance/pos/reconcile", post(handle_reconcile_pos))
        .route("/jobs/release-balances", post(handle_release_balances))
}
