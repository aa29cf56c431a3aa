use axum::{extract::State, http::HeaderMap, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::core::error::{CrmError, CrmResult};
use crate::core::shared::state::AppState;
use crate::security::webhook::{header_str, verify_shared_token, JOB_TOKEN_HEADER};
use crate::tenancy::TenantContext;

use super::pos::{reconcile_pos, PosReconcileReport};
use super::release::{run_release_job, ReleaseReport};
use super::types::VirtualAccount;
use super::Ledger;

/// Called by the external scheduler; takes no body.
pub async fn handle_release_balances(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> CrmResult<Json<ReleaseReport>> {
    let check = verify_shared_token(
        &state.config.webhooks.jobs_token,
        header_str(&headers, JOB_TOKEN_HEADER),
    );
    if !check.is_valid() {
        tracing::warn!(reason = check.error_message(), "Rejected release job call");
        return Err(CrmError::Unauthenticated);
    }

    let report = run_release_job(state.store.as_ref(), Utc::now()).await?;
    Ok(Json(report))
}

/// The tenant's account; an empty one when nothing was ever credited.
pub async fn handle_get_account(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> CrmResult<Json<VirtualAccount>> {
    let account = state
        .store
        .find_account(ctx.organization_id)
        .await?
        .unwrap_or_else(|| VirtualAccount::new(ctx.organization_id));
    Ok(Json(account))
}

pub async fn handle_reconcile_pos(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> CrmResult<Json<PosReconcileReport>> {
    let window = Duration::minutes(state.config.finance.pos_match_window_minutes);
    Ok(Json(reconcile_pos(state.store.as_ref(), &ctx, window).await?))
}
