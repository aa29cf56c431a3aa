//! Card terminal (POS) reconciliation against internal sales.

use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

use crate::core::error::{CrmError, CrmResult};
use crate::tenancy::TenantContext;

use super::types::{MatchStatus, PosTransaction, Sale};
use super::PosRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PosMatch {
    pub status: MatchStatus,
    pub sale_id: Option<Uuid>,
}

/// Candidate sales share the amount and have `created_at` or `paid_at` within
/// `window` of the capture. Exactly one candidate is a match.
pub fn match_pos_transaction(tx: &PosTransaction, candidates: &[Sale], window: Duration) -> PosMatch {
    let within = |at: chrono::DateTime<chrono::Utc>| (at - tx.captured_at).abs() <= window;

    let hits: Vec<&Sale> = candidates
        .iter()
        .filter(|s| s.organization_id == tx.organization_id)
        .filter(|s| s.status.is_open_for_reconciliation())
        .filter(|s| s.total_cents == tx.amount_cents)
        .filter(|s| within(s.created_at) || s.paid_at.is_some_and(within))
        .collect();

    match hits.as_slice() {
        [] => PosMatch {
            status: MatchStatus::Unmatched,
            sale_id: None,
        },
        [sale] => PosMatch {
            status: MatchStatus::Matched,
            sale_id: Some(sale.id),
        },
        _ => PosMatch {
            status: MatchStatus::Ambiguous,
            sale_id: None,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PosReconcileReport {
    pub examined: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub unmatched: usize,
}

/// Runs the matcher over every unmatched capture of the tenant. A sale claimed by
/// one capture is not offered to the next.
pub async fn reconcile_pos<R: PosRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    window: Duration,
) -> CrmResult<PosReconcileReport> {
    if !(ctx.is_admin() || ctx.is_sales_manager) {
        return Err(CrmError::PermissionDenied(
            "POS reconciliation requires an admin or sales manager".to_string(),
        ));
    }

    let mut pending = repo.unmatched_pos_transactions(ctx.organization_id).await?;
    let mut report = PosReconcileReport {
        examined: pending.len(),
        ..Default::default()
    };
    let (Some(since), Some(until)) = (
        pending.iter().map(|t| t.captured_at).min(),
        pending.iter().map(|t| t.captured_at).max(),
    ) else {
        return Ok(report);
    };

    let mut candidates = repo
        .candidate_sales(ctx.organization_id, since - window, until + window)
        .await?;
    pending.sort_by_key(|t| t.captured_at);

    for tx in pending {
        let result = match_pos_transaction(&tx, &candidates, window);
        match result.status {
            MatchStatus::Matched => {
                report.matched += 1;
                candidates.retain(|s| Some(s.id) != result.sale_id);
            }
            MatchStatus::Ambiguous => report.ambiguous += 1,
            MatchStatus::Unmatched | MatchStatus::Ignored => {
                report.unmatched += 1;
                continue;
            }
        }
        repo.set_pos_match(ctx.organization_id, tx.id, result.status, result.sale_id)
            .await?;
    }

    log::info!(
        "POS reconciliation for {}: {} examined, {} matched, {} ambiguous",
        ctx.organization_id,
        report.examined,
        report.matched,
        report.ambiguous
    );
    Ok(report)
}
