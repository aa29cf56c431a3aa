//! Scheduled move of funds from pending to available balance.
//!
//! Each due transaction is released in its own atomic store call. A failed row is
//! counted and the batch carries on; re-running only touches rows still pending.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::shared::store::StoreError;

use super::types::ReleaseOutcome;
use super::Ledger;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub candidates: usize,
    pub released_count: usize,
    pub total_released_cents: i64,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn run_release_job<L: Ledger + ?Sized>(
    ledger: &L,
    now: DateTime<Utc>,
) -> Result<ReleaseReport, StoreError> {
    let due = ledger.due_transactions(now).await?;
    let mut report = ReleaseReport {
        candidates: due.len(),
        ..Default::default()
    };

    for tx in due {
        match ledger.release_transaction(tx.id, now).await {
            Ok(ReleaseOutcome::Released { net_cents }) => {
                report.released_count += 1;
                report.total_released_cents += net_cents;
            }
            Ok(ReleaseOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "Failed to release transaction");
                report.failed += 1;
            }
        }
    }

    info!(
        candidates = report.candidates,
        released = report.released_count,
        total_cents = report.total_released_cents,
        failed = report.failed,
        "Balance release job finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::MemoryStore;
    use chrono::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_release_moves_pending_to_balance_once() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        store.add_pending_transaction(org, 5000, now - Duration::days(1));

        let report = run_release_job(&store, now).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.released_count, 1);
        assert_eq!(report.total_released_cents, 5000);

        let account = store.account(org).unwrap();
        assert_eq!(account.balance_cents, 5000);
        assert_eq!(account.pending_balance_cents, 0);

        let again = run_release_job(&store, now).await.unwrap();
        assert_eq!(again.candidates, 0);
        assert_eq!(again.released_count, 0);
        let account = store.account(org).unwrap();
        assert_eq!(account.balance_cents, 5000);
        assert_eq!(account.pending_balance_cents, 0);
    }

    #[tokio::test]
    async fn test_future_transactions_are_not_released() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        store.add_pending_transaction(org, 1000, now + Duration::days(3));
        store.add_pending_transaction(org, 2500, now);

        let report = run_release_job(&store, now).await.unwrap();
        assert_eq!(report.released_count, 1);
        assert_eq!(report.total_released_cents, 2500);
        let account = store.account(org).unwrap();
        assert_eq!(account.pending_balance_cents, 1000);
    }

    #[tokio::test]
    async fn test_failed_row_does_not_abort_batch() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        let broken = store.add_pending_transaction(org, 700, now - Duration::hours(1));
        store.add_pending_transaction(org, 300, now - Duration::hours(1));
        store.fail_release_of(broken);

        let report = run_release_job(&store, now).await.unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.released_count, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_released_cents, 300);

        // the failed row is retried on the next run
        store.clear_release_failures();
        let retry = run_release_job(&store, now).await.unwrap();
        assert_eq!(retry.released_count, 1);
        assert_eq!(store.account(org).unwrap().balance_cents, 1000);
    }
}
