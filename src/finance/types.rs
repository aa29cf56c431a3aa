use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Paid,
    Refunded,
    Overdue,
    Canceled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Overdue => "overdue",
            Self::Canceled => "canceled",
        }
    }

    /// Sales a POS capture may still be reconciled against.
    pub fn is_open_for_reconciliation(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }

    /// Statuses a gateway event may move a sale out of to reach `self`.
    /// A paid sale never goes back to overdue and is never confirmed twice.
    pub fn reachable_from(&self) -> &'static [SaleStatus] {
        match self {
            Self::Paid => &[Self::Pending, Self::Overdue],
            Self::Overdue => &[Self::Pending],
            Self::Refunded => &[Self::Pending, Self::Paid, Self::Overdue],
            Self::Canceled => &[Self::Pending, Self::Overdue],
            Self::Pending => &[],
        }
    }

    pub fn can_become(&self, next: SaleStatus) -> bool {
        next.reachable_from().contains(self)
    }
}

impl FromStr for SaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            "overdue" => Ok(Self::Overdue),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown sale status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub total_cents: i64,
    pub status: SaleStatus,
    pub payment_charge_id: Option<String>,
    pub tracking_code: Option<String>,
    pub shipping_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub balance_cents: i64,
    pub pending_balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl VirtualAccount {
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            balance_cents: 0,
            pending_balance_cents: 0,
            updated_at: Utc::now(),
        }
    }

    /// Moves `net_cents` from pending to available. Pending never goes below zero.
    pub fn release(&mut self, net_cents: i64, now: DateTime<Utc>) {
        self.balance_cents += net_cents;
        self.pending_balance_cents = (self.pending_balance_cents - net_cents).max(0);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Released,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Released => "released",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "released" => Ok(Self::Released),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub organization_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub net_amount_cents: i64,
    pub release_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VirtualTransaction {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending && self.release_at <= now
    }
}

/// Result of releasing a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { net_cents: i64 },
    /// Already released by an earlier or concurrent run.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    Matched,
    Ambiguous,
    Ignored,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Ambiguous => "ambiguous",
            Self::Ignored => "ignored",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmatched" => Ok(Self::Unmatched),
            "matched" => Ok(Self::Matched),
            "ambiguous" => Ok(Self::Ambiguous),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosTransaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Acquirer sequence number, unique per tenant.
    pub nsu: String,
    pub amount_cents: i64,
    pub captured_at: DateTime<Utc>,
    pub match_status: MatchStatus,
    pub sale_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierTrackingStatusConfig {
    pub organization_id: Uuid,
    pub carrier: String,
    pub carrier_status: String,
    pub shipping_status: String,
    pub notify_customer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_clamps_pending_at_zero() {
        let now = Utc::now();
        let mut account = VirtualAccount::new(Uuid::new_v4());
        account.pending_balance_cents = 5000;
        account.release(5000, now);
        assert_eq!(account.balance_cents, 5000);
        assert_eq!(account.pending_balance_cents, 0);

        account.release(1200, now);
        assert_eq!(account.balance_cents, 6200);
        assert_eq!(account.pending_balance_cents, 0);
    }

    #[test]
    fn test_paid_sale_is_not_downgraded_or_confirmed_again() {
        assert!(SaleStatus::Pending.can_become(SaleStatus::Paid));
        assert!(SaleStatus::Overdue.can_become(SaleStatus::Paid));
        assert!(!SaleStatus::Paid.can_become(SaleStatus::Paid));
        assert!(!SaleStatus::Paid.can_become(SaleStatus::Overdue));
        assert!(!SaleStatus::Refunded.can_become(SaleStatus::Paid));
        assert!(SaleStatus::Paid.can_become(SaleStatus::Refunded));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("overdue".parse::<SaleStatus>(), Ok(SaleStatus::Overdue));
        assert_eq!(MatchStatus::Ambiguous.as_str(), "ambiguous");
        assert!(!SaleStatus::Refunded.is_open_for_reconciliation());
        assert!("void".parse::<TransactionStatus>().is_err());
    }
}
