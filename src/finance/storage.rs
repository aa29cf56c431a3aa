use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{pos_transactions, sales, virtual_accounts, virtual_transactions};
use crate::core::shared::store::{PgStore, StoreError};

use super::types::*;
use super::{Ledger, PosRepository};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sales)]
pub struct DbSale {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub total_cents: i64,
    pub status: String,
    pub payment_charge_id: Option<String>,
    pub tracking_code: Option<String>,
    pub shipping_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbSale> for Sale {
    type Error = StoreError;

    fn try_from(db: DbSale) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            organization_id: db.organization_id,
            lead_id: db.lead_id,
            total_cents: db.total_cents,
            status: db.status.parse().map_err(StoreError::Database)?,
            payment_charge_id: db.payment_charge_id,
            tracking_code: db.tracking_code,
            shipping_status: db.shipping_status,
            paid_at: db.paid_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = virtual_accounts)]
pub struct DbVirtualAccount {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub balance_cents: i64,
    pub pending_balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<DbVirtualAccount> for VirtualAccount {
    fn from(db: DbVirtualAccount) -> Self {
        Self {
            id: db.id,
            organization_id: db.organization_id,
            balance_cents: db.balance_cents,
            pending_balance_cents: db.pending_balance_cents,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = virtual_transactions)]
pub struct DbVirtualTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub organization_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub status: String,
    pub net_amount_cents: i64,
    pub release_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbVirtualTransaction> for VirtualTransaction {
    type Error = StoreError;

    fn try_from(db: DbVirtualTransaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            account_id: db.account_id,
            organization_id: db.organization_id,
            sale_id: db.sale_id,
            status: db.status.parse().map_err(StoreError::Database)?,
            net_amount_cents: db.net_amount_cents,
            release_at: db.release_at,
            released_at: db.released_at,
            created_at: db.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pos_transactions)]
pub struct DbPosTransaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub nsu: String,
    pub amount_cents: i64,
    pub captured_at: DateTime<Utc>,
    pub match_status: String,
    pub sale_id: Option<Uuid>,
}

impl TryFrom<DbPosTransaction> for PosTransaction {
    type Error = StoreError;

    fn try_from(db: DbPosTransaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            organization_id: db.organization_id,
            nsu: db.nsu,
            amount_cents: db.amount_cents,
            captured_at: db.captured_at,
            match_status: db.match_status.parse().map_err(StoreError::Database)?,
            sale_id: db.sale_id,
        })
    }
}

/// Locks (creating if needed) the tenant's account row. Must run inside a transaction.
pub(crate) fn lock_account(
    conn: &mut PgConnection,
    organization_id: Uuid,
) -> Result<DbVirtualAccount, StoreError> {
    diesel::insert_into(virtual_accounts::table)
        .values(DbVirtualAccount {
            id: Uuid::new_v4(),
            organization_id,
            balance_cents: 0,
            pending_balance_cents: 0,
            updated_at: Utc::now(),
        })
        .on_conflict(virtual_accounts::organization_id)
        .do_nothing()
        .execute(conn)?;

    Ok(virtual_accounts::table
        .filter(virtual_accounts::organization_id.eq(organization_id))
        .select(DbVirtualAccount::as_select())
        .for_update()
        .first(conn)?)
}

/// Records the pending credit for a paid sale. At most one transaction exists per
/// sale; returns `false` when the sale was already credited. Must run inside a
/// transaction.
pub(crate) fn credit_pending(
    conn: &mut PgConnection,
    organization_id: Uuid,
    sale_id: Uuid,
    net_cents: i64,
    release_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let account = lock_account(conn, organization_id)?;

    let inserted = diesel::insert_into(virtual_transactions::table)
        .values(DbVirtualTransaction {
            id: Uuid::new_v4(),
            account_id: account.id,
            organization_id,
            sale_id: Some(sale_id),
            status: TransactionStatus::Pending.as_str().to_string(),
            net_amount_cents: net_cents,
            release_at,
            released_at: None,
            created_at: now,
        })
        .on_conflict(virtual_transactions::sale_id)
        .do_nothing()
        .execute(conn)?;
    if inserted == 0 {
        return Ok(false);
    }

    diesel::update(virtual_accounts::table.find(account.id))
        .set((
            virtual_accounts::pending_balance_cents
                .eq(virtual_accounts::pending_balance_cents + net_cents),
            virtual_accounts::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(true)
}

#[async_trait]
impl Ledger for PgStore {
    async fn due_transactions(&self, now: DateTime<Utc>) -> Result<Vec<VirtualTransaction>, StoreError> {
        self.run(move |conn| {
            virtual_transactions::table
                .filter(virtual_transactions::status.eq(TransactionStatus::Pending.as_str()))
                .filter(virtual_transactions::release_at.le(now))
                .order(virtual_transactions::release_at.asc())
                .select(DbVirtualTransaction::as_select())
                .load::<DbVirtualTransaction>(conn)?
                .into_iter()
                .map(VirtualTransaction::try_from)
                .collect()
        })
        .await
    }

    async fn release_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                // the status guard makes a concurrent or repeated release a no-op
                let flipped: Option<DbVirtualTransaction> = diesel::update(
                    virtual_transactions::table
                        .filter(virtual_transactions::id.eq(transaction_id))
                        .filter(virtual_transactions::status.eq(TransactionStatus::Pending.as_str())),
                )
                .set((
                    virtual_transactions::status.eq(TransactionStatus::Released.as_str()),
                    virtual_transactions::released_at.eq(Some(now)),
                ))
                .returning(DbVirtualTransaction::as_returning())
                .get_result(conn)
                .optional()?;

                let Some(tx) = flipped else {
                    return Ok(ReleaseOutcome::Skipped);
                };

                let account: DbVirtualAccount = virtual_accounts::table
                    .find(tx.account_id)
                    .select(DbVirtualAccount::as_select())
                    .for_update()
                    .first(conn)?;
                let mut account = VirtualAccount::from(account);
                account.release(tx.net_amount_cents, now);

                diesel::update(virtual_accounts::table.find(account.id))
                    .set((
                        virtual_accounts::balance_cents.eq(account.balance_cents),
                        virtual_accounts::pending_balance_cents.eq(account.pending_balance_cents),
                        virtual_accounts::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                Ok(ReleaseOutcome::Released {
                    net_cents: tx.net_amount_cents,
                })
            })
        })
        .await
    }

    async fn find_account(&self, organization_id: Uuid) -> Result<Option<VirtualAccount>, StoreError> {
        self.run(move |conn| {
            Ok(virtual_accounts::table
                .filter(virtual_accounts::organization_id.eq(organization_id))
                .select(DbVirtualAccount::as_select())
                .first(conn)
                .optional()?
                .map(VirtualAccount::from))
        })
        .await
    }
}

#[async_trait]
impl PosRepository for PgStore {
    async fn unmatched_pos_transactions(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<PosTransaction>, StoreError> {
        self.run(move |conn| {
            pos_transactions::table
                .filter(pos_transactions::organization_id.eq(organization_id))
                .filter(pos_transactions::match_status.eq(MatchStatus::Unmatched.as_str()))
                .order(pos_transactions::captured_at.asc())
                .select(DbPosTransaction::as_select())
                .load::<DbPosTransaction>(conn)?
                .into_iter()
                .map(PosTransaction::try_from)
                .collect()
        })
        .await
    }

    async fn candidate_sales(
        &self,
        organization_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sale>, StoreError> {
        self.run(move |conn| {
            let claimed = pos_transactions::table
                .filter(pos_transactions::organization_id.eq(organization_id))
                .filter(pos_transactions::sale_id.is_not_null())
                .select(pos_transactions::sale_id.assume_not_null());

            sales::table
                .filter(sales::organization_id.eq(organization_id))
                .filter(
                    sales::created_at
                        .between(since, until)
                        .or(sales::paid_at.between(since, until).assume_not_null()),
                )
                .filter(sales::id.ne_all(claimed))
                .select(DbSale::as_select())
                .load::<DbSale>(conn)?
                .into_iter()
                .map(Sale::try_from)
                .collect()
        })
        .await
    }

    async fn set_pos_match(
        &self,
        organization_id: Uuid,
        transaction_id: Uuid,
        status: MatchStatus,
        sale_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.run(move |conn| {
            diesel::update(
                pos_transactions::table
                    .filter(pos_transactions::id.eq(transaction_id))
                    .filter(pos_transactions::organization_id.eq(organization_id)),
            )
            .set((
                pos_transactions::match_status.eq(status.as_str()),
                pos_transactions::sale_id.eq(sale_id),
            ))
            .execute(conn)?;
            Ok(())
        })
        .await
    }
}
