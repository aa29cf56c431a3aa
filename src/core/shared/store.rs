//! Repository seam between the domain modules and the relational database.
//!
//! Every domain module declares the narrow trait it needs (`LeadRepository`,
//! `DemandRepository`, `Ledger`, ...). `PgStore` implements all of them on top of a
//! diesel r2d2 pool; each module keeps its own `impl ... for PgStore` next to its
//! row types in `storage.rs`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::core::shared::utils::DbPool;
use crate::crm::LeadRepository;
use crate::demands::{DemandRepository, NotificationSink};
use crate::finance::{Ledger, PosRepository};
use crate::tenancy::MembershipDirectory;
use crate::webhooks::InboundLedger;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Database(String),
    #[error("connection pool: {0}")]
    Pool(String),
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store:
    HealthProbe
    + MembershipDirectory
    + LeadRepository
    + DemandRepository
    + NotificationSink
    + InboundLedger
    + Ledger
    + PosRepository
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: HealthProbe
        + MembershipDirectory
        + LeadRepository
        + DemandRepository
        + NotificationSink
        + InboundLedger
        + Ledger
        + PosRepository
        + Send
        + Sync
{
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs a blocking diesel closure on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e: tokio::task::JoinError| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl HealthProbe for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }
}
