use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::organization_members;
use crate::core::shared::store::{PgStore, StoreError};

use super::{Membership, MembershipDirectory};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = organization_members)]
pub struct DbMembership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub team_id: Option<Uuid>,
    pub is_sales_manager: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbMembership> for Membership {
    type Error = StoreError;

    fn try_from(db: DbMembership) -> Result<Self, Self::Error> {
        Ok(Self {
            organization_id: db.organization_id,
            user_id: db.user_id,
            role: db.role.parse().map_err(StoreError::Database)?,
            team_id: db.team_id,
            is_sales_manager: db.is_sales_manager,
        })
    }
}

#[async_trait]
impl MembershipDirectory for PgStore {
    async fn find_membership(&self, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbMembership> = organization_members::table
                .filter(organization_members::user_id.eq(user_id))
                .select(DbMembership::as_select())
                .first(conn)
                .optional()?;
            row.map(Membership::try_from).transpose()
        })
        .await
    }
}
