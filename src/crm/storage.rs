use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{funnel_stages_custom, leads, profiles};
use crate::core::shared::store::{PgStore, StoreError};

use super::{CanonicalStage, FunnelStageCustom, Lead, LeadRepository};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = funnel_stages_custom)]
pub struct DbFunnelStage {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub position: i32,
    pub enum_value: String,
    pub name: String,
    pub is_active: bool,
}

impl TryFrom<DbFunnelStage> for FunnelStageCustom {
    type Error = StoreError;

    fn try_from(db: DbFunnelStage) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            organization_id: db.organization_id,
            position: db.position,
            enum_value: db.enum_value.parse().map_err(StoreError::Database)?,
            name: db.name,
            is_active: db.is_active,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = leads)]
pub struct DbLead {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub stage: String,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbLead> for Lead {
    type Error = StoreError;

    fn try_from(db: DbLead) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            organization_id: db.organization_id,
            name: db.name,
            stage: db.stage.parse().map_err(StoreError::Database)?,
            whatsapp: db.whatsapp,
            email: db.email,
            source: db.source,
            assigned_to: db.assigned_to,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

impl From<&Lead> for DbLead {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            organization_id: lead.organization_id,
            name: lead.name.clone(),
            stage: lead.stage.as_str().to_string(),
            whatsapp: lead.whatsapp.clone(),
            email: lead.email.clone(),
            source: lead.source.clone(),
            assigned_to: lead.assigned_to,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
        }
    }
}

pub(crate) fn lead_by_whatsapp(
    conn: &mut PgConnection,
    organization_id: Uuid,
    whatsapp: &str,
) -> Result<Option<Lead>, StoreError> {
    let row: Option<DbLead> = leads::table
        .filter(leads::organization_id.eq(organization_id))
        .filter(leads::whatsapp.eq(whatsapp))
        .select(DbLead::as_select())
        .first(conn)
        .optional()?;
    row.map(Lead::try_from).transpose()
}

#[async_trait]
impl LeadRepository for PgStore {
    async fn list_stages(&self, organization_id: Uuid) -> Result<Vec<FunnelStageCustom>, StoreError> {
        self.run(move |conn| {
            funnel_stages_custom::table
                .filter(funnel_stages_custom::organization_id.eq(organization_id))
                .order(funnel_stages_custom::position.asc())
                .select(DbFunnelStage::as_select())
                .load::<DbFunnelStage>(conn)?
                .into_iter()
                .map(FunnelStageCustom::try_from)
                .collect()
        })
        .await
    }

    async fn list_leads(&self, organization_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        self.run(move |conn| {
            leads::table
                .filter(leads::organization_id.eq(organization_id))
                .order(leads::created_at.desc())
                .select(DbLead::as_select())
                .load::<DbLead>(conn)?
                .into_iter()
                .map(Lead::try_from)
                .collect()
        })
        .await
    }

    async fn find_lead(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbLead> = leads::table
                .filter(leads::id.eq(lead_id))
                .filter(leads::organization_id.eq(organization_id))
                .select(DbLead::as_select())
                .first(conn)
                .optional()?;
            row.map(Lead::try_from).transpose()
        })
        .await
    }

    async fn find_lead_by_whatsapp(
        &self,
        organization_id: Uuid,
        whatsapp: &str,
    ) -> Result<Option<Lead>, StoreError> {
        let whatsapp = whatsapp.to_string();
        self.run(move |conn| lead_by_whatsapp(conn, organization_id, &whatsapp))
            .await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let row = DbLead::from(lead);
        self.run(move |conn| {
            diesel::insert_into(leads::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_lead_stage(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        stage: CanonicalStage,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbLead> = diesel::update(
                leads::table
                    .filter(leads::id.eq(lead_id))
                    .filter(leads::organization_id.eq(organization_id)),
            )
            .set((leads::stage.eq(stage.as_str()), leads::updated_at.eq(now)))
            .returning(DbLead::as_returning())
            .get_result(conn)
            .optional()?;
            row.map(Lead::try_from).transpose()
        })
        .await
    }

    async fn profile_whatsapp_owner(&self, whatsapp: &str) -> Result<Option<Uuid>, StoreError> {
        let whatsapp = whatsapp.to_string();
        self.run(move |conn| {
            Ok(profiles::table
                .filter(profiles::whatsapp.eq(whatsapp))
                .select(profiles::user_id)
                .first::<Uuid>(conn)
                .optional()?)
        })
        .await
    }

    async fn set_profile_whatsapp(&self, user_id: Uuid, whatsapp: Option<String>) -> Result<(), StoreError> {
        let now = Utc::now();
        self.run(move |conn| {
            diesel::insert_into(profiles::table)
                .values((
                    profiles::user_id.eq(user_id),
                    profiles::whatsapp.eq(&whatsapp),
                    profiles::updated_at.eq(now),
                ))
                .on_conflict(profiles::user_id)
                .do_update()
                .set((profiles::whatsapp.eq(&whatsapp), profiles::updated_at.eq(now)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
