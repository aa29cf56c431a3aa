use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{
    demand_boards, demand_columns, demand_comments, demand_history, demand_notifications,
    demands,
};
use crate::core::shared::store::{PgStore, StoreError};

use super::notifications::NotificationSink;
use super::types::*;
use super::DemandRepository;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = demand_boards)]
pub struct DbDemandBoard {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub default_column_id: Option<Uuid>,
}

impl From<DbDemandBoard> for DemandBoard {
    fn from(db: DbDemandBoard) -> Self {
        Self {
            id: db.id,
            organization_id: db.organization_id,
            name: db.name,
            default_column_id: db.default_column_id,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = demand_columns)]
pub struct DbDemandColumn {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i32,
    pub is_final: bool,
}

impl From<DbDemandColumn> for DemandColumn {
    fn from(db: DbDemandColumn) -> Self {
        Self {
            id: db.id,
            board_id: db.board_id,
            name: db.name,
            position: db.position,
            is_final: db.is_final,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = demands)]
pub struct DbDemand {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<Uuid>,
    pub urgency: String,
    pub labels: Vec<String>,
    pub sla_config: Option<serde_json::Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbDemand> for Demand {
    type Error = StoreError;

    fn try_from(db: DbDemand) -> Result<Self, Self::Error> {
        let sla_config = db
            .sla_config
            .map(serde_json::from_value::<SlaConfig>)
            .transpose()
            .map_err(|e| StoreError::Database(format!("invalid sla_config: {e}")))?;
        Ok(Self {
            id: db.id,
            organization_id: db.organization_id,
            board_id: db.board_id,
            column_id: db.column_id,
            title: db.title,
            description: db.description,
            assignee_ids: db.assignee_ids,
            urgency: db.urgency.parse().map_err(StoreError::Database)?,
            labels: db.labels,
            sla_config,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
            completed_at: db.completed_at,
        })
    }
}

impl From<&Demand> for DbDemand {
    fn from(d: &Demand) -> Self {
        Self {
            id: d.id,
            organization_id: d.organization_id,
            board_id: d.board_id,
            column_id: d.column_id,
            title: d.title.clone(),
            description: d.description.clone(),
            assignee_ids: d.assignee_ids.clone(),
            urgency: d.urgency.as_str().to_string(),
            labels: d.labels.clone(),
            sla_config: d.sla_config.and_then(|s| serde_json::to_value(s).ok()),
            created_by: d.created_by,
            created_at: d.created_at,
            updated_at: d.updated_at,
            completed_at: d.completed_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = demand_history)]
pub struct DbDemandHistory {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub from_column_id: Uuid,
    pub to_column_id: Uuid,
    pub moved_by: Uuid,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbDemandHistory> for DemandHistory {
    fn from(db: DbDemandHistory) -> Self {
        Self {
            id: db.id,
            demand_id: db.demand_id,
            from_column_id: db.from_column_id,
            to_column_id: db.to_column_id,
            moved_by: db.moved_by,
            reason: db.reason,
            created_at: db.created_at,
        }
    }
}

impl From<&DemandHistory> for DbDemandHistory {
    fn from(h: &DemandHistory) -> Self {
        Self {
            id: h.id,
            demand_id: h.demand_id,
            from_column_id: h.from_column_id,
            to_column_id: h.to_column_id,
            moved_by: h.moved_by,
            reason: h.reason.clone(),
            created_at: h.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = demand_comments)]
pub struct NewDemandComment {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = demand_notifications)]
pub struct NewDemandNotification {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub demand_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<&DemandNotification> for NewDemandNotification {
    fn from(n: &DemandNotification) -> Self {
        Self {
            id: n.id,
            organization_id: n.organization_id,
            demand_id: n.demand_id,
            recipient_id: n.recipient_id,
            kind: n.kind.as_str().to_string(),
            message: n.message.clone(),
            created_at: n.created_at,
            read_at: n.read_at,
        }
    }
}

#[async_trait]
impl DemandRepository for PgStore {
    async fn find_board(
        &self,
        organization_id: Uuid,
        board_id: Uuid,
    ) -> Result<Option<DemandBoard>, StoreError> {
        self.run(move |conn| {
            Ok(demand_boards::table
                .filter(demand_boards::id.eq(board_id))
                .filter(demand_boards::organization_id.eq(organization_id))
                .select(DbDemandBoard::as_select())
                .first(conn)
                .optional()?
                .map(DemandBoard::from))
        })
        .await
    }

    async fn list_columns(&self, board_id: Uuid) -> Result<Vec<DemandColumn>, StoreError> {
        self.run(move |conn| {
            Ok(demand_columns::table
                .filter(demand_columns::board_id.eq(board_id))
                .order(demand_columns::position.asc())
                .select(DbDemandColumn::as_select())
                .load(conn)?
                .into_iter()
                .map(DemandColumn::from)
                .collect())
        })
        .await
    }

    async fn find_column(&self, column_id: Uuid) -> Result<Option<DemandColumn>, StoreError> {
        self.run(move |conn| {
            Ok(demand_columns::table
                .find(column_id)
                .select(DbDemandColumn::as_select())
                .first(conn)
                .optional()?
                .map(DemandColumn::from))
        })
        .await
    }

    async fn find_demand(
        &self,
        organization_id: Uuid,
        demand_id: Uuid,
    ) -> Result<Option<Demand>, StoreError> {
        self.run(move |conn| {
            let row: Option<DbDemand> = demands::table
                .filter(demands::id.eq(demand_id))
                .filter(demands::organization_id.eq(organization_id))
                .select(DbDemand::as_select())
                .first(conn)
                .optional()?;
            row.map(Demand::try_from).transpose()
        })
        .await
    }

    async fn insert_demand(&self, demand: &Demand) -> Result<(), StoreError> {
        let row = DbDemand::from(demand);
        self.run(move |conn| {
            diesel::insert_into(demands::table).values(&row).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn save_demand(&self, demand: &Demand) -> Result<(), StoreError> {
        let row = DbDemand::from(demand);
        self.run(move |conn| {
            diesel::update(
                demands::table
                    .filter(demands::id.eq(row.id))
                    .filter(demands::organization_id.eq(row.organization_id)),
            )
            .set((
                demands::title.eq(&row.title),
                demands::description.eq(&row.description),
                demands::assignee_ids.eq(&row.assignee_ids),
                demands::urgency.eq(&row.urgency),
                demands::labels.eq(&row.labels),
                demands::sla_config.eq(&row.sla_config),
                demands::updated_at.eq(row.updated_at),
            ))
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn apply_move(
        &self,
        organization_id: Uuid,
        entry: &DemandHistory,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Demand>, StoreError> {
        let history = DbDemandHistory::from(entry);
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let row: Option<DbDemand> = diesel::update(
                    demands::table
                        .filter(demands::id.eq(history.demand_id))
                        .filter(demands::organization_id.eq(organization_id)),
                )
                .set((
                    demands::column_id.eq(history.to_column_id),
                    demands::updated_at.eq(history.created_at),
                    demands::completed_at.eq(completed_at),
                ))
                .returning(DbDemand::as_returning())
                .get_result(conn)
                .optional()?;

                let Some(row) = row else {
                    return Ok(None);
                };
                diesel::insert_into(demand_history::table)
                    .values(&history)
                    .execute(conn)?;
                Demand::try_from(row).map(Some)
            })
        })
        .await
    }

    async fn list_history(&self, demand_id: Uuid) -> Result<Vec<DemandHistory>, StoreError> {
        self.run(move |conn| {
            Ok(demand_history::table
                .filter(demand_history::demand_id.eq(demand_id))
                .order(demand_history::created_at.asc())
                .select(DbDemandHistory::as_select())
                .load(conn)?
                .into_iter()
                .map(DemandHistory::from)
                .collect())
        })
        .await
    }

    async fn insert_comment(&self, comment: &DemandComment) -> Result<(), StoreError> {
        let row = NewDemandComment {
            id: comment.id,
            demand_id: comment.demand_id,
            author_id: comment.author_id,
            body: comment.body.clone(),
            created_at: comment.created_at,
        };
        self.run(move |conn| {
            diesel::insert_into(demand_comments::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    async fn deliver(&self, batch: &[DemandNotification]) -> Result<(), StoreError> {
        let rows: Vec<NewDemandNotification> = batch.iter().map(NewDemandNotification::from).collect();
        self.run(move |conn| {
            diesel::insert_into(demand_notifications::table)
                .values(&rows)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
