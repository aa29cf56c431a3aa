//! Demand boards: Kanban tickets whose status is the column they sit in.

pub mod error;
pub mod handlers;
pub mod machine;
pub mod notifications;
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

pub use error::DemandError;
pub use handlers::*;
pub use machine::*;
pub use notifications::{NotificationDispatcher, NotificationSink};
pub use types::*;

#[async_trait]
pub trait DemandRepository: Send + Sync {
    async fn find_board(
        &self,
        organization_id: Uuid,
        board_id: Uuid,
    ) -> Result<Option<DemandBoard>, StoreError>;
    async fn list_columns(&self, board_id: Uuid) -> Result<Vec<DemandColumn>, StoreError>;
    async fn find_column(&self, column_id: Uuid) -> Result<Option<DemandColumn>, StoreError>;
    async fn find_demand(
        &self,
        organization_id: Uuid,
        demand_id: Uuid,
    ) -> Result<Option<Demand>, StoreError>;
    async fn insert_demand(&self, demand: &Demand) -> Result<(), StoreError>;
    /// Persists the editable fields (title, description, urgency, labels, sla, assignees).
    async fn save_demand(&self, demand: &Demand) -> Result<(), StoreError>;
    /// Sets the column and appends `entry` as one unit. `None` when the demand is gone.
    async fn apply_move(
        &self,
        organization_id: Uuid,
        entry: &DemandHistory,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Demand>, StoreError>;
    async fn list_history(&self, demand_id: Uuid) -> Result<Vec<DemandHistory>, StoreError>;
    async fn insert_comment(&self, comment: &DemandComment) -> Result<(), StoreError>;
}

pub fn configure_demands_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/demands", post(handle_create_demand))
        .route(
            "/api/demands/:id",
            get(handle_get_demand).put(handle_update_demand),
        )
        .route("/api/demands/:id/move", post(handle_move_demand))
        .route("/api/demands/:id/assign", post(handle_assign_demand))
        .route("/api/demands/:id/comments", post(handle_comment_on_demand))
        .route("/api/demands/:id/history", get(handle_get_demand_history))
}
