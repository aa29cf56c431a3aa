//! Leads and the tenant-configurable sales funnel.

pub mod leads;
pub mod phone;
pub mod stages;
pub mod storage;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use leads::*;
pub use phone::{format_whatsapp, normalize_whatsapp};
pub use stages::{
    group_by_primary_stage, BoardColumn, CanonicalStage, FunnelStageCustom, PrimaryStageMap,
    StageBoard, Staged,
};

pub fn configure_crm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/board", get(handle_get_board))
        .route("/api/crm/stages", get(handle_list_stages))
        .route("/api/crm/leads", post(handle_create_lead))
        .route("/api/crm/leads/:id/stage", put(handle_move_lead))
        .route("/api/profile/whatsapp", put(handle_update_profile_whatsapp))
}
