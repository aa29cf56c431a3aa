use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::tenancy::TenantContext;

use super::error::DemandError;
use super::machine;
use super::types::*;

pub async fn handle_create_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(req): Json<CreateDemandRequest>,
) -> Result<Json<Demand>, DemandError> {
    let demand = machine::create_demand(state.store.as_ref(), &state.notifier, &ctx, req).await?;
    Ok(Json(demand))
}

pub async fn handle_get_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Demand>, DemandError> {
    Ok(Json(machine::get_demand(state.store.as_ref(), &ctx, id).await?))
}

pub async fn handle_update_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDemandRequest>,
) -> Result<Json<Demand>, DemandError> {
    let demand =
        machine::update_demand(state.store.as_ref(), &state.notifier, &ctx, id, req).await?;
    Ok(Json(demand))
}

pub async fn handle_move_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveDemandRequest>,
) -> Result<Json<Demand>, DemandError> {
    let demand = machine::move_demand(state.store.as_ref(), &state.notifier, &ctx, id, req).await?;
    Ok(Json(demand))
}

pub async fn handle_assign_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignDemandRequest>,
) -> Result<Json<Demand>, DemandError> {
    let demand =
        machine::assign_demand(state.store.as_ref(), &state.notifier, &ctx, id, req).await?;
    Ok(Json(demand))
}

pub async fn handle_comment_on_demand(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<DemandComment>, DemandError> {
    let comment =
        machine::comment_on_demand(state.store.as_ref(), &state.notifier, &ctx, id, req).await?;
    Ok(Json(comment))
}

pub async fn handle_get_demand_history(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DemandHistory>>, DemandError> {
    Ok(Json(machine::demand_history(state.store.as_ref(), &ctx, id).await?))
}
