use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::{CrmError, CrmResult};
use crate::core::shared::state::AppState;
use crate::core::shared::store::StoreError;
use crate::tenancy::TenantContext;

use super::phone::normalize_whatsapp;
use super::stages::{group_by_primary_stage, CanonicalStage, FunnelStageCustom, StageBoard, Staged};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub stage: CanonicalStage,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(organization_id: Uuid, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name,
            stage: CanonicalStage::New,
            whatsapp: None,
            email: None,
            source: None,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Staged for Lead {
    fn stage(&self) -> CanonicalStage {
        self.stage
    }
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn list_stages(&self, organization_id: Uuid) -> Result<Vec<FunnelStageCustom>, StoreError>;
    async fn list_leads(&self, organization_id: Uuid) -> Result<Vec<Lead>, StoreError>;
    async fn find_lead(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn find_lead_by_whatsapp(
        &self,
        organization_id: Uuid,
        whatsapp: &str,
    ) -> Result<Option<Lead>, StoreError>;
    /// Fails with `StoreError::Conflict` when the whatsapp is already taken in the tenant.
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError>;
    async fn update_lead_stage(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        stage: CanonicalStage,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError>;
    /// Owner of a profile whatsapp across every organization.
    async fn profile_whatsapp_owner(&self, whatsapp: &str) -> Result<Option<Uuid>, StoreError>;
    async fn set_profile_whatsapp(&self, user_id: Uuid, whatsapp: Option<String>) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub stage: Option<CanonicalStage>,
    pub assigned_to: Option<Uuid>,
    /// Must match the caller's tenant when present.
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MoveLeadRequest {
    pub stage: Option<CanonicalStage>,
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileWhatsAppRequest {
    pub whatsapp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileWhatsApp {
    pub user_id: Uuid,
    pub whatsapp: Option<String>,
}

fn parse_optional_whatsapp(raw: Option<&str>) -> CrmResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => normalize_whatsapp(value)
            .map(Some)
            .ok_or_else(|| CrmError::Validation(format!("invalid WhatsApp number '{value}'"))),
    }
}

pub async fn lead_board<R: LeadRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
) -> CrmResult<StageBoard<Lead>> {
    let stages = repo.list_stages(ctx.organization_id).await?;
    let leads = repo.list_leads(ctx.organization_id).await?;
    Ok(group_by_primary_stage(&stages, leads))
}

pub async fn create_lead<R: LeadRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    req: CreateLeadRequest,
) -> CrmResult<Lead> {
    ctx.ensure_write()?;
    if let Some(org) = req.organization_id {
        ctx.ensure_organization(org)?;
    }

    let name = req.name.trim();
    if name.is_empty() {
        return Err(CrmError::Validation("lead name is required".to_string()));
    }

    let whatsapp = parse_optional_whatsapp(req.whatsapp.as_deref())?;
    if let Some(number) = &whatsapp {
        if let Some(existing) = repo.find_lead_by_whatsapp(ctx.organization_id, number).await? {
            return Err(CrmError::Conflict(format!(
                "WhatsApp {number} already belongs to lead {}",
                existing.id
            )));
        }
    }

    let mut lead = Lead::new(ctx.organization_id, name.to_string());
    lead.whatsapp = whatsapp;
    lead.email = req.email;
    lead.source = req.source;
    lead.stage = req.stage.unwrap_or(CanonicalStage::New);
    lead.assigned_to = req.assigned_to.or(Some(ctx.user_id));

    // the unique index still guards the race between the check and the insert
    repo.insert_lead(&lead).await?;
    log::info!("Created lead {} in organization {}", lead.id, lead.organization_id);
    Ok(lead)
}

pub async fn move_lead_stage<R: LeadRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    lead_id: Uuid,
    req: MoveLeadRequest,
) -> CrmResult<Lead> {
    ctx.ensure_write()?;

    let stage = match (req.stage_id, req.stage) {
        (Some(stage_id), _) => repo
            .list_stages(ctx.organization_id)
            .await?
            .into_iter()
            .find(|s| s.id == stage_id)
            .map(|s| s.enum_value)
            .ok_or_else(|| CrmError::NotFound(format!("funnel stage {stage_id}")))?,
        (None, Some(stage)) => stage,
        (None, None) => {
            return Err(CrmError::Validation("stage or stage_id is required".to_string()))
        }
    };

    repo.update_lead_stage(ctx.organization_id, lead_id, stage, Utc::now())
        .await?
        .ok_or_else(|| CrmError::NotFound(format!("lead {lead_id}")))
}

pub async fn update_profile_whatsapp<R: LeadRepository + ?Sized>(
    repo: &R,
    user_id: Uuid,
    raw: Option<&str>,
) -> CrmResult<ProfileWhatsApp> {
    let whatsapp = parse_optional_whatsapp(raw)?;

    if let Some(number) = &whatsapp {
        match repo.profile_whatsapp_owner(number).await? {
            Some(owner) if owner != user_id => {
                return Err(CrmError::Conflict(format!(
                    "WhatsApp {number} is already registered to another user"
                )));
            }
            _ => {}
        }
    }

    repo.set_profile_whatsapp(user_id, whatsapp.clone()).await?;
    Ok(ProfileWhatsApp { user_id, whatsapp })
}

pub async fn handle_get_board(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> CrmResult<Json<StageBoard<Lead>>> {
    Ok(Json(lead_board(state.store.as_ref(), &ctx).await?))
}

pub async fn handle_list_stages(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
) -> CrmResult<Json<Vec<FunnelStageCustom>>> {
    let mut stages = state.store.list_stages(ctx.organization_id).await?;
    stages.sort_by_key(|s| s.position);
    Ok(Json(stages))
}

pub async fn handle_create_lead(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(req): Json<CreateLeadRequest>,
) -> CrmResult<Json<Lead>> {
    Ok(Json(create_lead(state.store.as_ref(), &ctx, req).await?))
}

pub async fn handle_move_lead(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveLeadRequest>,
) -> CrmResult<Json<Lead>> {
    Ok(Json(move_lead_stage(state.store.as_ref(), &ctx, id, req).await?))
}

pub async fn handle_update_profile_whatsapp(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(req): Json<UpdateProfileWhatsAppRequest>,
) -> CrmResult<Json<ProfileWhatsApp>> {
    let profile =
        update_profile_whatsapp(state.store.as_ref(), ctx.user_id, req.whatsapp.as_deref()).await?;
    Ok(Json(profile))
}
