//! Tenant context resolution.
//!
//! Every read and write in the crate is parameterized by a [`TenantContext`]
//! resolved from the authenticated user. A caller-supplied organization id is
//! never trusted on its own: it must be checked with
//! [`TenantContext::ensure_organization`].

pub mod storage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::error::CrmError;
use crate::core::middleware::AuthenticatedUser;
use crate::core::shared::store::StoreError;

/// Upper bound for cached memberships; roles and teams rarely change within a session.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Manager,
    Seller,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Seller => "seller",
            Self::Viewer => "viewer",
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "seller" => Ok(Self::Seller),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown member role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub team_id: Option<Uuid>,
    pub is_sales_manager: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub team_id: Option<Uuid>,
    pub is_sales_manager: bool,
}

impl From<Membership> for TenantContext {
    fn from(m: Membership) -> Self {
        Self {
            organization_id: m.organization_id,
            user_id: m.user_id,
            role: m.role,
            team_id: m.team_id,
            is_sales_manager: m.is_sales_manager,
        }
    }
}

impl TenantContext {
    pub fn can_write(&self) -> bool {
        self.role != MemberRole::Viewer
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, MemberRole::Owner | MemberRole::Admin)
    }

    pub fn ensure_organization(&self, organization_id: Uuid) -> Result<(), CrmError> {
        if organization_id == self.organization_id {
            Ok(())
        } else {
            log::warn!(
                "User {} attempted to act on organization {} from tenant {}",
                self.user_id,
                organization_id,
                self.organization_id
            );
            Err(CrmError::PermissionDenied(
                "organization does not match the caller's tenant".to_string(),
            ))
        }
    }

    pub fn ensure_write(&self) -> Result<(), CrmError> {
        if self.can_write() {
            Ok(())
        } else {
            Err(CrmError::PermissionDenied(format!(
                "role '{}' is read-only",
                self.role.as_str()
            )))
        }
    }
}

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn find_membership(&self, user_id: Uuid) -> Result<Option<Membership>, StoreError>;
}

pub struct TenantResolver {
    directory: Arc<dyn MembershipDirectory>,
    ttl: Duration,
    cache: RwLock<HashMap<Uuid, (Instant, TenantContext)>>,
}

impl std::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResolver")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn MembershipDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            ttl: ttl.min(MAX_CACHE_TTL),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn resolve(&self, user: &AuthenticatedUser) -> Result<TenantContext, CrmError> {
        if !user.is_authenticated() {
            return Err(CrmError::Unauthenticated);
        }

        if let Some(ctx) = self.cached(user.user_id).await {
            return Ok(ctx);
        }

        let membership = self
            .directory
            .find_membership(user.user_id)
            .await?
            .ok_or(CrmError::NoMembership)?;
        let ctx = TenantContext::from(membership);

        if !self.ttl.is_zero() {
            self.cache
                .write()
                .await
                .insert(user.user_id, (Instant::now(), ctx.clone()));
        }
        Ok(ctx)
    }

    pub async fn invalidate(&self, user_id: Uuid) {
        self.cache.write().await.remove(&user_id);
    }

    async fn cached(&self, user_id: Uuid) -> Option<TenantContext> {
        let cache = self.cache.read().await;
        cache
            .get(&user_id)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, ctx)| ctx.clone())
    }
}
