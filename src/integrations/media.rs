//! Short-lived signed links to tenant media.
//!
//! A link carries `expires` (unix seconds) and `signature`, the hex HMAC-SHA256 of
//! `"{path}\n{expires}"`. Links never outlive [`MAX_TTL_SECS`]; clients ask for a new one
//! instead of extending an old one.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::MediaConfig;
use crate::core::error::CrmError;
use crate::core::shared::state::AppState;
use crate::tenancy::TenantContext;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_TTL_SECS: i64 = 3600;

fn max_ttl() -> Duration {
    Duration::seconds(MAX_TTL_SECS)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media signing is not configured")]
    NotConfigured,
    #[error("invalid media path: {0}")]
    InvalidPath(String),
    #[error("path is outside the caller's organization")]
    OutsideTenant,
    #[error("link expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
}

impl From<MediaError> for CrmError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotConfigured => CrmError::Internal(err.to_string()),
            MediaError::InvalidPath(_) => CrmError::Validation(err.to_string()),
            MediaError::OutsideTenant | MediaError::Expired | MediaError::InvalidSignature => {
                CrmError::PermissionDenied(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub path: String,
    pub expires: i64,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

#[derive(Clone)]
pub struct MediaSigner {
    base_url: String,
    secret: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for MediaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSigner")
            .field("base_url", &self.base_url)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

fn validate_path(path: &str) -> Result<&str, MediaError> {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(MediaError::InvalidPath(path.to_string()));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(MediaError::InvalidPath(path.to_string()));
    }
    Ok(path)
}

impl MediaSigner {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret: config.signing_secret.clone(),
            default_ttl: Duration::seconds(config.default_ttl_secs),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn mac(&self, path: &str, expires: i64) -> Result<HmacSha256, MediaError> {
        if self.secret.is_empty() {
            return Err(MediaError::NotConfigured);
        }
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| MediaError::NotConfigured)?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Signs `path` for the tenant. The TTL is clamped to one hour.
    pub fn sign(
        &self,
        organization_id: Uuid,
        path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, MediaError> {
        let path = validate_path(path)?;
        if !path.starts_with(&format!("{organization_id}/")) {
            return Err(MediaError::OutsideTenant);
        }

        let ttl = if ttl <= Duration::zero() || ttl > max_ttl() {
            max_ttl()
        } else {
            ttl
        };
        let expires = (now + ttl).timestamp();
        let signature = hex::encode(self.mac(path, expires)?.finalize().into_bytes());

        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!(
            "{}/{encoded_path}?expires={expires}&signature={signature}",
            self.base_url
        );

        Ok(SignedUrl {
            url,
            path: path.to_string(),
            expires,
            expires_at: Utc
                .timestamp_opt(expires, 0)
                .single()
                .unwrap_or(now + ttl),
            signature,
        })
    }

    pub fn verify(
        &self,
        path: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MediaError> {
        let path = validate_path(path)?;
        if expires <= now.timestamp() {
            return Err(MediaError::Expired);
        }
        // a link claiming a later expiry than any we issue has been edited
        if expires > (now + max_ttl()).timestamp() {
            return Err(MediaError::InvalidSignature);
        }

        let provided = hex::decode(signature.trim()).map_err(|_| MediaError::InvalidSignature)?;
        self.mac(path, expires)?
            .verify_slice(&provided)
            .map_err(|_| MediaError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
pub struct SignMediaRequest {
    pub path: String,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyMediaQuery {
    pub path: String,
    pub expires: i64,
    pub signature: String,
}

pub async fn handle_sign_media(
    State(state): State<Arc<AppState>>,
    ctx: TenantContext,
    Json(req): Json<SignMediaRequest>,
) -> Result<Json<SignedUrl>, CrmError> {
    let ttl = req
        .ttl_secs
        .map(Duration::seconds)
        .unwrap_or_else(|| state.media.default_ttl());
    let signed = state
        .media
        .sign(ctx.organization_id, &req.path, ttl, Utc::now())?;
    Ok(Json(signed))
}

pub async fn handle_verify_media(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyMediaQuery>,
) -> Result<Json<serde_json::Value>, CrmError> {
    state
        .media
        .verify(&query.path, query.expires, &query.signature, Utc::now())?;
    Ok(Json(serde_json::json!({ "valid": true, "path": query.path })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> MediaSigner {
        MediaSigner::new(&MediaConfig {
            base_url: "https://media.example.com/".to_string(),
            signing_secret: "media-secret".to_string(),
            default_ttl_secs: 600,
        })
    }

    #[test]
    fn test_signed_link_verifies_until_expiry() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let path = format!("{org}/leads/photo 1.jpg");
        let signed = signer().sign(org, &path, Duration::minutes(10), now).unwrap();

        assert!(signed.url.starts_with(&format!("https://media.example.com/{org}/leads/photo%201.jpg?expires=")));
        assert_eq!(signed.expires, (now + Duration::minutes(10)).timestamp());
        assert!(signer()
            .verify(&path, signed.expires, &signed.signature, now)
            .is_ok());
        assert_eq!(
            signer().verify(&path, signed.expires, &signed.signature, now + Duration::minutes(11)),
            Err(MediaError::Expired)
        );
    }

    #[test]
    fn test_ttl_is_clamped_to_one_hour() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let signed = signer()
            .sign(org, &format!("{org}/a.pdf"), Duration::days(7), now)
            .unwrap();
        assert_eq!(signed.expires, (now + max_ttl()).timestamp());
    }

    #[test]
    fn test_tampering_is_rejected() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let path = format!("{org}/a.pdf");
        let signed = signer().sign(org, &path, Duration::minutes(5), now).unwrap();

        assert_eq!(
            signer().verify(&format!("{org}/b.pdf"), signed.expires, &signed.signature, now),
            Err(MediaError::InvalidSignature)
        );
        assert_eq!(
            signer().verify(&path, signed.expires + 60, &signed.signature, now),
            Err(MediaError::InvalidSignature)
        );
        assert_eq!(
            signer().verify(&path, signed.expires, "zz", now),
            Err(MediaError::InvalidSignature)
        );
    }

    #[test]
    fn test_paths_must_stay_inside_tenant() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        assert_eq!(
            signer().sign(org, &format!("{}/a.pdf", Uuid::new_v4()), Duration::minutes(5), now),
            Err(MediaError::OutsideTenant)
        );
        assert!(matches!(
            signer().sign(org, &format!("{org}/../other/a.pdf"), Duration::minutes(5), now),
            Err(MediaError::InvalidPath(_))
        ));
        assert!(matches!(
            signer().sign(org, "/etc/passwd", Duration::minutes(5), now),
            Err(MediaError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_unconfigured_signer_refuses() {
        let org = Uuid::new_v4();
        let unconfigured = MediaSigner::new(&MediaConfig::default());
        assert_eq!(
            unconfigured.sign(org, &format!("{org}/a.pdf"), Duration::minutes(5), Utc::now()),
            Err(MediaError::NotConfigured)
        );
    }
}
