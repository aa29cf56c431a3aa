use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::core::config::CorsSettings;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "Accept".to_string(),
                "Origin".to_string(),
                "X-Request-ID".to_string(),
                "X-Webhook-Token".to_string(),
                "X-Job-Token".to_string(),
                "X-Hub-Signature-256".to_string(),
            ],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn from_settings(settings: &CorsSettings) -> Self {
        Self::default().with_origins(
            settings
                .allowed_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        )
    }

    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let mut cors = if origins.is_empty() {
            CorsLayer::new().allow_origin(AllowOrigin::predicate(validate_origin))
        } else {
            CorsLayer::new().allow_origin(origins.clone())
        };

        let headers: Vec<header::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        cors = cors
            .allow_methods(self.allowed_methods)
            .allow_headers(headers)
            .max_age(std::time::Duration::from_secs(self.max_age_secs));

        // credentials only travel to origins that were explicitly listed
        if self.allow_credentials && !origins.is_empty() {
            cors = cors.allow_credentials(true);
        }
        cors
    }
}

fn validate_origin(origin: &HeaderValue, _request: &axum::http::request::Parts) -> bool {
    origin.to_str().map(is_valid_origin_format).unwrap_or(false)
}

fn is_valid_origin_format(origin: &str) -> bool {
    let Some(host) = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
    else {
        return false;
    };

    if host.is_empty() || host.contains('/') || host.contains("..") {
        return false;
    }

    let lower = origin.to_lowercase();
    !["<script", "javascript:", "data:", "%3c", "%3e", "\\x"]
        .iter()
        .any(|p| lower.contains(p))
}

pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let config = CorsConfig::from_settings(settings);
    if config.allowed_origins.is_empty() {
        info!("Creating CORS layer accepting any well-formed origin without credentials");
    } else {
        info!("Creating CORS layer for {} configured origin(s)", config.allowed_origins.len());
    }
    config.build()
}
