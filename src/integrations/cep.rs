//! Brazilian postal code (CEP) lookup with provider fallback.

use axum::{
    extract::{Path, State},
    Json,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::CepConfig;
use crate::core::error::CrmError;
use crate::core::middleware::AuthenticatedUser;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::digits_only;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub cep: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub ibge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    erro: Option<serde_json::Value>,
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    bairro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
    #[serde(default)]
    ibge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrasilApiResponse {
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    neighborhood: Option<String>,
    city: String,
    state: String,
}

/// Only exactly eight digits (after stripping formatting) are looked up.
pub fn normalize_cep(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    (digits.len() == 8).then_some(digits)
}

#[derive(Debug, Clone)]
pub struct CepClient {
    http_client: reqwest::Client,
    viacep_url: String,
    brasilapi_url: String,
}

impl CepClient {
    pub fn new(config: &CepConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            viacep_url: config.viacep_url.trim_end_matches('/').to_string(),
            brasilapi_url: config.brasilapi_url.trim_end_matches('/').to_string(),
        })
    }

    /// Tries ViaCEP then BrasilAPI. Provider errors are logged and fall
    /// through; `None` means no provider knows the code.
    pub async fn lookup(&self, raw: &str) -> Option<Address> {
        let cep = normalize_cep(raw)?;

        match self.lookup_viacep(&cep).await {
            Ok(Some(address)) => return Some(address),
            Ok(None) => debug!("ViaCEP has no record for {cep}"),
            Err(e) => warn!("ViaCEP lookup for {cep} failed: {e}"),
        }

        match self.lookup_brasilapi(&cep).await {
            Ok(found) => found,
            Err(e) => {
                warn!("BrasilAPI lookup for {cep} failed: {e}");
                None
            }
        }
    }

    async fn lookup_viacep(&self, cep: &str) -> Result<Option<Address>, reqwest::Error> {
        let url = format!("{}/ws/{cep}/json/", self.viacep_url);
        let response = self.http_client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::BAD_REQUEST
            || response.status() == reqwest::StatusCode::NOT_FOUND
        {
            return Ok(None);
        }

        let body: ViaCepResponse = response.error_for_status()?.json().await?;
        let not_found = match &body.erro {
            None | Some(serde_json::Value::Bool(false)) => false,
            Some(_) => true,
        };
        if not_found || body.localidade.is_empty() {
            return Ok(None);
        }

        Ok(Some(Address {
            cep: cep.to_string(),
            street: body.logradouro,
            neighborhood: body.bairro,
            city: body.localidade,
            state: body.uf,
            ibge: body.ibge.filter(|code| !code.is_empty()),
        }))
    }

    async fn lookup_brasilapi(&self, cep: &str) -> Result<Option<Address>, reqwest::Error> {
        let url = format!("{}/api/cep/v1/{cep}", self.brasilapi_url);
        let response = self.http_client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: BrasilApiResponse = response.error_for_status()?.json().await?;
        Ok(Some(Address {
            cep: cep.to_string(),
            street: body.street.unwrap_or_default(),
            neighborhood: body.neighborhood.unwrap_or_default(),
            city: body.city,
            state: body.state,
            ibge: None,
        }))
    }
}

pub async fn handle_lookup_cep(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(cep): Path<String>,
) -> Result<Json<Option<Address>>, CrmError> {
    Ok(Json(state.cep.lookup(&cep).await))
}
