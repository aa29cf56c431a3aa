//! Authentication for provider callbacks and scheduler calls.
//!
//! Nothing here involves interactive login: WhatsApp signs the raw body with the
//! app secret, the other providers and the scheduler send a shared token header.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const HUB_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const WEBHOOK_TOKEN_HEADER: &str = "X-Webhook-Token";
pub const JOB_TOKEN_HEADER: &str = "X-Job-Token";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureValidation {
    Valid,
    Missing,
    Invalid,
    /// No secret configured, so nothing can be accepted.
    Disabled,
}

impl SignatureValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Missing => "Signature header missing",
            Self::Invalid => "Invalid signature",
            Self::Disabled => "Endpoint not configured",
        }
    }
}

pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Checks `sha256=<hex>` against HMAC-SHA256 of the raw request body.
pub fn verify_hub_signature(
    app_secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> SignatureValidation {
    if app_secret.is_empty() {
        return SignatureValidation::Disabled;
    }
    let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) else {
        return SignatureValidation::Missing;
    };
    let Some(received) = header
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return SignatureValidation::Invalid;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return SignatureValidation::Invalid;
    };
    mac.update(body);
    match mac.verify_slice(&received) {
        Ok(()) => SignatureValidation::Valid,
        Err(_) => {
            warn!("Webhook signature mismatch");
            SignatureValidation::Invalid
        }
    }
}

pub fn verify_shared_token(expected: &str, provided: Option<&str>) -> SignatureValidation {
    if expected.is_empty() {
        return SignatureValidation::Disabled;
    }
    match provided.map(str::trim).filter(|t| !t.is_empty()) {
        None => SignatureValidation::Missing,
        Some(token) if constant_time_compare(token, expected) => SignatureValidation::Valid,
        Some(_) => SignatureValidation::Invalid,
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
