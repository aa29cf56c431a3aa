//! Outbound helpers: postal code lookup and signed media links.

pub mod cep;
pub mod media;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use cep::{normalize_cep, Address, CepClient};
pub use media::{MediaError, MediaSigner, SignedUrl};

pub fn configure_integration_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cep/:cep", get(cep::handle_lookup_cep))
        .route("/api/media/sign", post(media::handle_sign_media))
        .route("/api/media/verify", get(media::handle_verify_media))
}
