pub mod cors;
pub mod webhook;

pub use cors::{create_cors_layer, CorsConfig};
pub use webhook::{verify_hub_signature, verify_shared_token, SignatureValidation};
