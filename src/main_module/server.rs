//! HTTP server initialization and routing

use axum::{routing::get, Router};
use log::{error, info};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::security::create_cors_layer;

use super::health_check;

/// Full application router. CORS is the outermost layer so preflight requests are
/// answered before any extractor or handler runs.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&app_state.config.cors);

    let api_router = Router::new()
        .route("/health", get(health_check))
        .merge(crate::crm::configure_crm_routes())
        .merge(crate::demands::configure_demands_routes())
        .merge(crate::finance::configure_finance_routes())
        .merge(crate::integrations::configure_integration_routes())
        .merge(crate::webhooks::configure_webhook_routes());

    api_router
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_router(app_state.clone());

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {} - is another instance running?", addr, e);
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pending = app_state.notifier.in_flight();
    if pending > 0 {
        info!("Waiting for {} notification batch(es) to finish", pending);
    }
    app_state.notifier.drain().await;
    info!("Server stopped");
    Ok(())
}
