//! HTTP surface: one POST route per generation kind, plus the stored images themselves.

use std::num::NonZeroU16;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::constants::{MAX_UPLOAD_BYTES, PUBLIC_IMAGE_PREFIX};
use crate::gateway::Gateway;

mod api;
mod prelude;

use api::{
    generate_image_handler, search_and_replace_handler, sketch_handler, upscale_image_handler,
};

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    gateway: Arc<Gateway>,
}

impl AppState {
    fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

fn create_router(image_dir: &Path) -> Router<AppState> {
    Router::new()
        .route("/api/generate-image", post(generate_image_handler))
        .route("/api/search-and-replace", post(search_and_replace_handler))
        .route("/api/sketch", post(sketch_handler))
        .route("/api/upscale-image", post(upscale_image_handler))
        .nest_service(PUBLIC_IMAGE_PREFIX, ServeDir::new(image_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// The full application, serving images out of the gateway's store.
pub fn router(gateway: Gateway) -> Router {
    let image_dir = gateway.store().root().to_path_buf();
    create_router(&image_dir).with_state(AppState::new(gateway))
}

/// Binds the listener and serves until Ctrl-C.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    gateway: Gateway,
) -> Result<(), anyhow::Error> {
    let app = router(gateway);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(err) => {
            error!("Failed to listen for Ctrl-C, graceful shutdown disabled: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
