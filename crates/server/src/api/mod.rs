//! HTTP surface of the export server.
//!
//! - `auth` - `/do-auth` and `/oauth`, the first two legs of the handshake
//! - `verified` - `/verified`, downloads and writes the collections
//! - `page` - HTML rendering and redirects
//!
//! Every other path is served from the configured static root.

pub mod auth;
pub mod page;
pub mod verified;

use crate::AppState;
use crate::config::{AppConfig, load_config_from};
use crate::error::AppError;
use axum::{
    Extension, Router,
    body::Body,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use hyper::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Fixed listening address.
pub const LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Build the router. Configuration is loaded per request before any route runs.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/do-auth", get(auth::do_auth))
        .route("/oauth", get(auth::oauth_callback))
        .route("/verified", get(verified::verified))
        .fallback(static_files)
        .layer(middleware::from_fn_with_state(state.clone(), load_request_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Re-read the configuration file and attach it to the request.
///
/// A missing or incomplete file fails the request before routing.
async fn load_request_config(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let config = load_config_from(&state.config_path)?;
    info!("Serving path: {}", request.uri());
    request.extensions_mut().insert(Arc::new(config));
    Ok(next.run(request).await)
}

async fn static_files(Extension(config): Extension<Arc<AppConfig>>, request: Request) -> Response {
    let mut serve_dir = ServeDir::new(&config.static_root);
    match serve_dir.try_call(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(e) => {
            tracing::error!("Failed to serve static file: {e}");
            page::error_page(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// Bind the fixed port and serve until the process exits.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: AppState) -> color_eyre::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR).await?;
    info!("serving at {}", LISTEN_ADDR);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
