//! Hub server setup
//!
//! Provides the router, its middleware, and the server runner.

mod api;
mod error;
mod handler;
mod state;

pub use api::{
    get_presence, health_check, publish_change, AuthUser, ChangeRequest, ChangeResponse,
    HealthResponse, PresenceResponse,
};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use handler::{connect_handler, ConnectParams};
pub use state::HubState;

use crate::auth::JwtAuthenticator;
use crate::hub::Hub;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use collab_common::{AppConfig, AppError, CorsConfig, JwtService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the hub router
pub fn create_router() -> Router<HubState> {
    Router::new()
        .route("/ws/proposals/:proposal_id", get(connect_handler))
        .route("/api/proposals/:proposal_id/changes", post(publish_change))
        .route("/api/proposals/:proposal_id/presence", get(get_presence))
        .route("/health", get(health_check))
}

/// Build the complete application
pub fn create_app(state: HubState) -> Router {
    let cors = create_cors_layer(&state.config().cors, state.config().app.env.is_production());
    create_router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &CorsConfig, is_production: bool) -> CorsLayer {
    let base_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    if config.allowed_origins.is_empty() && !is_production {
        tracing::warn!("CORS: Allowing any origin (development mode)");
        return base_layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    tracing::info!("CORS: Allowing {} configured origins", origins.len());
    base_layer.allow_origin(AllowOrigin::list(origins))
}

/// Create `HubState` from configuration
pub fn create_hub_state(config: AppConfig) -> HubState {
    let hub = Hub::new_shared(&config.hub);
    let jwt = JwtService::new(&config.jwt.secret, config.jwt.access_token_expiry);
    let authenticator = Arc::new(JwtAuthenticator::new(jwt));

    HubState::new(hub, authenticator, config)
}

/// Serve the application on an already bound listener
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), AppError> {
    axum::serve(listener, app).await.map_err(serve_error)
}

fn serve_error(err: std::io::Error) -> AppError {
    tracing::error!(error = %err, "Hub server stopped");
    AppError::internal(err)
}

/// Run the hub server
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    tracing::info!("Starting hub server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Hub listening on ws://{}/ws/proposals/{{proposal_id}}", addr);

    serve(listener, app).await
}

/// Run the complete hub server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .server
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {e}")))?;

    let state = create_hub_state(config);
    let app = create_app(state);

    run_server(app, addr).await
}
