use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::http::{Method, StatusCode};
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use super::auth_handlers::{self, AuthState};

pub fn build_api_router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/discord/login", get(auth_handlers::login_handler))
        .route(
            "/api/auth/discord/callback",
            get(auth_handlers::callback_handler),
        )
        .route(
            "/api/auth/discord-link",
            get(auth_handlers::redeem_handler).post(auth_handlers::issue_link_handler),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
        )
        .with_state(auth_state)
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn run_api(
    auth_state: Arc<AuthState>,
    listen_addr: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {listen_addr}");
    axum::serve(listener, build_api_router(auth_state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
