use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use guildpoll_server::api::{AuthState, server::run_api};
use guildpoll_server::auth::crypto::TokenSigner;
use guildpoll_server::auth::{DiscordAuthClient, LoginLinkService, SessionIssuer};
use guildpoll_server::config::AppConfig;
use guildpoll_server::db;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let (pool, db_root_path) = db::init_pool().await?;
    tracing::info!("database ready under {}", db_root_path.display());

    let signer = TokenSigner::new(&config.tokens);
    let issuer = SessionIssuer::new(signer, config.tokens.session_expiry_minutes);
    let login_links = LoginLinkService::new(
        pool.clone(),
        config.discord.clone(),
        &config.tokens,
        issuer,
    );
    let oauth_client = DiscordAuthClient::new(config.discord.clone())?;

    let auth_state = Arc::new(AuthState {
        oauth_client,
        login_links,
        app_base_url: config.app_base_url.clone(),
    });

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    run_api(auth_state, &config.listen_addr, shutdown).await
}
