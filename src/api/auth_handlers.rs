//! Authentication HTTP handlers
//!
//! Thin glue over the auth subsystem: map routes onto operations, log the
//! real outcome, and render deliberately generic failure pages so callers
//! cannot probe login-link state.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{
    ConsumeOutcome, DiscordAuthClient, ExternalIdentity, LoginLinkService, LoginOutcome,
};

/// Shared auth state containing the OAuth client and the login-link service
pub struct AuthState {
    pub oauth_client: DiscordAuthClient,
    pub login_links: LoginLinkService,
    pub app_base_url: String,
}

/// OAuth callback parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
    // Not yet round-tripped through a cookie; the callback accepts any state.
    #[allow(dead_code)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemQuery {
    #[serde(default)]
    pub token: String,
}

/// Handler for initiating the web OAuth login
pub async fn login_handler(State(auth_state): State<Arc<AuthState>>) -> impl IntoResponse {
    let state = DiscordAuthClient::generate_state();
    Redirect::temporary(&auth_state.oauth_client.authorize_url(&state))
}

/// Handler for the OAuth callback: exchange the code, upsert the member and
/// answer with a session token
pub async fn callback_handler(
    State(auth_state): State<Arc<AuthState>>,
    Query(params): Query<OAuthCallback>,
) -> impl IntoResponse {
    let identity = match auth_state.oauth_client.exchange_code(&params.code).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::error!("OAuth exchange failed: {err:#}");
            return (
                StatusCode::BAD_GATEWAY,
                Html(failed_login_page().to_string()),
            )
                .into_response();
        }
    };

    match auth_state.login_links.login(&identity).await {
        Ok(LoginOutcome::Granted { token, session }) => {
            tracing::info!(member_id = %session.member_id, "web login succeeded");
            Json(serde_json::json!({
                "token": token,
                "expiresAt": session.expires_at,
                "isAdmin": session.is_admin,
            }))
            .into_response()
        }
        Ok(LoginOutcome::Banned) => {
            tracing::warn!(
                external_user_id = %identity.external_user_id,
                "banned member attempted web login"
            );
            (
                StatusCode::FORBIDDEN,
                Html(failed_login_page().to_string()),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("web login failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(failed_login_page().to_string()),
            )
                .into_response()
        }
    }
}

/// Handler for the bot to request a one-time login link for a member it has
/// already identified
pub async fn issue_link_handler(
    State(auth_state): State<Arc<AuthState>>,
    Json(identity): Json<ExternalIdentity>,
) -> impl IntoResponse {
    match auth_state
        .login_links
        .issue_link(&identity, &auth_state.app_base_url)
        .await
    {
        Ok(link) => {
            tracing::info!(external_user_id = %identity.external_user_id, "issued login link");
            Json(serde_json::json!({
                "url": link.url,
                "expiresAt": link.expires_at,
            }))
            .into_response()
        }
        Err(err) => {
            tracing::error!("failed to issue login link: {err:#}");
            (StatusCode::BAD_REQUEST, "failed to issue login link").into_response()
        }
    }
}

/// Handler for visiting a one-time login link
pub async fn redeem_handler(
    State(auth_state): State<Arc<AuthState>>,
    Query(query): Query<RedeemQuery>,
) -> impl IntoResponse {
    match auth_state.login_links.consume(&query.token).await {
        Ok(ConsumeOutcome::Granted { token, session }) => {
            tracing::info!(member_id = %session.member_id, "login link redeemed");
            Html(success_page(&session.display_name, &token)).into_response()
        }
        Ok(ConsumeOutcome::Denied(reason)) => {
            tracing::warn!(reason = reason.reason(), "login link denied");
            (
                StatusCode::UNAUTHORIZED,
                Html(failed_login_page().to_string()),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("login link redemption failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(failed_login_page().to_string()),
            )
                .into_response()
        }
    }
}

fn success_page(display_name: &str, token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Login Successful</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            text-align: center;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }}
        .success {{
            color: #10b981;
        }}
        .code {{
            background: #f5f5f5;
            padding: 8px 12px;
            border-radius: 4px;
            font-family: monospace;
            margin: 16px 0;
            word-break: break-all;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1 class="success">&#x2713; Login Successful</h1>
        <p>Welcome, <strong>{display_name}</strong>!</p>
        <p>Session token: <code class="code">{token}</code></p>
        <p>You can now return to the voting app.</p>
    </div>
</body>
</html>"#
    )
}

fn failed_login_page() -> &'static str {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Login Failed</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #f5f5f5;
        }
        .container {
            text-align: center;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Login Failed</h1>
        <p>This login link is invalid or has expired. Please request a new one.</p>
    </div>
</body>
</html>"#
}
