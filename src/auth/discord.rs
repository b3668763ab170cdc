//! Discord OAuth client
//!
//! Trades an authorization code for a verified identity plus the caller's
//! membership record in the tracked guild. A 404 from the membership lookup
//! is a valid answer (the user is not a member), not a failure; every other
//! non-success provider response is fatal for the exchange.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use rand::Rng;
use serde::Deserialize;

use super::{ExternalIdentity, PLATFORM_DISCORD};
use crate::config::DiscordConfig;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuildMemberResponse {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    joined_at: Option<String>,
    #[serde(default)]
    nick: Option<String>,
}

pub struct DiscordAuthClient {
    config: DiscordConfig,
    http_client: reqwest::Client,
}

impl DiscordAuthClient {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        Ok(Self {
            config,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .context("Failed to create HTTP client")?,
        })
    }

    /// Authorization URL for the web login flow.
    pub fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", "identify guilds.members.read"),
            ("state", state),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}/oauth2/authorize?{}", self.config.api_base, query)
    }

    /// Cryptographically secure state parameter for CSRF protection.
    pub fn generate_state() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..32).map(|_| rng.r#gen()).collect();
        URL_SAFE_NO_PAD.encode(random_bytes)
    }

    /// Exchange an authorization code for the caller's identity and guild
    /// membership facts.
    pub async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        let access_token = self.fetch_access_token(code).await?;
        let user = self.fetch_user(&access_token).await?;
        let membership = self.fetch_guild_member(&access_token).await?;

        let (role_ids, guild_joined_at, nick, is_guild_member) = match membership {
            Some(member) => (
                member.roles,
                member.joined_at.as_deref().and_then(parse_provider_timestamp),
                member.nick,
                true,
            ),
            None => (Vec::new(), None, None, false),
        };

        Ok(ExternalIdentity {
            platform: PLATFORM_DISCORD.to_string(),
            external_user_id: user.id,
            username: user.username,
            display_name: nick.or(user.global_name),
            guild_joined_at,
            role_ids,
            is_guild_member,
        })
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(format!("{}/oauth2/token", self.config.api_base))
            .form(&params)
            .send()
            .await
            .context("Failed to exchange authorization code")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token exchange failed ({status}): {error_text}"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        Ok(token.access_token)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserResponse> {
        let response = self
            .http_client
            .get(format!("{}/users/@me", self.config.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch user profile")?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch user profile: {}", response.status()));
        }

        response.json().await.context("Failed to parse user profile")
    }

    /// Membership record in the tracked guild. `None` means the user is not
    /// a member.
    async fn fetch_guild_member(&self, access_token: &str) -> Result<Option<GuildMemberResponse>> {
        let response = self
            .http_client
            .get(format!(
                "{}/users/@me/guilds/{}/member",
                self.config.api_base, self.config.guild_id
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch guild membership")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to fetch guild membership: {}",
                response.status()
            ));
        }

        let member = response
            .json()
            .await
            .context("Failed to parse guild membership")?;
        Ok(Some(member))
    }
}

fn parse_provider_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DiscordConfig {
        DiscordConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "https://app.test/api/auth/discord/callback".to_string(),
            guild_id: "guild-1".to_string(),
            admin_role_ids: vec![],
            api_base: "https://discord.test/api".to_string(),
        }
    }

    #[test]
    fn test_authorize_url_carries_client_and_redirect() {
        let client = DiscordAuthClient::new(test_config()).unwrap();
        let url = client.authorize_url("xyz");

        assert!(url.starts_with("https://discord.test/api/oauth2/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode("https://app.test/api/auth/discord/callback")
        )));
    }

    #[test]
    fn test_generate_state() {
        let state = DiscordAuthClient::generate_state();
        assert!(state.len() >= 43);
        assert_ne!(state, DiscordAuthClient::generate_state());
    }

    #[test]
    fn test_parse_provider_timestamp() {
        assert_eq!(
            parse_provider_timestamp("2021-04-12T00:00:00+00:00"),
            Some(1618185600)
        );
        assert_eq!(
            parse_provider_timestamp("2021-04-12T00:00:00.000000+00:00"),
            Some(1618185600)
        );
        assert_eq!(parse_provider_timestamp("not a date"), None);
    }

    #[test]
    fn test_guild_member_payload_defaults() {
        let member: GuildMemberResponse = serde_json::from_str("{}").unwrap();
        assert!(member.roles.is_empty());
        assert!(member.joined_at.is_none());
        assert!(member.nick.is_none());

        let member: GuildMemberResponse = serde_json::from_str(
            r#"{"roles":["r1"],"joined_at":"2021-04-12T00:00:00+00:00","nick":"Nick"}"#,
        )
        .unwrap();
        assert_eq!(member.roles, vec!["r1".to_string()]);
        assert_eq!(member.nick.as_deref(), Some("Nick"));
    }
}
