//! Configuration for the guildpoll server
//!
//! All settings are read from the environment once at startup and handed to
//! components as immutable structs. Nothing reads configuration ambiently.

use anyhow::{Context, Result};
use url::Url;

const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_SESSION_EXPIRY_MINUTES: i64 = 720;
const DEFAULT_LOGIN_LINK_EXPIRY_MINUTES: i64 = 5;

/// Discord OAuth application plus the tracked guild.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI (callback URL)
    pub redirect_uri: String,
    /// The guild whose members may sign in
    pub guild_id: String,
    /// Role ids that confer admin privileges in this application
    pub admin_role_ids: Vec<String>,
    /// Discord API base URL, overridable for tests
    pub api_base: String,
}

/// Session-token signing and login-link lifetimes.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_key: String,
    pub issuer: String,
    pub audience: String,
    pub session_expiry_minutes: i64,
    pub login_link_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    /// Public base URL of the voting app, used to build login links
    pub app_base_url: String,
    pub discord: DiscordConfig,
    pub tokens: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let discord = DiscordConfig {
            client_id: require("DISCORD_CLIENT_ID")?,
            client_secret: require("DISCORD_CLIENT_SECRET")?,
            redirect_uri: require_url("DISCORD_REDIRECT_URI")?,
            guild_id: require("DISCORD_GUILD_ID")?,
            admin_role_ids: parse_admin_role_ids(
                &std::env::var("DISCORD_ADMIN_ROLE_IDS").unwrap_or_default(),
            ),
            api_base: optional("DISCORD_API_BASE", DEFAULT_DISCORD_API_BASE),
        };

        let tokens = TokenConfig {
            signing_key: require("GUILDPOLL_SIGNING_KEY")?,
            issuer: optional("GUILDPOLL_JWT_ISSUER", "guildpoll"),
            audience: optional("GUILDPOLL_JWT_AUDIENCE", "guildpoll"),
            session_expiry_minutes: parse_minutes(
                "GUILDPOLL_SESSION_EXPIRY_MINUTES",
                DEFAULT_SESSION_EXPIRY_MINUTES,
            )?,
            login_link_expiry_minutes: parse_minutes(
                "GUILDPOLL_LOGIN_LINK_EXPIRY_MINUTES",
                DEFAULT_LOGIN_LINK_EXPIRY_MINUTES,
            )?,
        };

        Ok(Self {
            listen_addr: optional("GUILDPOLL_LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            app_base_url: require_url("GUILDPOLL_APP_BASE_URL")?,
            discord,
            tokens,
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} environment variable must be set"))
}

fn require_url(name: &str) -> Result<String> {
    let raw = require(name)?;
    Url::parse(&raw).with_context(|| format!("{name} must be a valid URL"))?;
    Ok(raw)
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_minutes(name: &str, default: i64) -> Result<i64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("{name} must be a whole number of minutes")),
        Err(_) => Ok(default),
    }
}

/// Admin role ids arrive as a comma-separated list.
fn parse_admin_role_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admin_role_ids() {
        assert_eq!(
            parse_admin_role_ids("123, 456,789"),
            vec!["123".to_string(), "456".to_string(), "789".to_string()]
        );
        assert!(parse_admin_role_ids("").is_empty());
        assert!(parse_admin_role_ids(" , ,").is_empty());
    }

    #[test]
    fn test_require_url_rejects_garbage() {
        unsafe {
            std::env::set_var("TEST_URL_GOOD", "https://app.test");
            std::env::set_var("TEST_URL_BAD", "not a url");
        }

        assert_eq!(require_url("TEST_URL_GOOD").unwrap(), "https://app.test");
        assert!(require_url("TEST_URL_BAD").is_err());
        assert!(require_url("TEST_URL_UNSET").is_err());

        unsafe {
            std::env::remove_var("TEST_URL_GOOD");
            std::env::remove_var("TEST_URL_BAD");
        }
    }

    #[test]
    fn test_parse_minutes_default_and_override() {
        unsafe {
            std::env::remove_var("TEST_MINUTES_UNSET");
            std::env::set_var("TEST_MINUTES_SET", "15");
            std::env::set_var("TEST_MINUTES_BAD", "soon");
        }

        assert_eq!(parse_minutes("TEST_MINUTES_UNSET", 5).unwrap(), 5);
        assert_eq!(parse_minutes("TEST_MINUTES_SET", 5).unwrap(), 15);
        assert!(parse_minutes("TEST_MINUTES_BAD", 5).is_err());

        unsafe {
            std::env::remove_var("TEST_MINUTES_SET");
            std::env::remove_var("TEST_MINUTES_BAD");
        }
    }
}
