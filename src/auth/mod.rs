//! Discord authentication and session bootstrap
//!
//! Exchanges an OAuth authorization code for identity facts, maintains the
//! local member ledger, issues and redeems one-time login links for the
//! guild bot, and mints signed session tokens.

pub mod crypto;
pub mod discord;
pub mod login_link;
pub mod session;

pub use discord::DiscordAuthClient;
pub use login_link::{ConsumeOutcome, DenialReason, IssuedLink, LoginLinkService, LoginOutcome};
pub use session::{AuthenticatedSession, SessionClaims, SessionIssuer};

use serde::{Deserialize, Serialize};

/// Platform tag recorded on every community and member row.
pub const PLATFORM_DISCORD: &str = "discord";

/// Identity facts about one external user, learned from the provider or
/// supplied by the bot for a login that starts outside the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub platform: String,
    pub external_user_id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Unix seconds the user joined the tracked guild, when known
    #[serde(default)]
    pub guild_joined_at: Option<i64>,
    #[serde(default)]
    pub role_ids: Vec<String>,
    #[serde(default)]
    pub is_guild_member: bool,
}

impl ExternalIdentity {
    /// Name to store and display: the guild display name when set,
    /// otherwise the account username.
    pub fn display_label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}
