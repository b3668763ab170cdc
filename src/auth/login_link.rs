//! One-time login links
//!
//! A login link lets a channel that cannot perform a browser redirect (the
//! guild bot) hand a member a URL that bootstraps a session exactly once.
//! Issuing supersedes every earlier active link for the member; redemption
//! is a one-shot transition enforced by a conditional update.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use sqlx::SqlitePool;

use super::ExternalIdentity;
use super::crypto;
use super::session::{AuthenticatedSession, SessionIssuer};
use crate::config::{DiscordConfig, TokenConfig};
use crate::repository::db as ledger;
use crate::repository::models::{LoginTokenRecord, LoginTokenState, MemberRecord};

/// Path under the app base URL that redeems a login link.
const REDEEM_PATH: &str = "/api/auth/discord-link";

const MIN_LINK_EXPIRY_MINUTES: i64 = 1;
const MAX_LINK_EXPIRY_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub url: String,
    pub expires_at: i64,
}

/// Outcome of redeeming a login link. Denials are values, not errors;
/// only provider/persistence faults surface as `Err`.
#[derive(Debug)]
pub enum ConsumeOutcome {
    Granted {
        token: String,
        session: AuthenticatedSession,
    },
    Denied(DenialReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    MissingToken,
    UnknownToken,
    AlreadyUsed,
    Expired,
    Banned,
}

impl DenialReason {
    /// Reason string for the audit log. The HTTP layer renders one generic
    /// failure page regardless, so token state cannot be probed.
    pub fn reason(&self) -> &'static str {
        match self {
            DenialReason::MissingToken => "missing token",
            DenialReason::UnknownToken => "login link is invalid",
            DenialReason::AlreadyUsed => "already used",
            DenialReason::Expired => "expired",
            DenialReason::Banned => "member is banned",
        }
    }
}

/// Outcome of a direct web login, which skips the link step entirely.
#[derive(Debug)]
pub enum LoginOutcome {
    Granted {
        token: String,
        session: AuthenticatedSession,
    },
    Banned,
}

pub struct LoginLinkService {
    pool: SqlitePool,
    discord: DiscordConfig,
    link_expiry_minutes: i64,
    issuer: SessionIssuer,
}

impl LoginLinkService {
    pub fn new(
        pool: SqlitePool,
        discord: DiscordConfig,
        tokens: &TokenConfig,
        issuer: SessionIssuer,
    ) -> Self {
        Self {
            pool,
            discord,
            link_expiry_minutes: tokens.login_link_expiry_minutes,
            issuer,
        }
    }

    /// Issue a fresh single-use login link for the identity, revoking every
    /// link the member still has outstanding. The whole sequence commits as
    /// one transaction: a redeem that starts after this returns can never
    /// accept a link this call superseded.
    pub async fn issue_link(
        &self,
        identity: &ExternalIdentity,
        app_base_url: &str,
    ) -> Result<IssuedLink> {
        if identity.external_user_id.is_empty() {
            bail!("identity is missing an external user id");
        }
        if app_base_url.trim().is_empty() {
            bail!("app base URL must not be empty");
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        ledger::prune_stale_tokens(&mut tx, now).await?;

        let member = self.resolve_member(&mut tx, identity, now).await?;

        let superseded = ledger::revoke_active_tokens(&mut tx, &member.id, now).await?;
        if superseded > 0 {
            tracing::info!(member_id = %member.id, superseded, "revoked outstanding login links");
        }

        let secret = crypto::encode_secret(&crypto::generate_secret());
        let expiry_minutes = self
            .link_expiry_minutes
            .clamp(MIN_LINK_EXPIRY_MINUTES, MAX_LINK_EXPIRY_MINUTES);
        let expires_at = now + expiry_minutes * 60;

        ledger::insert_login_token(
            &mut tx,
            &LoginTokenRecord {
                id: cuid2::create_id(),
                member_id: member.id.clone(),
                secret_hash: crypto::hash_secret(&secret),
                created_at: now,
                expires_at,
                used_at: None,
                revoked_at: None,
            },
        )
        .await
        .context("failed to store login token")?;

        tx.commit()
            .await
            .context("failed to commit login link issuance")?;

        Ok(IssuedLink {
            url: build_redeem_url(app_base_url, &secret),
            expires_at,
        })
    }

    /// Redeem a login link. At most one caller ever succeeds per secret;
    /// the conditional update in `mark_token_used` is the arbiter.
    pub async fn consume(&self, raw_secret: &str) -> Result<ConsumeOutcome> {
        if raw_secret.trim().is_empty() {
            return Ok(ConsumeOutcome::Denied(DenialReason::MissingToken));
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        ledger::prune_stale_tokens(&mut tx, now).await?;

        let hash = crypto::hash_secret(raw_secret);
        let Some((token, member)) = ledger::find_token_by_hash(&mut tx, &hash).await? else {
            tx.commit().await?;
            return Ok(ConsumeOutcome::Denied(DenialReason::UnknownToken));
        };

        match token.state(now) {
            LoginTokenState::Used(_) | LoginTokenState::Revoked(_) => {
                tx.commit().await?;
                return Ok(ConsumeOutcome::Denied(DenialReason::AlreadyUsed));
            }
            LoginTokenState::Expired => {
                tx.commit().await?;
                return Ok(ConsumeOutcome::Denied(DenialReason::Expired));
            }
            LoginTokenState::Active => {}
        }

        // The write is the guard: a concurrent redeemer that lost the race
        // sees zero rows affected here.
        if !ledger::mark_token_used(&mut tx, &token.id, now).await? {
            tx.commit().await?;
            return Ok(ConsumeOutcome::Denied(DenialReason::AlreadyUsed));
        }

        tx.commit()
            .await
            .context("failed to commit token redemption")?;

        if member.banned {
            // The link is burned either way.
            return Ok(ConsumeOutcome::Denied(DenialReason::Banned));
        }

        let is_admin = member.is_admin(&self.discord.admin_role_ids);
        let (signed, session) = self.issuer.issue(&member, is_admin)?;

        Ok(ConsumeOutcome::Granted {
            token: signed,
            session,
        })
    }

    /// Direct web login: upsert the member and mint a session with no token
    /// row involved.
    pub async fn login(&self, identity: &ExternalIdentity) -> Result<LoginOutcome> {
        if identity.external_user_id.is_empty() {
            bail!("identity is missing an external user id");
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        ledger::prune_stale_tokens(&mut tx, now).await?;
        let member = self.resolve_member(&mut tx, identity, now).await?;

        tx.commit().await.context("failed to commit member upsert")?;

        if member.banned {
            return Ok(LoginOutcome::Banned);
        }

        let is_admin = member.is_admin(&self.discord.admin_role_ids);
        let (token, session) = self.issuer.issue(&member, is_admin)?;

        Ok(LoginOutcome::Granted { token, session })
    }

    async fn resolve_member(
        &self,
        conn: &mut sqlx::SqliteConnection,
        identity: &ExternalIdentity,
        now: i64,
    ) -> Result<MemberRecord> {
        let community = ledger::get_or_create_community(
            &mut *conn,
            &identity.platform,
            &self.discord.guild_id,
            &self.discord.guild_id,
            now,
        )
        .await
        .context("failed to resolve community")?;

        let member = ledger::upsert_member(&mut *conn, &community.id, identity, now)
            .await
            .context("failed to upsert member")?;

        Ok(member)
    }
}

fn build_redeem_url(app_base_url: &str, secret: &str) -> String {
    let base = app_base_url.trim_end_matches('/');
    format!("{base}{REDEEM_PATH}?token={}", urlencoding::encode(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_redeem_url_strips_trailing_slashes() {
        assert_eq!(
            build_redeem_url("https://app.test/", "s3cret"),
            "https://app.test/api/auth/discord-link?token=s3cret"
        );
        assert_eq!(
            build_redeem_url("https://app.test", "s3cret"),
            "https://app.test/api/auth/discord-link?token=s3cret"
        );
    }

    #[test]
    fn test_denial_reasons_match_audit_strings() {
        assert_eq!(DenialReason::MissingToken.reason(), "missing token");
        assert_eq!(DenialReason::UnknownToken.reason(), "login link is invalid");
        assert_eq!(DenialReason::AlreadyUsed.reason(), "already used");
        assert_eq!(DenialReason::Expired.reason(), "expired");
        assert_eq!(DenialReason::Banned.reason(), "member is banned");
    }
}
