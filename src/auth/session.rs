//! Signed session credentials.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::crypto::TokenSigner;
use crate::repository::models::MemberRecord;

/// Claim set embedded in a signed session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Member id
    pub sub: String,
    #[serde(rename = "communityId")]
    pub community_id: String,
    pub platform: String,
    #[serde(rename = "externalUserId")]
    pub external_user_id: String,
    pub name: String,
    /// "true" / "false"
    #[serde(rename = "isAdmin")]
    pub is_admin: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted session. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedSession {
    pub member_id: String,
    pub community_id: String,
    pub external_user_id: String,
    pub platform: String,
    pub display_name: String,
    pub is_admin: bool,
    pub expires_at: i64,
}

/// Turns a resolved member plus an admin determination into a signed
/// session token. No side effects, no I/O; only the clock and the signing
/// key beyond its arguments.
pub struct SessionIssuer {
    signer: TokenSigner,
    session_expiry_minutes: i64,
}

impl SessionIssuer {
    pub fn new(signer: TokenSigner, session_expiry_minutes: i64) -> Self {
        Self {
            signer,
            session_expiry_minutes,
        }
    }

    pub fn issue(
        &self,
        member: &MemberRecord,
        is_admin: bool,
    ) -> Result<(String, AuthenticatedSession)> {
        let now = Utc::now().timestamp();
        let expires_at = now + self.session_expiry_minutes * 60;

        let claims = SessionClaims {
            sub: member.id.clone(),
            community_id: member.community_id.clone(),
            platform: member.platform.clone(),
            external_user_id: member.external_user_id.clone(),
            name: member.display_name.clone(),
            is_admin: if is_admin { "true" } else { "false" }.to_string(),
            iss: self.signer.issuer().to_string(),
            aud: self.signer.audience().to_string(),
            iat: now,
            exp: expires_at,
        };

        let token = self.signer.sign(&claims)?;

        Ok((
            token,
            AuthenticatedSession {
                member_id: member.id.clone(),
                community_id: member.community_id.clone(),
                external_user_id: member.external_user_id.clone(),
                platform: member.platform.clone(),
                display_name: member.display_name.clone(),
                is_admin,
                expires_at,
            },
        ))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        self.signer.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PLATFORM_DISCORD;
    use crate::config::TokenConfig;

    fn issuer() -> SessionIssuer {
        let config = TokenConfig {
            signing_key: "test-signing-key".to_string(),
            issuer: "guildpoll".to_string(),
            audience: "guildpoll".to_string(),
            session_expiry_minutes: 60,
            login_link_expiry_minutes: 5,
        };
        SessionIssuer::new(TokenSigner::new(&config), config.session_expiry_minutes)
    }

    fn member() -> MemberRecord {
        MemberRecord {
            id: "mem1".to_string(),
            community_id: "com1".to_string(),
            platform: PLATFORM_DISCORD.to_string(),
            external_user_id: "u1".to_string(),
            display_name: "Someone".to_string(),
            role_ids: "[]".to_string(),
            joined_at: None,
            banned: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_issue_embeds_member_claims() {
        let issuer = issuer();
        let (token, session) = issuer.issue(&member(), true).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "mem1");
        assert_eq!(claims.community_id, "com1");
        assert_eq!(claims.platform, PLATFORM_DISCORD);
        assert_eq!(claims.external_user_id, "u1");
        assert_eq!(claims.name, "Someone");
        assert_eq!(claims.is_admin, "true");
        assert_eq!(claims.exp, session.expires_at);
        assert_eq!(claims.exp - claims.iat, 60 * 60);
        assert!(session.is_admin);
    }

    #[test]
    fn test_non_admin_claim_is_false_string() {
        let issuer = issuer();
        let (token, session) = issuer.issue(&member(), false).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.is_admin, "false");
        assert!(!session.is_admin);
    }
}
