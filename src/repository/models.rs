use serde::Serialize;

/// One tracked external guild.
#[derive(Clone, Debug, sqlx::FromRow, Serialize)]
pub struct CommunityRecord {
    pub id: String,
    pub platform: String,
    pub external_community_id: String,
    pub display_name: String,
    pub created_at: i64,
}

/// One person within one community. Created on first sight of an external
/// user, refreshed on every subsequent sign-in.
#[derive(Clone, Debug, sqlx::FromRow, Serialize)]
pub struct MemberRecord {
    pub id: String,
    pub community_id: String,
    pub platform: String,
    pub external_user_id: String,
    pub display_name: String,
    /// JSON array of external role ids
    pub role_ids: String,
    pub joined_at: Option<i64>,
    pub banned: bool,
    pub created_at: i64,
}

impl MemberRecord {
    /// Decoded role-id set. Malformed stored JSON is an empty set, not an
    /// error.
    pub fn role_id_set(&self) -> Vec<String> {
        serde_json::from_str(&self.role_ids).unwrap_or_default()
    }

    pub fn is_admin(&self, admin_role_ids: &[String]) -> bool {
        self.role_id_set()
            .iter()
            .any(|role| admin_role_ids.contains(role))
    }
}

/// A single-use bearer secret bound to one member. Only the secret's hash
/// is ever stored.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct LoginTokenRecord {
    pub id: String,
    pub member_id: String,
    pub secret_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub used_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

/// Token status derived from the stored timestamps. Call sites branch on
/// this, never on the raw nullable columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginTokenState {
    Active,
    Used(i64),
    Revoked(i64),
    Expired,
}

impl LoginTokenRecord {
    pub fn state(&self, now: i64) -> LoginTokenState {
        if let Some(at) = self.used_at {
            return LoginTokenState::Used(at);
        }
        if let Some(at) = self.revoked_at {
            return LoginTokenState::Revoked(at);
        }
        if self.expires_at <= now {
            return LoginTokenState::Expired;
        }
        LoginTokenState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64, used_at: Option<i64>, revoked_at: Option<i64>) -> LoginTokenRecord {
        LoginTokenRecord {
            id: "tok1".to_string(),
            member_id: "mem1".to_string(),
            secret_hash: "hash".to_string(),
            created_at: 0,
            expires_at,
            used_at,
            revoked_at,
        }
    }

    #[test]
    fn test_token_state_derivation() {
        assert_eq!(token(100, None, None).state(50), LoginTokenState::Active);
        assert_eq!(token(100, None, None).state(100), LoginTokenState::Expired);
        assert_eq!(token(100, None, None).state(150), LoginTokenState::Expired);
        assert_eq!(token(100, Some(60), None).state(50), LoginTokenState::Used(60));
        assert_eq!(
            token(100, None, Some(70)).state(50),
            LoginTokenState::Revoked(70)
        );
        // used-at wins over a lapsed expiry
        assert_eq!(
            token(100, Some(60), None).state(150),
            LoginTokenState::Used(60)
        );
    }

    fn member(role_ids: &str) -> MemberRecord {
        MemberRecord {
            id: "mem1".to_string(),
            community_id: "com1".to_string(),
            platform: "discord".to_string(),
            external_user_id: "u1".to_string(),
            display_name: "someone".to_string(),
            role_ids: role_ids.to_string(),
            joined_at: None,
            banned: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_malformed_role_ids_decode_to_empty_set() {
        assert!(member("not json").role_id_set().is_empty());
        assert!(member("{\"a\":1}").role_id_set().is_empty());
        assert_eq!(
            member("[\"r1\",\"r2\"]").role_id_set(),
            vec!["r1".to_string(), "r2".to_string()]
        );
    }

    #[test]
    fn test_is_admin_requires_role_intersection() {
        let admin_roles = vec!["admin-role".to_string()];
        assert!(member("[\"admin-role\",\"other\"]").is_admin(&admin_roles));
        assert!(!member("[\"other\"]").is_admin(&admin_roles));
        assert!(!member("[]").is_admin(&admin_roles));
        assert!(!member("[\"admin-role\"]").is_admin(&[]));
    }
}
