//! Atomic persistence operations over communities, members and login
//! tokens.
//!
//! Every function takes a `&mut SqliteConnection` so the caller decides the
//! transaction scope; the login-link service runs its whole issue/redeem
//! sequence inside one transaction. Mutations that guard a state transition
//! express the guard in the UPDATE itself and report `rows_affected`.

use sqlx::SqliteConnection;

use super::models::{CommunityRecord, LoginTokenRecord, MemberRecord};
use crate::auth::ExternalIdentity;

/// Spent or lapsed tokens are kept for this long before hard deletion.
const STALE_TOKEN_GRACE_SECS: i64 = 24 * 60 * 60;

const MEMBER_COLUMNS: &str = "id, community_id, platform, external_user_id, display_name, \
     role_ids, joined_at, banned, created_at";

const TOKEN_COLUMNS: &str =
    "id, member_id, secret_hash, created_at, expires_at, used_at, revoked_at";

/// Idempotent on (platform, external_community_id).
pub async fn get_or_create_community(
    conn: &mut SqliteConnection,
    platform: &str,
    external_community_id: &str,
    default_name: &str,
    now: i64,
) -> Result<CommunityRecord, sqlx::Error> {
    sqlx::query(
        "INSERT INTO communities (id, platform, external_community_id, display_name, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (platform, external_community_id) DO NOTHING",
    )
    .bind(cuid2::create_id())
    .bind(platform)
    .bind(external_community_id)
    .bind(default_name)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, CommunityRecord>(
        "SELECT id, platform, external_community_id, display_name, created_at
         FROM communities WHERE platform = ? AND external_community_id = ?",
    )
    .bind(platform)
    .bind(external_community_id)
    .fetch_one(&mut *conn)
    .await
}

/// Create the member on first sight, or refresh display name and role set
/// unconditionally. `joined_at` is only overwritten when the identity
/// supplies one; the banned flag is never touched here.
pub async fn upsert_member(
    conn: &mut SqliteConnection,
    community_id: &str,
    identity: &ExternalIdentity,
    now: i64,
) -> Result<MemberRecord, sqlx::Error> {
    let role_ids =
        serde_json::to_string(&identity.role_ids).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        "INSERT INTO community_members
            (id, community_id, platform, external_user_id, display_name, role_ids, joined_at, banned, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
         ON CONFLICT (community_id, platform, external_user_id) DO UPDATE SET
            display_name = excluded.display_name,
            role_ids = excluded.role_ids,
            joined_at = COALESCE(excluded.joined_at, community_members.joined_at)",
    )
    .bind(cuid2::create_id())
    .bind(community_id)
    .bind(&identity.platform)
    .bind(&identity.external_user_id)
    .bind(identity.display_label())
    .bind(&role_ids)
    .bind(identity.guild_joined_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, MemberRecord>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM community_members
         WHERE community_id = ? AND platform = ? AND external_user_id = ?"
    ))
    .bind(community_id)
    .bind(&identity.platform)
    .bind(&identity.external_user_id)
    .fetch_one(&mut *conn)
    .await
}

/// Look up a token and its owning member by secret hash.
pub async fn find_token_by_hash(
    conn: &mut SqliteConnection,
    secret_hash: &str,
) -> Result<Option<(LoginTokenRecord, MemberRecord)>, sqlx::Error> {
    let token = sqlx::query_as::<_, LoginTokenRecord>(&format!(
        "SELECT {TOKEN_COLUMNS} FROM login_tokens WHERE secret_hash = ?"
    ))
    .bind(secret_hash)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(token) = token else {
        return Ok(None);
    };

    let member = sqlx::query_as::<_, MemberRecord>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM community_members WHERE id = ?"
    ))
    .bind(&token.member_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some((token, member)))
}

/// The unique index on secret_hash turns an issuance collision into an
/// insert failure.
pub async fn insert_login_token(
    conn: &mut SqliteConnection,
    token: &LoginTokenRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO login_tokens (id, member_id, secret_hash, created_at, expires_at, used_at, revoked_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&token.id)
    .bind(&token.member_id)
    .bind(&token.secret_hash)
    .bind(token.created_at)
    .bind(token.expires_at)
    .bind(token.used_at)
    .bind(token.revoked_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Revoke every currently-active token for the member in one UPDATE.
/// Returns the number of tokens superseded.
pub async fn revoke_active_tokens(
    conn: &mut SqliteConnection,
    member_id: &str,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE login_tokens SET revoked_at = ?
         WHERE member_id = ? AND used_at IS NULL AND revoked_at IS NULL AND expires_at > ?",
    )
    .bind(now)
    .bind(member_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// The single authoritative transition to Used. The guard lives in the
/// WHERE clause; under concurrent redemption exactly one caller observes
/// `true` and everyone else `false`.
pub async fn mark_token_used(
    conn: &mut SqliteConnection,
    token_id: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE login_tokens SET used_at = ?
         WHERE id = ? AND used_at IS NULL AND revoked_at IS NULL AND expires_at > ?",
    )
    .bind(now)
    .bind(token_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Hard-delete token rows whose expiry, use or revocation is more than
/// 24 hours in the past. Returns the number of rows deleted.
pub async fn prune_stale_tokens(
    conn: &mut SqliteConnection,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let cutoff = now - STALE_TOKEN_GRACE_SECS;
    let result = sqlx::query(
        "DELETE FROM login_tokens
         WHERE expires_at < ?
            OR (used_at IS NOT NULL AND used_at < ?)
            OR (revoked_at IS NOT NULL AND revoked_at < ?)",
    )
    .bind(cutoff)
    .bind(cutoff)
    .bind(cutoff)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn active_tokens_for_member(
    conn: &mut SqliteConnection,
    member_id: &str,
    now: i64,
) -> Result<Vec<LoginTokenRecord>, sqlx::Error> {
    sqlx::query_as::<_, LoginTokenRecord>(&format!(
        "SELECT {TOKEN_COLUMNS} FROM login_tokens
         WHERE member_id = ? AND used_at IS NULL AND revoked_at IS NULL AND expires_at > ?
         ORDER BY created_at"
    ))
    .bind(member_id)
    .bind(now)
    .fetch_all(&mut *conn)
    .await
}
