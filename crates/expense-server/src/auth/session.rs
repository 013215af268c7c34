use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::db::{self, DbPool, TIMESTAMP_FORMAT};
use crate::error::{AppError, AppResult};
use crate::models::{Identity, Session, User, USER_COLUMNS};

type HmacSha256 = Hmac<Sha256>;

/// Issue a session for `user`, recording the role it was issued under.
pub fn create_session(
    pool: &DbPool,
    secret: &str,
    user: &User,
    ttl_minutes: i64,
) -> AppResult<Session> {
    let conn = pool.get()?;
    let id = Uuid::new_v4().to_string();
    let token = generate_token();
    let now = db::timestamp();
    let expires_at = (Utc::now() + Duration::minutes(ttl_minutes))
        .format(TIMESTAMP_FORMAT)
        .to_string();

    // Clean up expired sessions while we're here
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        rusqlite::params![now],
    )?;

    conn.execute(
        "INSERT INTO sessions (id, user_id, token_hash, role, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, user.id, token_digest(secret, &token)?, user.role, expires_at, now],
    )?;

    Ok(Session {
        id,
        user_id: user.id.clone(),
        role: user.role,
        token,
        expires_at,
        created_at: now,
    })
}

/// Resolve a session token to the caller. A session whose recorded role no longer
/// matches the account's role is treated as absent.
pub fn validate_session(pool: &DbPool, secret: &str, token: &str) -> AppResult<(Identity, User)> {
    let conn = pool.get()?;
    let now = db::timestamp();

    let result = conn.query_row(
        &format!(
            "SELECT {USER_COLUMNS}
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?1 AND s.expires_at > ?2 AND s.role = u.role"
        ),
        rusqlite::params![token_digest(secret, token)?, now],
        User::from_row,
    );

    match result {
        Ok(user) => Ok((Identity::from(&user), user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(AppError::Unauthenticated),
        Err(e) => Err(AppError::Database(e)),
    }
}

pub fn current_user(pool: &DbPool, secret: &str, token: &str) -> AppResult<Option<User>> {
    match validate_session(pool, secret, token) {
        Ok((_, user)) => Ok(Some(user)),
        Err(AppError::Unauthenticated) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Unknown or already-deleted tokens are not an error.
pub fn delete_session(pool: &DbPool, secret: &str, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        rusqlite::params![token_digest(secret, token)?],
    )?;
    Ok(())
}

fn token_digest(secret: &str, token: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid session secret: {e}")))?;
    mac.update(token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn generate_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    use rand::RngCore;
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
