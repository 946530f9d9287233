use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::CoreError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use log::{info, warn};
use rand::RngCore;
use sqlx::Row;
use std::sync::Arc;

/// Outcome of a successful register or login.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user_id: String,
    pub username: String,
    pub session_token: String,
}

fn hash_password(password: &str, salt_length: u32) -> String {
    let mut salt_bytes = vec![0u8; salt_length as usize];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).unwrap();
    let argon2 = Argon2::default();
    argon2.hash_password(password.as_bytes(), &salt).unwrap().to_string()
}

fn verify_password(hash: &str, password: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok()
}

fn generate_session_token() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    format!("{}-{:x}", uuid, md5::compute(random))
}

pub async fn register(
    db: Arc<Database>,
    username: &str,
    password: &str,
    config: &ServerConfig,
) -> Result<SessionInfo, CoreError> {
    info!("[AUTH] Register attempt: {}", username);
    if username.trim().is_empty() || password.is_empty() {
        return Err(CoreError::precondition("username and password are required"));
    }
    let user_id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().timestamp();
    let password_hash = hash_password(password, config.argon2_salt_length);

    let mut tx = db.pool.begin().await?;
    let res = sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(username)
        .bind(created_at)
        .execute(&mut *tx)
        .await;
    if let Err(e) = res {
        warn!("[AUTH] Registration failed for {}: {}", username, e);
        if CoreError::is_unique_violation(&e) {
            return Err(CoreError::precondition("username already used"));
        }
        return Err(e.into());
    }
    sqlx::query("INSERT INTO auth (user_id, password_hash) VALUES (?, ?)")
        .bind(&user_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;

    // A fresh session right after registration, as after a login.
    let session_token = generate_session_token();
    let now = chrono::Utc::now().timestamp();
    let expires = now + 60 * 60 * 24 * config.session_expiry_days as i64;
    sqlx::query("INSERT INTO sessions (user_id, session_token, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&session_token)
        .bind(now)
        .bind(expires)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO session_events (user_id, event_type, created_at) VALUES (?, 'login_success', ?)")
        .bind(&user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("[AUTH] Registered user {} (id={})", username, user_id);
    Ok(SessionInfo { user_id, username: username.to_string(), session_token })
}

pub async fn login(
    db: Arc<Database>,
    username: &str,
    password: &str,
    config: &ServerConfig,
) -> Result<SessionInfo, CoreError> {
    info!("[AUTH] Login attempt: {}", username);
    let row = sqlx::query("SELECT users.id, password_hash FROM users JOIN auth ON users.id = auth.user_id WHERE username = ?")
        .bind(username)
        .fetch_optional(&db.pool)
        .await?;
    let row = row.ok_or(CoreError::NotFound("user"))?;
    let user_id: String = row.get("id");
    let password_hash: String = row.get("password_hash");
    if !verify_password(&password_hash, password) {
        warn!("[AUTH] Login failed for {}: wrong password", username);
        return Err(CoreError::precondition("wrong password"));
    }

    // Single-session semantics: replace any existing sessions atomically.
    let mut tx = db.pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&user_id)
        .execute(&mut *tx)
        .await?;
    let session_token = generate_session_token();
    let now = chrono::Utc::now().timestamp();
    let expires = now + 60 * 60 * 24 * config.session_expiry_days as i64;
    sqlx::query("INSERT INTO sessions (user_id, session_token, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&session_token)
        .bind(now)
        .bind(expires)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO session_events (user_id, event_type, created_at) VALUES (?, 'login_success', ?)")
        .bind(&user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("[AUTH] Login success for {} (id={})", username, user_id);
    Ok(SessionInfo { user_id, username: username.to_string(), session_token })
}

/// Removes every session of the token's owner (logout from all devices).
pub async fn logout(db: Arc<Database>, session_token: &str) -> Result<(), CoreError> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE session_token = ?")
        .bind(session_token)
        .fetch_optional(&db.pool)
        .await?;
    let row = row.ok_or(CoreError::NotFound("session"))?;
    let user_id: String = row.get("user_id");

    let res = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&user_id)
        .execute(&db.pool)
        .await?;
    info!("[AUTH] Deleted {} session rows for user {}", res.rows_affected(), user_id);

    record_session_event(db, &user_id, "logout").await;
    Ok(())
}

/// Appends a row to the session audit trail. Audit writes never fail the
/// surrounding operation, a miss is only logged.
pub async fn record_session_event(db: Arc<Database>, user_id: &str, event_type: &str) {
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = sqlx::query("INSERT INTO session_events (user_id, event_type, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(event_type)
        .bind(now)
        .execute(&db.pool)
        .await
    {
        warn!("[AUTH] Failed to record {} event for {}: {}", event_type, user_id, e);
    }
}

/// The identity resolver every entry point goes through: a valid,
/// unexpired token maps to its user id, anything else to None.
pub async fn validate_session(db: Arc<Database>, session_token: &str) -> Option<String> {
    let now = chrono::Utc::now().timestamp();
    let row = sqlx::query("SELECT user_id FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now)
        .fetch_optional(&db.pool)
        .await
        .ok()?;
    row.map(|r| r.get::<String, _>("user_id"))
}

/// Removes expired sessions. Idempotent, safe to run periodically.
pub async fn cleanup_expired_sessions(db: Arc<Database>) {
    let now = chrono::Utc::now().timestamp();
    match sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(&db.pool)
        .await
    {
        Ok(res) => info!("[AUTH] Cleaned up {} expired sessions", res.rows_affected()),
        Err(e) => warn!("[AUTH] Failed to cleanup sessions: {}", e),
    }
}
