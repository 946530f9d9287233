//! Profile store adapter: typed read/write access over the profiles table.

use crate::common::models::{split_skill_list, Profile, ProfileUpdate};
use crate::server::database::Database;
use crate::server::error::CoreError;
use chrono::NaiveDate;
use log::info;
use sqlx::Row;
use std::sync::Arc;

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Profile {
    let skills: String = row.get("skills");
    let commitment: String = row.get("commitment");
    Profile {
        id: row.get("id"),
        name: row.get("name"),
        skills: serde_json::from_str(&skills).unwrap_or_default(),
        availability: row.get::<Option<NaiveDate>, _>("availability"),
        commitment: serde_json::from_str(&commitment).unwrap_or_default(),
    }
}

pub async fn get_profile(db: Arc<Database>, id: &str) -> Result<Profile, CoreError> {
    let row = sqlx::query("SELECT id, name, skills, availability, commitment FROM profiles WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await?;
    row.map(|r| profile_from_row(&r)).ok_or(CoreError::NotFound("profile"))
}

pub async fn list_profiles(db: Arc<Database>) -> Result<Vec<Profile>, CoreError> {
    let rows = sqlx::query("SELECT id, name, skills, availability, commitment FROM profiles ORDER BY updated_at DESC, id")
        .fetch_all(&db.pool)
        .await?;
    Ok(rows.iter().map(profile_from_row).collect())
}

/// Creates or replaces the caller's own profile. The id is always the
/// caller's user id, which is what keeps profiles owner-mutable only.
pub async fn upsert_profile(
    db: Arc<Database>,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<Profile, CoreError> {
    let skills = split_skill_list(&update.skills);
    let skills_json = serde_json::to_string(&skills).unwrap_or_else(|_| "[]".to_string());
    let commitment_json = serde_json::to_string(&update.commitment).unwrap_or_else(|_| "[]".to_string());
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO profiles (id, name, skills, availability, commitment, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           name = excluded.name, skills = excluded.skills, \
           availability = excluded.availability, commitment = excluded.commitment, \
           updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(&update.name)
    .bind(&skills_json)
    .bind(update.availability)
    .bind(&commitment_json)
    .bind(now)
    .execute(&db.pool)
    .await?;

    info!("[PROFILES] Saved profile for user {}", user_id);
    Ok(Profile {
        id: user_id.to_string(),
        name: update.name,
        skills,
        availability: update.availability,
        commitment: update.commitment,
    })
}
