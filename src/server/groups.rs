//! Group and membership store adapter.

use crate::common::models::{split_skill_list, Group, NewGroup};
use crate::server::database::Database;
use crate::server::error::CoreError;
use log::info;
use sqlx::Row;
use std::sync::Arc;

fn group_from_row(row: &sqlx::sqlite::SqliteRow) -> Group {
    let required: String = row.get("required_skills");
    Group {
        id: row.get("id"),
        name: row.get("name"),
        project_description: row.get("project_description"),
        required_skills: serde_json::from_str(&required).unwrap_or_default(),
        owner_id: row.get("owner_id"),
    }
}

pub async fn create_group(db: Arc<Database>, owner_id: &str, new: NewGroup) -> Result<Group, CoreError> {
    if new.name.trim().is_empty() {
        return Err(CoreError::precondition("group name is required"));
    }
    if new.project_description.trim().is_empty() {
        return Err(CoreError::precondition("project description is required"));
    }
    let group_id = uuid::Uuid::new_v4().to_string();
    let required_skills = split_skill_list(&new.required_skills);
    let required_json = serde_json::to_string(&required_skills).unwrap_or_else(|_| "[]".to_string());
    let created_at = chrono::Utc::now().timestamp();

    // The creator becomes the immutable owner but not a member; members
    // only ever come out of accepted invitations.
    sqlx::query(
        "INSERT INTO groups (id, name, project_description, required_skills, owner_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&group_id)
    .bind(&new.name)
    .bind(&new.project_description)
    .bind(&required_json)
    .bind(owner_id)
    .bind(created_at)
    .execute(&db.pool)
    .await?;

    info!("[GROUPS] Group '{}' created with id {} by {}", new.name, group_id, owner_id);
    Ok(Group {
        id: group_id,
        name: new.name,
        project_description: new.project_description,
        required_skills,
        owner_id: owner_id.to_string(),
    })
}

pub async fn get_group(db: Arc<Database>, group_id: &str) -> Result<Group, CoreError> {
    let row = sqlx::query("SELECT id, name, project_description, required_skills, owner_id FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(&db.pool)
        .await?;
    row.map(|r| group_from_row(&r)).ok_or(CoreError::NotFound("group"))
}

pub async fn list_groups(db: Arc<Database>) -> Result<Vec<Group>, CoreError> {
    let rows = sqlx::query("SELECT id, name, project_description, required_skills, owner_id FROM groups ORDER BY created_at, id")
        .fetch_all(&db.pool)
        .await?;
    Ok(rows.iter().map(group_from_row).collect())
}

/// Membership creation. The (group_id, user_id) primary key turns a
/// repeated insert into a typed `Duplicate` instead of a second row.
pub async fn add_member(db: Arc<Database>, group_id: &str, user_id: &str) -> Result<(), CoreError> {
    let joined_at = chrono::Utc::now().timestamp();
    let res = sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(group_id)
        .bind(user_id)
        .bind(joined_at)
        .execute(&db.pool)
        .await;
    match res {
        Ok(_) => {
            info!("[GROUPS] User {} joined group {}", user_id, group_id);
            Ok(())
        }
        Err(e) if CoreError::is_unique_violation(&e) => Err(CoreError::Duplicate),
        Err(e) => Err(e.into()),
    }
}

pub async fn group_members(db: Arc<Database>, group_id: &str) -> Result<Vec<String>, CoreError> {
    let rows = sqlx::query(
        "SELECT u.username FROM group_members gm JOIN users u ON gm.user_id = u.id \
         WHERE gm.group_id = ? ORDER BY gm.joined_at",
    )
    .bind(group_id)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("username")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_group_records_owner_without_membership() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let group = create_group(
            db.clone(),
            "owner-1",
            NewGroup {
                name: "Team Rocket".to_string(),
                project_description: "Launch things".to_string(),
                required_skills: "Rust, Embedded".to_string(),
            },
        )
        .await
        .unwrap();

        let stored = get_group(db.clone(), &group.id).await.unwrap();
        assert_eq!(stored.owner_id, "owner-1");
        assert_eq!(stored.required_skills, vec!["Rust", "Embedded"]);
        assert!(group_members(db.clone(), &group.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_membership_insert_is_a_duplicate() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        add_member(db.clone(), "g1", "u1").await.unwrap();
        assert!(matches!(
            add_member(db.clone(), "g1", "u1").await,
            Err(CoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn blank_fields_fail_the_precondition() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let res = create_group(
            db,
            "owner-1",
            NewGroup {
                name: "  ".to_string(),
                project_description: "x".to_string(),
                required_skills: String::new(),
            },
        )
        .await;
        assert!(matches!(res, Err(CoreError::PreconditionFailed(_))));
    }
}
