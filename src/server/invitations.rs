//! Invitation workflow: the lifecycle of a pending invitation from send to
//! acceptance (membership) or decline. `pending` is the only persisted
//! state; accepting and declining both end in the row's deletion.

use crate::common::models::{NewInvitation, PendingInvitation};
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::CoreError;
use crate::server::groups;
use log::{info, warn};
use sqlx::Row;
use std::sync::Arc;

/// Creates one pending invitation. One clean insert attempt; concurrent
/// duplicates are allowed unless the dedupe policy knob is on.
pub async fn send_invitation(
    db: Arc<Database>,
    sender_id: &str,
    new: NewInvitation,
    config: &ServerConfig,
) -> Result<i64, CoreError> {
    if new.recipient_id.trim().is_empty() {
        return Err(CoreError::precondition("recipient is required"));
    }
    if new.project_title.trim().is_empty() {
        return Err(CoreError::precondition("project title is required"));
    }
    if new.project_description.trim().is_empty() {
        return Err(CoreError::precondition("project description is required"));
    }
    if !config.allow_self_invite && new.recipient_id == sender_id {
        return Err(CoreError::precondition("cannot invite yourself"));
    }

    // Recipient and target group must exist before anything is written.
    let recipient = sqlx::query("SELECT id FROM users WHERE id = ?")
        .bind(&new.recipient_id)
        .fetch_optional(&db.pool)
        .await?;
    if recipient.is_none() {
        return Err(CoreError::NotFound("recipient"));
    }
    groups::get_group(db.clone(), &new.group_id).await?;

    if config.dedupe_pending_invites {
        let existing = sqlx::query(
            "SELECT 1 FROM invitations WHERE sender_id = ? AND recipient_id = ? AND group_id = ? AND status = 'pending'",
        )
        .bind(sender_id)
        .bind(&new.recipient_id)
        .bind(&new.group_id)
        .fetch_optional(&db.pool)
        .await?;
        if existing.is_some() {
            return Err(CoreError::precondition("an invitation for this group is already pending"));
        }
    }

    let created_at = chrono::Utc::now().timestamp();
    let res = sqlx::query(
        "INSERT INTO invitations (sender_id, recipient_id, group_id, project_title, project_description, status, created_at) \
         VALUES (?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(sender_id)
    .bind(&new.recipient_id)
    .bind(&new.group_id)
    .bind(&new.project_title)
    .bind(&new.project_description)
    .bind(created_at)
    .execute(&db.pool)
    .await?;

    let invitation_id = res.last_insert_rowid();
    info!(
        "[INVITES] Invitation {} sent by {} to {} for group {}",
        invitation_id, sender_id, new.recipient_id, new.group_id
    );
    Ok(invitation_id)
}

/// Accepts a pending invitation addressed to `recipient_id`. Two strictly
/// sequential steps: create the membership, then delete the invitation.
/// If the membership insert fails, the invitation stays pending and no
/// partial state is observable. If only the delete fails, it is retried
/// once (deleting is idempotent) before surfacing `PartialFailure`.
pub async fn accept_invitation(
    db: Arc<Database>,
    recipient_id: &str,
    invitation_id: i64,
) -> Result<(), CoreError> {
    let row = sqlx::query(
        "SELECT group_id FROM invitations WHERE id = ? AND recipient_id = ? AND status = 'pending'",
    )
    .bind(invitation_id)
    .bind(recipient_id)
    .fetch_optional(&db.pool)
    .await?;
    let row = row.ok_or(CoreError::NotFound("invitation"))?;
    let group_id: String = row.get("group_id");

    groups::add_member(db.clone(), &group_id, recipient_id).await?;

    if let Err(first) = delete_invitation(&db, invitation_id).await {
        warn!(
            "[INVITES] Invitation {} accepted but delete failed ({}); retrying once",
            invitation_id, first
        );
        if let Err(second) = delete_invitation(&db, invitation_id).await {
            warn!("[INVITES] Retry delete for invitation {} failed: {}", invitation_id, second);
            return Err(CoreError::PartialFailure(invitation_id));
        }
    }

    info!(
        "[INVITES] Invitation {} accepted; user {} joined group {}",
        invitation_id, recipient_id, group_id
    );
    Ok(())
}

/// Declines a pending invitation: deletes the row, nothing else.
pub async fn decline_invitation(
    db: Arc<Database>,
    recipient_id: &str,
    invitation_id: i64,
) -> Result<(), CoreError> {
    let res = sqlx::query(
        "DELETE FROM invitations WHERE id = ? AND recipient_id = ? AND status = 'pending'",
    )
    .bind(invitation_id)
    .bind(recipient_id)
    .execute(&db.pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(CoreError::NotFound("invitation"));
    }
    info!("[INVITES] Invitation {} declined by {}", invitation_id, recipient_id);
    Ok(())
}

/// All pending invitations addressed to the recipient, annotated with the
/// target group's name. A deleted group leaves the name absent instead of
/// failing the whole projection.
pub async fn pending_invitations(
    db: Arc<Database>,
    recipient_id: &str,
) -> Result<Vec<PendingInvitation>, CoreError> {
    let rows = sqlx::query(
        "SELECT i.id, i.sender_id, i.group_id, i.project_title, i.project_description, g.name AS group_name \
         FROM invitations i LEFT JOIN groups g ON i.group_id = g.id \
         WHERE i.recipient_id = ? AND i.status = 'pending' \
         ORDER BY i.created_at, i.id",
    )
    .bind(recipient_id)
    .fetch_all(&db.pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| PendingInvitation {
            id: r.get("id"),
            sender_id: r.get("sender_id"),
            group_id: r.get("group_id"),
            group_name: r.get("group_name"),
            project_title: r.get("project_title"),
            project_description: r.get("project_description"),
        })
        .collect())
}

async fn delete_invitation(db: &Database, invitation_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM invitations WHERE id = ?")
        .bind(invitation_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::NewGroup;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            max_clients: 4,
            enable_encryption: false,
            log_level: "debug".to_string(),
            session_expiry_days: 7,
            argon2_salt_length: 16,
            max_line_length: 8192,
            allow_self_invite: false,
            dedupe_pending_invites: false,
        }
    }

    async fn seed_user(db: &Arc<Database>, id: &str) {
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, 0)")
            .bind(id)
            .bind(format!("user-{id}"))
            .execute(&db.pool)
            .await
            .unwrap();
    }

    async fn seed_group(db: &Arc<Database>, owner: &str, name: &str) -> String {
        groups::create_group(
            db.clone(),
            owner,
            NewGroup {
                name: name.to_string(),
                project_description: "a project".to_string(),
                required_skills: String::new(),
            },
        )
        .await
        .unwrap()
        .id
    }

    fn invitation_for(recipient: &str, group_id: &str) -> NewInvitation {
        NewInvitation {
            recipient_id: recipient.to_string(),
            group_id: group_id.to_string(),
            project_title: "Hack Weekend".to_string(),
            project_description: "48h build".to_string(),
        }
    }

    #[tokio::test]
    async fn accept_creates_membership_then_removes_invitation() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;

        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();
        accept_invitation(db.clone(), "rcpt", inv).await.unwrap();

        let members = groups::group_members(db.clone(), &group_id).await.unwrap();
        assert_eq!(members, vec!["user-rcpt"]);
        assert!(pending_invitations(db.clone(), "rcpt").await.unwrap().is_empty());

        // Accepting again finds nothing pending.
        assert!(matches!(
            accept_invitation(db.clone(), "rcpt", inv).await,
            Err(CoreError::NotFound("invitation"))
        ));
    }

    #[tokio::test]
    async fn failed_membership_leaves_invitation_pending() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;

        // Make a membership already exist so step 1 fails as Duplicate.
        groups::add_member(db.clone(), &group_id, "rcpt").await.unwrap();

        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();
        assert!(matches!(
            accept_invitation(db.clone(), "rcpt", inv).await,
            Err(CoreError::Duplicate)
        ));

        // The workflow never reached step 2: the invitation is untouched.
        let pending = pending_invitations(db.clone(), "rcpt").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, inv);
    }

    #[tokio::test]
    async fn failed_delete_surfaces_partial_failure_after_one_retry() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;

        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();

        // Force step 2 to fail: a trigger that aborts every invitation delete.
        sqlx::query(
            "CREATE TRIGGER block_invitation_delete BEFORE DELETE ON invitations \
             BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let res = accept_invitation(db.clone(), "rcpt", inv).await;
        assert!(matches!(res, Err(CoreError::PartialFailure(id)) if id == inv));

        // The membership stuck, and the invitation still shows as pending.
        let members = groups::group_members(db.clone(), &group_id).await.unwrap();
        assert_eq!(members, vec!["user-rcpt"]);
        let pending = pending_invitations(db.clone(), "rcpt").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, inv);
    }

    #[tokio::test]
    async fn decline_removes_invitation_without_membership() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;

        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();
        decline_invitation(db.clone(), "rcpt", inv).await.unwrap();

        assert!(pending_invitations(db.clone(), "rcpt").await.unwrap().is_empty());
        assert!(groups::group_members(db.clone(), &group_id).await.unwrap().is_empty());
        assert!(matches!(
            decline_invitation(db.clone(), "rcpt", inv).await,
            Err(CoreError::NotFound("invitation"))
        ));
    }

    #[tokio::test]
    async fn only_the_recipient_can_resolve_an_invitation() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        seed_user(&db, "other").await;
        let group_id = seed_group(&db, "sender", "Builders").await;

        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();
        assert!(matches!(
            accept_invitation(db.clone(), "other", inv).await,
            Err(CoreError::NotFound("invitation"))
        ));
        assert!(matches!(
            decline_invitation(db.clone(), "other", inv).await,
            Err(CoreError::NotFound("invitation"))
        ));
        assert_eq!(pending_invitations(db.clone(), "rcpt").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_preconditions_and_policy_knobs() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;
        let config = test_config();

        let mut blank_title = invitation_for("rcpt", &group_id);
        blank_title.project_title = " ".to_string();
        assert!(matches!(
            send_invitation(db.clone(), "sender", blank_title, &config).await,
            Err(CoreError::PreconditionFailed(_))
        ));

        assert!(matches!(
            send_invitation(db.clone(), "sender", invitation_for("sender", &group_id), &config).await,
            Err(CoreError::PreconditionFailed(_))
        ));

        assert!(matches!(
            send_invitation(db.clone(), "sender", invitation_for("ghost", &group_id), &config).await,
            Err(CoreError::NotFound("recipient"))
        ));

        assert!(matches!(
            send_invitation(db.clone(), "sender", invitation_for("rcpt", "no-such-group"), &config).await,
            Err(CoreError::NotFound("group"))
        ));

        // Duplicates coexist by default.
        send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &config).await.unwrap();
        send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &config).await.unwrap();
        assert_eq!(pending_invitations(db.clone(), "rcpt").await.unwrap().len(), 2);

        // With the dedupe knob on, the third is rejected.
        let mut dedupe = test_config();
        dedupe.dedupe_pending_invites = true;
        assert!(matches!(
            send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &dedupe).await,
            Err(CoreError::PreconditionFailed(_))
        ));

        // And self-invitation can be allowed explicitly.
        let mut selfie = test_config();
        selfie.allow_self_invite = true;
        send_invitation(db.clone(), "sender", invitation_for("sender", &group_id), &selfie)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleted_group_does_not_break_the_pending_list() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        seed_user(&db, "sender").await;
        seed_user(&db, "rcpt").await;
        let group_id = seed_group(&db, "sender", "Builders").await;
        let inv = send_invitation(db.clone(), "sender", invitation_for("rcpt", &group_id), &test_config())
            .await
            .unwrap();

        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(&group_id)
            .execute(&db.pool)
            .await
            .unwrap();

        let pending = pending_invitations(db.clone(), "rcpt").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, inv);
        assert_eq!(pending[0].group_name, None);
    }
}
