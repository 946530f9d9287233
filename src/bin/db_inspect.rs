use quickteams::server::database::Database;
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/quickteams.db".to_string());
    println!("Connecting to {}", db_path);
    let db = Database::connect(&db_path).await?;

    println!("\n-- profiles --");
    let rows = sqlx::query("SELECT id, name, skills, availability, commitment, updated_at FROM profiles")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let name: Option<String> = r.try_get("name").unwrap_or_default();
        let skills: String = r.try_get("skills").unwrap_or_default();
        let availability: Option<String> = r.try_get("availability").unwrap_or_default();
        let commitment: String = r.try_get("commitment").unwrap_or_default();
        println!(
            "id={} name={:?} skills={} availability={:?} commitment={}",
            id, name, skills, availability, commitment
        );
    }

    println!("\n-- groups --");
    let rows = sqlx::query("SELECT id, name, required_skills, owner_id, created_at FROM groups")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let name: String = r.try_get("name").unwrap_or_default();
        let required: String = r.try_get("required_skills").unwrap_or_default();
        let owner_id: String = r.try_get("owner_id").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} name={} required_skills={} owner={} created_at={}", id, name, required, owner_id, created_at);
    }

    println!("\n-- group_members --");
    let rows = sqlx::query("SELECT group_id, user_id, joined_at FROM group_members")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let group_id: String = r.try_get("group_id").unwrap_or_default();
        let user_id: String = r.try_get("user_id").unwrap_or_default();
        let joined_at: i64 = r.try_get("joined_at").unwrap_or(0);
        println!("group_id={} user_id={} joined_at={}", group_id, user_id, joined_at);
    }

    println!("\n-- invitations (last 10) --");
    let rows = sqlx::query(
        "SELECT id, sender_id, recipient_id, group_id, project_title, status, created_at \
         FROM invitations ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: i64 = r.try_get("id").unwrap_or(0);
        let sender_id: String = r.try_get("sender_id").unwrap_or_default();
        let recipient_id: String = r.try_get("recipient_id").unwrap_or_default();
        let group_id: String = r.try_get("group_id").unwrap_or_default();
        let title: String = r.try_get("project_title").unwrap_or_default();
        let status: String = r.try_get("status").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!(
            "id={} sender={} recipient={} group={} title={} status={} created_at={}",
            id, sender_id, recipient_id, group_id, title, status, created_at
        );
    }

    Ok(())
}
