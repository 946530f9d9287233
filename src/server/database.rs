use log::{error, info};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("Connecting to database: {}", database_url);

        // Extract the file path from the URL so the parent directory can
        // be created if it does not exist yet.
        let file_path = if database_url.starts_with("sqlite://") {
            let path_part = &database_url[9..];
            if let Some(query_pos) = path_part.find('?') {
                &path_part[..query_pos]
            } else {
                path_part
            }
        } else if database_url.starts_with("sqlite:") {
            &database_url[7..]
        } else {
            database_url
        };

        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create database directory {:?}: {}", parent, e);
                    sqlx::Error::Configuration(Box::new(e))
                })?;
                info!("Created database directory {:?}", parent);
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("SQLite connection failed: {}", e);
                e
            })?;

        info!("Database connection successful");
        Ok(Self { pool })
    }

    /// A private in-memory database for tests. A single connection keeps
    /// the database alive for the pool's lifetime.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Accounts
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS auth (
                user_id TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL
            );
        "#).execute(&self.pool).await?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT NOT NULL,
                session_token TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Session events (login_success, logout, quit)
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS session_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Profiles: skills and commitment are JSON arrays of strings,
        // availability an ISO date (available from).
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                name TEXT,
                skills TEXT NOT NULL DEFAULT '[]',
                availability TEXT,
                commitment TEXT NOT NULL DEFAULT '[]',
                updated_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                project_description TEXT NOT NULL,
                required_skills TEXT NOT NULL DEFAULT '[]',
                owner_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // The composite primary key is the only guard against a double
        // join; a second insert must fail, not silently succeed.
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS group_members (
                group_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );
        "#).execute(&self.pool).await?;

        // Invitations only ever hold status 'pending'; accept and decline
        // remove the row instead of updating it.
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS invitations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                project_title TEXT NOT NULL,
                project_description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        Ok(())
    }
}
