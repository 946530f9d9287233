use crate::server::database::Database;
use chrono::Utc;
use log::{error, info, warn};
use std::{fs::OpenOptions, io::Write, sync::Arc, time::Duration};
use sysinfo::System;
use tokio::time;

pub async fn start_performance_logger(db: Arc<Database>, log_path: &str) {
    let mut system = System::new_all();

    let mut file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            error!("Unable to open performance log file '{}': {}", log_path, e);
            return;
        }
    };

    // Write header if file is empty
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        if let Err(e) = writeln!(file, "# Quickteams Server Performance Log") {
            error!("Failed to write header to performance log: {}", e);
            return;
        }
        if let Err(e) = writeln!(file, "# Timestamp, Profiles, Groups, Pending_Invitations, CPU_Usage") {
            error!("Failed to write header to performance log: {}", e);
            return;
        }
        info!("Performance log initialized: {}", log_path);
    }

    loop {
        system.refresh_all();
        let cpu_usage = system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / system.cpus().len() as f32;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let profiles = match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&db.pool)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to query profiles: {}", e);
                -1
            }
        };

        let groups = match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM groups")
            .fetch_one(&db.pool)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to query groups: {}", e);
                -1
            }
        };

        let pending_invitations = match sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM invitations WHERE status = 'pending'",
        )
        .fetch_one(&db.pool)
        .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to query invitations: {}", e);
                -1
            }
        };

        info!(
            "Performance - Profiles: {}, Groups: {}, Pending invitations: {}, CPU: {:.1}%",
            profiles, groups, pending_invitations, cpu_usage
        );

        if let Err(e) = writeln!(
            file,
            "{}, {}, {}, {}, {:.1}%",
            timestamp, profiles, groups, pending_invitations, cpu_usage
        ) {
            error!("Failed to write to performance log: {}", e);
        } else if let Err(e) = file.flush() {
            error!("Failed to flush performance log: {}", e);
        }

        time::sleep(Duration::from_secs(120)).await;
    }
}
