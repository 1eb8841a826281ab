use std::path::Path;

use chrono::Utc;
use fieldsync_core::{Identity, SyncService, SyncSettings};
use serde::Serialize;

use crate::error::CliError;

/// Open (and migrate) the database behind the admin commands
pub fn open_service(db_path: &Path) -> Result<SyncService, CliError> {
    Ok(SyncService::open(db_path, SyncSettings::default())?)
}

/// Identity used for administrative reads and conflict resolution
pub fn admin_identity(user_id: &str) -> Identity {
    Identity::manager(user_id)
}

pub const fn ensure_limit(limit: usize) -> Result<usize, CliError> {
    if limit == 0 {
        return Err(CliError::ZeroLimit);
    }
    Ok(limit)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_lines(lines: &[String], empty_message: &str) {
    if lines.is_empty() {
        println!("{empty_message}");
        return;
    }
    for line in lines {
        println!("{line}");
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Shorten a UUID for table output
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
