//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, TransactionBehavior};

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Schema version recorded in the database, 0 when unmigrated
pub fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Run a migration's statements in one transaction, returning whether they ran.
///
/// The version is re-read under the write lock, so a process that lost the
/// race to migrate a fresh file skips what the winner already applied.
fn apply(conn: &mut Connection, version: i32, statements: &[&str]) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if get_version(&tx)? >= version {
        return Ok(false);
    }
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.commit()?;
    Ok(true)
}

/// Migration to version 1: Templates and inspections
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            checklist_items TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS inspections (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL REFERENCES templates(id),
            inspector TEXT NOT NULL,
            facility_name TEXT NOT NULL,
            facility_address TEXT NOT NULL DEFAULT '',
            responses TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'draft',
            version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
            submitted_at INTEGER,
            approved_by TEXT,
            approved_at INTEGER,
            approval_notes TEXT,
            rejected_at INTEGER,
            rejection_notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_by TEXT,
            deleted_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_inspections_inspector_status ON inspections(inspector, status)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_created ON inspections(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_deleted ON inspections(is_deleted)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    if apply(conn, 1, &statements)? {
        tracing::info!("Migrated database to version 1");
    }
    Ok(())
}

/// Migration to version 2: Idempotency ledger and conflict audit trail
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let statements = [
        // The UNIQUE constraint on the key is the only de-duplication mechanism
        "CREATE TABLE IF NOT EXISTS sync_operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_key TEXT NOT NULL UNIQUE,
            operation_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            processed_at INTEGER NOT NULL,
            result TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_operations_user ON sync_operations(user_id, processed_at DESC)",
        "CREATE TABLE IF NOT EXISTS conflict_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT NOT NULL REFERENCES inspections(id),
            client_version INTEGER NOT NULL,
            server_version INTEGER NOT NULL,
            client_snapshot TEXT NOT NULL,
            server_snapshot TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at INTEGER,
            resolved_by TEXT,
            resolution_strategy TEXT,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_conflict_records_entity ON conflict_records(entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_conflict_records_created ON conflict_records(created_at DESC)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    if apply(conn, 2, &statements)? {
        tracing::info!("Migrated database to version 2");
    }
    Ok(())
}
