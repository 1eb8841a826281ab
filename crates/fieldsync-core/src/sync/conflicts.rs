//! Conflict recorder: immutable audit snapshots of rejected writes

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    ConflictFilter, ConflictId, ConflictRecord, Identity, InspectionId, ResolutionStrategy,
};

const DEFAULT_LIST_LIMIT: usize = 50;

const SELECT_COLUMNS: &str = "SELECT c.id, c.entity_id, c.client_version, c.server_version,
    c.client_snapshot, c.server_snapshot, c.resolved, c.resolved_at, c.resolved_by,
    c.resolution_strategy, c.created_at
    FROM conflict_records c";

/// Conflict record reads and writes over any connection or transaction
pub struct ConflictRecorder<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictRecorder<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Capture both sides of a rejected write at the moment of detection
    pub fn record(
        &self,
        entity_id: &InspectionId,
        client_version: i64,
        server_version: i64,
        client_snapshot: &Value,
        server_snapshot: &Value,
    ) -> Result<ConflictId> {
        self.conn.execute(
            "INSERT INTO conflict_records
                (entity_id, client_version, server_version, client_snapshot, server_snapshot, resolved, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
            params![
                entity_id.as_str(),
                client_version,
                server_version,
                client_snapshot,
                server_snapshot,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Mark a conflict resolved. Succeeds at most once per record.
    pub fn resolve(
        &self,
        id: ConflictId,
        strategy: ResolutionStrategy,
        identity: &Identity,
    ) -> Result<ConflictRecord> {
        let rows = self.conn.execute(
            "UPDATE conflict_records
             SET resolved = 1, resolved_at = ?, resolved_by = ?, resolution_strategy = ?
             WHERE id = ? AND resolved = 0",
            params![
                chrono::Utc::now().timestamp_millis(),
                identity.user_id,
                strategy.as_str(),
                id
            ],
        )?;

        let record = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("Conflict {id} not found")))?;
        if rows == 0 {
            return Err(Error::AlreadyResolved(id));
        }
        Ok(record)
    }

    /// Get a conflict by ID
    pub fn get(&self, id: ConflictId) -> Result<Option<ConflictRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE c.id = ?"),
                params![id],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(record)
    }

    /// List conflicts, newest first. `inspector` restricts to conflicts on
    /// that user's inspections.
    pub fn list(
        &self,
        filter: &ConflictFilter,
        inspector: Option<&str>,
    ) -> Result<Vec<ConflictRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS}
             JOIN inspections i ON i.id = c.entity_id
             WHERE (?1 IS NULL OR c.entity_id = ?1)
               AND (?2 IS NULL OR c.resolved = ?2)
               AND (?3 IS NULL OR i.inspector = ?3)
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT ?4 OFFSET ?5"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![
                    filter.entity_id.map(|id| id.as_str()),
                    filter.resolved.map(i32::from),
                    inspector,
                    filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64,
                    filter.offset.unwrap_or(0) as i64,
                ],
                Self::parse_conflict,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let entity_id: String = row.get(1)?;
        let strategy: Option<String> = row.get(9)?;
        Ok(ConflictRecord {
            id: row.get(0)?,
            entity_id: entity_id
                .parse()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                })?,
            client_version: row.get(2)?,
            server_version: row.get(3)?,
            client_snapshot: row.get(4)?,
            server_snapshot: row.get(5)?,
            resolved: row.get::<_, i32>(6)? != 0,
            resolved_at: row.get(7)?,
            resolved_by: row.get(8)?,
            resolution_strategy: strategy
                .map(|s| s.parse::<ResolutionStrategy>())
                .transpose()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
                })?,
            created_at: row.get(10)?,
        })
    }
}
