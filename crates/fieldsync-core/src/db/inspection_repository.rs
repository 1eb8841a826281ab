//! Inspection repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::{Inspection, InspectionId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str = "SELECT id, template_id, inspector, facility_name, facility_address,
    responses, status, version, submitted_at, approved_by, approved_at, approval_notes,
    rejected_at, rejection_notes, created_at, updated_at, is_deleted, deleted_by, deleted_at
    FROM inspections";

/// Filter for listing inspections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionQuery {
    /// Restrict to one inspector's records
    pub inspector: Option<String>,
    /// Administrative read path: include soft-deleted rows
    pub include_deleted: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Trait for inspection storage operations
pub trait InspectionRepository {
    /// Insert a new inspection; a duplicate id surfaces as a unique violation
    fn insert(&self, inspection: &Inspection) -> Result<()>;

    /// Get a live (not soft-deleted) inspection by ID
    fn get(&self, id: &InspectionId) -> Result<Option<Inspection>>;

    /// Get an inspection by ID, including soft-deleted rows
    fn get_including_deleted(&self, id: &InspectionId) -> Result<Option<Inspection>>;

    /// List inspections, newest first
    fn list(&self, query: &InspectionQuery) -> Result<Vec<Inspection>>;

    /// Write `next` only if the stored version still equals `expected_version`.
    ///
    /// The stored version becomes `expected_version + 1`; the version field of
    /// `next` is ignored. Returns `false` when no row matched.
    fn compare_and_swap(&self, next: &Inspection, expected_version: i64) -> Result<bool>;
}

/// `SQLite` implementation of `InspectionRepository`
pub struct SqliteInspectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteInspectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an inspection from a database row
    fn parse_inspection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Inspection> {
        let id: String = row.get(0)?;
        let template_id: String = row.get(1)?;
        let status: String = row.get(6)?;
        Ok(Inspection {
            id: id
                .parse()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })?,
            template_id: template_id
                .parse()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                })?,
            inspector: row.get(2)?,
            facility_name: row.get(3)?,
            facility_address: row.get(4)?,
            responses: row.get(5)?,
            status: status
                .parse()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                })?,
            version: row.get(7)?,
            submitted_at: row.get(8)?,
            approved_by: row.get(9)?,
            approved_at: row.get(10)?,
            approval_notes: row.get(11)?,
            rejected_at: row.get(12)?,
            rejection_notes: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
            is_deleted: row.get::<_, i32>(16)? != 0,
            deleted_by: row.get(17)?,
            deleted_at: row.get(18)?,
        })
    }

    fn fetch(&self, id: &InspectionId, include_deleted: bool) -> Result<Option<Inspection>> {
        let sql = if include_deleted {
            format!("{SELECT_COLUMNS} WHERE id = ?")
        } else {
            format!("{SELECT_COLUMNS} WHERE id = ? AND is_deleted = 0")
        };
        let inspection = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::parse_inspection)
            .optional()?;
        Ok(inspection)
    }
}

impl InspectionRepository for SqliteInspectionRepository<'_> {
    fn insert(&self, inspection: &Inspection) -> Result<()> {
        self.conn.execute(
            "INSERT INTO inspections (
                id, template_id, inspector, facility_name, facility_address, responses, status,
                version, submitted_at, approved_by, approved_at, approval_notes, rejected_at,
                rejection_notes, created_at, updated_at, is_deleted, deleted_by, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                inspection.id.as_str(),
                inspection.template_id.as_str(),
                inspection.inspector,
                inspection.facility_name,
                inspection.facility_address,
                inspection.responses,
                inspection.status.as_str(),
                inspection.version,
                inspection.submitted_at,
                inspection.approved_by,
                inspection.approved_at,
                inspection.approval_notes,
                inspection.rejected_at,
                inspection.rejection_notes,
                inspection.created_at,
                inspection.updated_at,
                i32::from(inspection.is_deleted),
                inspection.deleted_by,
                inspection.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &InspectionId) -> Result<Option<Inspection>> {
        self.fetch(id, false)
    }

    fn get_including_deleted(&self, id: &InspectionId) -> Result<Option<Inspection>> {
        self.fetch(id, true)
    }

    fn list(&self, query: &InspectionQuery) -> Result<Vec<Inspection>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE (?1 IS NULL OR inspector = ?1)");
        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3");

        let mut stmt = self.conn.prepare(&sql)?;
        let inspections = stmt
            .query_map(
                params![
                    query.inspector,
                    query.limit as i64,
                    query.offset as i64
                ],
                Self::parse_inspection,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(inspections)
    }

    fn compare_and_swap(&self, next: &Inspection, expected_version: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE inspections SET
                facility_name = ?, facility_address = ?, responses = ?, status = ?,
                submitted_at = ?, approved_by = ?, approved_at = ?, approval_notes = ?,
                rejected_at = ?, rejection_notes = ?, updated_at = ?,
                is_deleted = ?, deleted_by = ?, deleted_at = ?,
                version = version + 1
             WHERE id = ? AND version = ?",
            params![
                next.facility_name,
                next.facility_address,
                next.responses,
                next.status.as_str(),
                next.submitted_at,
                next.approved_by,
                next.approved_at,
                next.approval_notes,
                next.rejected_at,
                next.rejection_notes,
                next.updated_at,
                i32::from(next.is_deleted),
                next.deleted_by,
                next.deleted_at,
                next.id.as_str(),
                expected_version,
            ],
        )?;

        Ok(rows == 1)
    }
}
