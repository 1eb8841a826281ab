//! Idempotency ledger
//!
//! Durable record of every accepted operation, keyed by its client-generated
//! idempotency key. The UNIQUE index on `idempotency_key` is the only
//! de-duplication mechanism: a lookup miss does not reserve the key, and a
//! racing duplicate is detected when its own insert violates the index.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::SyncOperation;

/// Answer to "has this key already been applied?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLookup {
    /// Already applied; carries the stored record
    Hit(SyncOperation),
    /// Never applied
    Miss,
}

/// Ledger reads and writes over any connection or transaction
pub struct IdempotencyLedger<'a> {
    conn: &'a Connection,
}

impl<'a> IdempotencyLedger<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Look up a key
    pub fn lookup(&self, idempotency_key: &str) -> Result<LedgerLookup> {
        let operation = self
            .conn
            .query_row(
                "SELECT idempotency_key, operation_type, entity_id, user_id, processed_at, result
                 FROM sync_operations WHERE idempotency_key = ?",
                params![idempotency_key],
                Self::parse_operation,
            )
            .optional()?;

        Ok(operation.map_or(LedgerLookup::Miss, LedgerLookup::Hit))
    }

    /// Insert the ledger entry for a successful mutation.
    ///
    /// Must run in the same transaction as the mutation. Fails with a unique
    /// violation (see [`crate::Error::is_unique_violation`]) if another request
    /// already recorded the key.
    pub fn record(&self, operation: &SyncOperation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_operations
                (idempotency_key, operation_type, entity_id, user_id, processed_at, result)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                operation.idempotency_key,
                operation.operation_type,
                operation.entity_id,
                operation.user_id,
                operation.processed_at,
                operation.result,
            ],
        )?;
        Ok(())
    }

    /// Operations a user has submitted, newest first
    pub fn history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SyncOperation>> {
        let mut stmt = self.conn.prepare(
            "SELECT idempotency_key, operation_type, entity_id, user_id, processed_at, result
             FROM sync_operations
             WHERE user_id = ?
             ORDER BY processed_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )?;

        let operations = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                Self::parse_operation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(operations)
    }

    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncOperation> {
        Ok(SyncOperation {
            idempotency_key: row.get(0)?,
            operation_type: row.get(1)?,
            entity_id: row.get(2)?,
            user_id: row.get(3)?,
            processed_at: row.get(4)?,
            result: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn entry(key: &str, user: &str, processed_at: i64) -> SyncOperation {
        SyncOperation {
            idempotency_key: key.to_string(),
            operation_type: "CREATE_INSPECTION".to_string(),
            entity_id: "entity-1".to_string(),
            user_id: user.to_string(),
            processed_at,
            result: r#"{"id":"entity-1","version":1}"#.to_string(),
        }
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("fieldsync.db")).unwrap();
        let conn = db.connect().unwrap();
        let ledger = IdempotencyLedger::new(&conn);

        assert_eq!(ledger.lookup("k-1").unwrap(), LedgerLookup::Miss);
        ledger.record(&entry("k-1", "u-1", 1)).unwrap();
        assert_eq!(
            ledger.lookup("k-1").unwrap(),
            LedgerLookup::Hit(entry("k-1", "u-1", 1))
        );
    }

    #[test]
    fn test_second_record_is_unique_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("fieldsync.db")).unwrap();
        let conn = db.connect().unwrap();
        let ledger = IdempotencyLedger::new(&conn);

        ledger.record(&entry("k-1", "u-1", 1)).unwrap();
        let err = ledger.record(&entry("k-1", "u-2", 2)).unwrap_err();
        assert!(err.is_unique_violation());

        // First writer's record is untouched
        let LedgerLookup::Hit(stored) = ledger.lookup("k-1").unwrap() else {
            panic!("expected hit");
        };
        assert_eq!(stored.user_id, "u-1");
    }

    #[test]
    fn test_history_is_per_user_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("fieldsync.db")).unwrap();
        let conn = db.connect().unwrap();
        let ledger = IdempotencyLedger::new(&conn);

        ledger.record(&entry("k-1", "u-1", 1)).unwrap();
        ledger.record(&entry("k-2", "u-1", 2)).unwrap();
        ledger.record(&entry("k-3", "u-2", 3)).unwrap();

        let history = ledger.history("u-1", 10, 0).unwrap();
        let keys: Vec<_> = history.iter().map(|op| op.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["k-2", "k-1"]);
        assert_eq!(ledger.history("u-1", 1, 1).unwrap().len(), 1);
    }
}
