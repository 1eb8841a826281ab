//! Optimistic concurrency guard over the inspection `version` column

use rusqlite::Connection;

use super::result::OperationError;
use crate::db::{InspectionRepository, SqliteInspectionRepository};
use crate::models::{Inspection, InspectionId};

/// Outcome of a guarded write
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded {
    /// Mutation committed; `state` is the authoritative post-write row
    Applied { new_version: i64, state: Inspection },
    /// Versions differed; nothing was written
    Conflict {
        server_version: i64,
        server_state: Inspection,
    },
}

/// The sole concurrency-control primitive: compares the client's base
/// version to the stored one and only writes on exact equality.
pub struct VersionGuard<'a> {
    repo: SqliteInspectionRepository<'a>,
}

impl<'a> VersionGuard<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            repo: SqliteInspectionRepository::new(conn),
        }
    }

    /// Load the live entity a guarded write will target
    pub fn load(&self, id: &InspectionId) -> Result<Inspection, OperationError> {
        self.repo
            .get(id)?
            .ok_or_else(|| OperationError::not_found(format!("Inspection {id} not found")))
    }

    /// Apply `mutation` to `current` if `submitted_version` equals its version.
    ///
    /// Any inequality is a conflict, including a submitted version *higher*
    /// than the stored one. The write itself is a compare-and-swap on the
    /// stored version, so a row changed underneath us also reports a
    /// conflict rather than being overwritten.
    pub fn check_and_apply<F>(
        &self,
        current: &Inspection,
        submitted_version: i64,
        mutation: F,
    ) -> Result<Guarded, OperationError>
    where
        F: FnOnce(&mut Inspection) -> Result<(), OperationError>,
    {
        if submitted_version != current.version {
            return Ok(Guarded::Conflict {
                server_version: current.version,
                server_state: current.clone(),
            });
        }

        let mut next = current.clone();
        mutation(&mut next)?;
        next.updated_at = chrono::Utc::now().timestamp_millis();

        if !self.repo.compare_and_swap(&next, current.version)? {
            let latest = self.reload(&current.id)?;
            tracing::warn!(
                entity_id = %current.id,
                expected_version = current.version,
                server_version = latest.version,
                "Version changed between read and write"
            );
            return Ok(Guarded::Conflict {
                server_version: latest.version,
                server_state: latest,
            });
        }

        let state = self.reload(&current.id)?;
        Ok(Guarded::Applied {
            new_version: state.version,
            state,
        })
    }

    fn reload(&self, id: &InspectionId) -> Result<Inspection, OperationError> {
        self.repo
            .get_including_deleted(id)?
            .ok_or_else(|| OperationError::not_found(format!("Inspection {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteTemplateRepository, TemplateRepository};
    use crate::models::Template;
    use crate::sync::ErrorCode;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, Inspection) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("fieldsync.db")).unwrap();
        let template = Template::new("Boilers", serde_json::json!([]));
        let inspection = Inspection::new(InspectionId::new(), template.id, "u-1", "Plant A");
        db.read(|conn| {
            SqliteTemplateRepository::new(conn).insert(&template)?;
            SqliteInspectionRepository::new(conn).insert(&inspection)
        })
        .unwrap();
        (tmp, db, inspection)
    }

    #[test]
    fn applies_on_exact_match_and_returns_stored_version() {
        let (_tmp, db, inspection) = setup();
        let conn = db.connect().unwrap();
        let guard = VersionGuard::new(&conn);

        let current = guard.load(&inspection.id).unwrap();
        let outcome = guard
            .check_and_apply(&current, 1, |next| {
                next.facility_name = "Plant B".to_string();
                Ok(())
            })
            .unwrap();

        let Guarded::Applied { new_version, state } = outcome else {
            panic!("expected applied");
        };
        assert_eq!(new_version, 2);
        assert_eq!(state.version, 2);
        assert_eq!(state.facility_name, "Plant B");
    }

    #[test]
    fn lower_and_higher_versions_both_conflict_without_writing() {
        let (_tmp, db, inspection) = setup();
        let conn = db.connect().unwrap();
        let guard = VersionGuard::new(&conn);
        let current = guard.load(&inspection.id).unwrap();

        for submitted in [0, 2, 7] {
            let outcome = guard
                .check_and_apply(&current, submitted, |next| {
                    next.facility_name = "changed".to_string();
                    Ok(())
                })
                .unwrap();
            assert!(matches!(
                outcome,
                Guarded::Conflict { server_version: 1, .. }
            ));
        }

        let stored = guard.load(&inspection.id).unwrap();
        assert_eq!(stored, inspection);
    }

    #[test]
    fn stale_snapshot_loses_the_compare_and_swap() {
        let (_tmp, db, inspection) = setup();
        let conn = db.connect().unwrap();
        let guard = VersionGuard::new(&conn);
        let stale = guard.load(&inspection.id).unwrap();

        guard.check_and_apply(&stale, 1, |_| Ok(())).unwrap();
        let outcome = guard.check_and_apply(&stale, 1, |_| Ok(())).unwrap();

        let Guarded::Conflict {
            server_version,
            server_state,
        } = outcome
        else {
            panic!("expected conflict");
        };
        assert_eq!(server_version, 2);
        assert_eq!(server_state.version, 2);
    }

    #[test]
    fn mutation_errors_propagate_and_leave_version_alone() {
        let (_tmp, db, inspection) = setup();
        let conn = db.connect().unwrap();
        let guard = VersionGuard::new(&conn);
        let current = guard.load(&inspection.id).unwrap();

        let err = guard
            .check_and_apply(&current, 1, |_| Err(OperationError::invalid_state("nope")))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert_eq!(guard.load(&inspection.id).unwrap().version, 1);
    }

    #[test]
    fn load_reports_missing_entity() {
        let (_tmp, db, _inspection) = setup();
        let conn = db.connect().unwrap();
        let guard = VersionGuard::new(&conn);
        let err = guard.load(&InspectionId::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
