//! Engine facade shared by the API server and the admin CLI.

use std::path::Path;

use serde_json::Value;

use crate::db::{
    Database, InspectionQuery, InspectionRepository, SqliteInspectionRepository,
    SqliteTemplateRepository, TemplateRepository,
};
use crate::models::{
    ConflictFilter, ConflictId, ConflictRecord, Identity, Inspection, InspectionId,
    ResolutionStrategy, SyncOperation, Template,
};
use crate::sync::{
    BatchOrchestrator, BatchReport, ConflictRecorder, IdempotencyLedger, OperationProcessor,
    Processed, RawOperation, DEFAULT_MAX_BATCH_SIZE,
};
use crate::{Error, Result};

/// Tunables for the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Largest batch accepted in one request
    pub max_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Thread-safe handle over the authoritative database.
///
/// Cheap to clone. All methods block on `SQLite`; async callers should run
/// them on a blocking worker.
#[derive(Debug, Clone)]
pub struct SyncService {
    db: Database,
    settings: SyncSettings,
}

impl SyncService {
    pub const fn new(db: Database, settings: SyncSettings) -> Self {
        Self { db, settings }
    }

    /// Open (and migrate) the database at `path`
    pub fn open(path: impl AsRef<Path>, settings: SyncSettings) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, settings))
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub const fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Process a batch of client-queued operations in order
    pub fn process_batch(
        &self,
        operations: &[RawOperation],
        identity: &Identity,
    ) -> Result<BatchReport> {
        BatchOrchestrator::new(&self.db, self.settings.max_batch_size)
            .process_batch(operations, identity)
    }

    /// Process one operation outside a batch
    pub fn process_single(&self, operation: &RawOperation, identity: &Identity) -> Processed {
        OperationProcessor::new(&self.db).process(0, operation, identity)
    }

    /// The caller's processed operations, newest first
    pub fn history(
        &self,
        identity: &Identity,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SyncOperation>> {
        self.db
            .read(|conn| IdempotencyLedger::new(conn).history(&identity.user_id, limit, offset))
    }

    /// Live inspections visible to `identity`: all for managers, own for inspectors
    pub fn list_inspections(
        &self,
        identity: &Identity,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Inspection>> {
        let query = InspectionQuery {
            inspector: (!identity.is_manager()).then(|| identity.user_id.clone()),
            include_deleted: false,
            limit,
            offset,
        };
        self.db
            .read(|conn| SqliteInspectionRepository::new(conn).list(&query))
    }

    /// One live inspection visible to `identity`
    pub fn get_inspection(&self, identity: &Identity, id: &InspectionId) -> Result<Inspection> {
        let inspection = self
            .db
            .read(|conn| SqliteInspectionRepository::new(conn).get(id))?
            .filter(|inspection| identity.is_manager() || inspection.inspector == identity.user_id);
        inspection.ok_or_else(|| Error::NotFound(format!("Inspection {id} not found")))
    }

    /// Administrative read path, optionally including soft-deleted rows
    pub fn admin_list_inspections(&self, query: &InspectionQuery) -> Result<Vec<Inspection>> {
        self.db
            .read(|conn| SqliteInspectionRepository::new(conn).list(query))
    }

    /// Conflicts visible to `identity`
    pub fn list_conflicts(
        &self,
        identity: &Identity,
        filter: &ConflictFilter,
    ) -> Result<Vec<ConflictRecord>> {
        let inspector = (!identity.is_manager()).then_some(identity.user_id.as_str());
        self.db
            .read(|conn| ConflictRecorder::new(conn).list(filter, inspector))
    }

    /// Mark a conflict resolved. Allowed for the inspection's owner and managers.
    pub fn resolve_conflict(
        &self,
        identity: &Identity,
        id: ConflictId,
        strategy: ResolutionStrategy,
    ) -> Result<ConflictRecord> {
        let record = self.db.write(|tx| {
            let recorder = ConflictRecorder::new(tx);
            let conflict = recorder
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("Conflict {id} not found")))?;

            if !identity.is_manager() {
                let owner = SqliteInspectionRepository::new(tx)
                    .get_including_deleted(&conflict.entity_id)?
                    .map(|inspection| inspection.inspector);
                if owner.as_deref() != Some(identity.user_id.as_str()) {
                    return Err(Error::PermissionDenied(
                        "Conflict belongs to another inspector's inspection".to_string(),
                    ));
                }
            }

            recorder.resolve(id, strategy, identity)
        })?;

        tracing::info!(
            conflict_id = id,
            entity_id = %record.entity_id,
            strategy = strategy.as_str(),
            "Conflict resolved"
        );
        Ok(record)
    }

    /// Seed a checklist template
    pub fn add_template(&self, name: &str, checklist_items: Value) -> Result<Template> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("template name must not be empty".to_string()));
        }
        if !checklist_items.is_array() {
            return Err(Error::InvalidInput(
                "checklist_items must be a JSON array".to_string(),
            ));
        }

        let template = Template::new(name, checklist_items);
        self.db
            .write(|tx| SqliteTemplateRepository::new(tx).insert(&template))?;
        tracing::info!(template_id = %template.id, "Template added");
        Ok(template)
    }

    pub fn list_templates(&self, limit: usize) -> Result<Vec<Template>> {
        self.db
            .read(|conn| SqliteTemplateRepository::new(conn).list(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Outcome, OperationResult};
    use serde_json::json;
    use tempfile::TempDir;

    fn service() -> (TempDir, SyncService, Template) {
        let tmp = tempfile::tempdir().unwrap();
        let service =
            SyncService::open(tmp.path().join("fieldsync.db"), SyncSettings::default()).unwrap();
        let template = service.add_template("Cranes", json!([])).unwrap();
        (tmp, service, template)
    }

    fn create(
        service: &SyncService,
        template: &Template,
        key: &str,
        identity: &Identity,
    ) -> InspectionId {
        let processed = service.process_single(
            &RawOperation::new(
                "CREATE_INSPECTION",
                key,
                json!({"template_id": template.id.to_string(), "facility_name": "Yard"}),
            ),
            identity,
        );
        let OperationResult::Success(success) = processed.result else {
            panic!("expected success");
        };
        success.data["id"].as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn inspectors_only_see_their_own_inspections() {
        let (_tmp, service, template) = service();
        let alice = Identity::inspector("alice");
        let bob = Identity::inspector("bob");
        let id = create(&service, &template, "k-1", &alice);
        create(&service, &template, "k-2", &bob);

        assert_eq!(service.list_inspections(&alice, 50, 0).unwrap().len(), 1);
        assert_eq!(service.list_inspections(&Identity::manager("m"), 50, 0).unwrap().len(), 2);
        assert!(service.get_inspection(&alice, &id).is_ok());
        assert!(matches!(service.get_inspection(&bob, &id), Err(Error::NotFound(_))));
    }

    #[test]
    fn soft_deleted_rows_only_on_admin_path() {
        let (_tmp, service, template) = service();
        let alice = Identity::inspector("alice");
        let id = create(&service, &template, "k-1", &alice);
        let deleted = service.process_single(
            &RawOperation::new(
                "DELETE_INSPECTION",
                "k-2",
                json!({"id": id.to_string(), "version": 1}),
            ),
            &alice,
        );
        assert_eq!(deleted.outcome, Outcome::Applied);

        assert!(service.list_inspections(&alice, 50, 0).unwrap().is_empty());
        assert!(matches!(service.get_inspection(&alice, &id), Err(Error::NotFound(_))));

        let all = service
            .admin_list_inspections(&InspectionQuery {
                include_deleted: true,
                limit: 50,
                ..InspectionQuery::default()
            })
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted);
    }

    #[test]
    fn conflict_resolution_is_scoped_to_owner_or_manager() {
        let (_tmp, service, template) = service();
        let alice = Identity::inspector("alice");
        let id = create(&service, &template, "k-1", &alice);
        let conflicted = service.process_single(
            &RawOperation::new(
                "UPDATE_INSPECTION",
                "k-2",
                json!({"id": id.to_string(), "version": 3}),
            ),
            &alice,
        );
        let OperationResult::Conflict(conflict) = conflicted.result else {
            panic!("expected conflict");
        };
        let conflict_id = conflict.conflict_data.conflict_id;

        assert!(service
            .list_conflicts(&Identity::inspector("bob"), &ConflictFilter::default())
            .unwrap()
            .is_empty());
        let err = service
            .resolve_conflict(
                &Identity::inspector("bob"),
                conflict_id,
                ResolutionStrategy::KeepMine,
            )
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let resolved = service
            .resolve_conflict(&alice, conflict_id, ResolutionStrategy::KeepTheirs)
            .unwrap();
        assert!(resolved.resolved);
        let err = service
            .resolve_conflict(&Identity::manager("m"), conflict_id, ResolutionStrategy::Merge)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyResolved(_)));
    }

    #[test]
    fn history_lists_only_the_callers_operations() {
        let (_tmp, service, template) = service();
        let alice = Identity::inspector("alice");
        create(&service, &template, "k-1", &alice);
        create(&service, &template, "k-2", &Identity::inspector("bob"));

        let history = service.history(&alice, 50, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].idempotency_key, "k-1");
    }

    #[test]
    fn templates_require_name_and_array() {
        let (_tmp, service, _template) = service();
        assert!(service.add_template("  ", json!([])).is_err());
        assert!(service.add_template("Pumps", json!({})).is_err());
        assert_eq!(service.list_templates(10).unwrap().len(), 1);
    }
}
