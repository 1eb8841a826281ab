use std::path::{Path, PathBuf};

use clap::Parser;
use fieldsync_core::models::{ConflictFilter, ResolutionStrategy};
use fieldsync_core::sync::{OperationResult, RawOperation};
use fieldsync_core::{Identity, InspectionId};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use crate::cli::{Cli, CompletionShell, Commands, ConflictCommands, StrategyArg};
use crate::commands::common::{format_relative_time, format_timestamp, open_service, short_id};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{build_filter, format_conflict_lines, run_conflicts_resolve};
use crate::commands::inspections::format_inspection_lines;
use crate::commands::migrate::run_migrate;
use crate::commands::template::{parse_checklist, run_template_add};
use crate::error::CliError;

fn temp_db() -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("fieldsync.db");
    (tmp, path)
}

/// Creates an inspection and forces one version conflict against it
fn seed_conflict(db_path: &Path) -> (InspectionId, i64) {
    let service = open_service(db_path).unwrap();
    let template = service
        .add_template("Boiler", json!([{"id": "pressure"}]))
        .unwrap();
    let inspector = Identity::inspector("alice");

    let created = service.process_single(
        &RawOperation::new(
            "CREATE_INSPECTION",
            "create-1",
            json!({"template_id": template.id.to_string(), "facility_name": "Plant A"}),
        ),
        &inspector,
    );
    let OperationResult::Success(success) = created.result else {
        panic!("create failed: {:?}", created.result);
    };
    let id: InspectionId = success.data["id"].as_str().unwrap().parse().unwrap();

    let stale = service.process_single(
        &RawOperation::new(
            "UPDATE_INSPECTION",
            "update-stale",
            json!({"id": id.to_string(), "version": 7, "facility_name": "Plant B"}),
        ),
        &inspector,
    );
    let OperationResult::Conflict(conflict) = stale.result else {
        panic!("expected conflict: {:?}", stale.result);
    };
    (id, conflict.conflict_data.conflict_id)
}

#[test]
fn cli_parses_conflict_resolution() {
    let cli = Cli::try_parse_from([
        "fieldsync",
        "--db-path",
        "/tmp/x.db",
        "conflicts",
        "resolve",
        "12",
        "--strategy",
        "keep-theirs",
    ])
    .unwrap();

    assert_eq!(cli.db_path, PathBuf::from("/tmp/x.db"));
    let Commands::Conflicts {
        command:
            ConflictCommands::Resolve {
                id,
                strategy,
                as_user,
                json,
            },
    } = cli.command
    else {
        panic!("expected conflicts resolve");
    };
    assert_eq!(id, 12);
    assert_eq!(strategy, StrategyArg::KeepTheirs);
    assert_eq!(ResolutionStrategy::from(strategy), ResolutionStrategy::KeepTheirs);
    assert_eq!(as_user, "admin");
    assert!(!json);
}

#[test]
fn cli_requires_a_subcommand() {
    assert!(Cli::try_parse_from(["fieldsync"]).is_err());
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn short_id_keeps_short_values() {
    assert_eq!(short_id("0192f0c1-aaaa"), "0192f0c1");
    assert_eq!(short_id("abc"), "abc");
}

#[test]
fn parse_checklist_requires_json_array() {
    assert!(parse_checklist(r#"[{"id": "doors"}]"#).is_ok());
    assert!(matches!(
        parse_checklist(r#"{"id": "doors"}"#),
        Err(CliError::InvalidChecklist(_))
    ));
    assert!(matches!(
        parse_checklist("not json"),
        Err(CliError::InvalidChecklist(_))
    ));
}

#[test]
fn build_filter_validates_entity_id_and_limit() {
    let filter = build_filter(None, true, 20).unwrap();
    assert_eq!(
        filter,
        ConflictFilter {
            entity_id: None,
            resolved: Some(false),
            limit: Some(20),
            offset: None,
        }
    );

    assert!(matches!(
        build_filter(Some("nope"), false, 20),
        Err(CliError::InvalidInspectionId(_))
    ));
    assert!(matches!(build_filter(None, false, 0), Err(CliError::ZeroLimit)));

    let id = InspectionId::new();
    let filter = build_filter(Some(&format!(" {id} ")), false, 5).unwrap();
    assert_eq!(filter.entity_id, Some(id));
    assert_eq!(filter.resolved, None);
}

#[test]
fn run_migrate_creates_database() {
    let (_tmp, path) = temp_db();
    run_migrate(&path).unwrap();
    assert!(path.exists());

    let version = open_service(&path).unwrap().database().schema_version().unwrap();
    assert_eq!(version, fieldsync_core::db::SCHEMA_VERSION);
}

#[test]
fn run_template_add_persists_template() {
    let (_tmp, path) = temp_db();
    run_template_add("  Fire exits  ", r#"[{"id": "signage"}]"#, true, &path).unwrap();

    let templates = open_service(&path).unwrap().list_templates(10).unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "Fire exits");

    let err = run_template_add(" ", "[]", false, &path).unwrap_err();
    assert!(matches!(err, CliError::Core(fieldsync_core::Error::InvalidInput(_))));
}

#[test]
fn run_conflicts_resolve_marks_conflict_once() {
    let (_tmp, path) = temp_db();
    let (entity_id, conflict_id) = seed_conflict(&path);

    run_conflicts_resolve(conflict_id, ResolutionStrategy::Merge, "ops", false, &path).unwrap();

    let service = open_service(&path).unwrap();
    let conflicts = service
        .list_conflicts(
            &Identity::manager("auditor"),
            &build_filter(Some(&entity_id.to_string()), false, 10).unwrap(),
        )
        .unwrap();
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].resolved);
    assert_eq!(conflicts[0].resolved_by.as_deref(), Some("ops"));
    assert_eq!(conflicts[0].resolution_strategy, Some(ResolutionStrategy::Merge));

    let err = run_conflicts_resolve(conflict_id, ResolutionStrategy::Merge, "ops", false, &path)
        .unwrap_err();
    assert!(matches!(
        err,
        CliError::Core(fieldsync_core::Error::AlreadyResolved(id)) if id == conflict_id
    ));
}

#[test]
fn format_conflict_lines_include_versions_and_state() {
    let (_tmp, path) = temp_db();
    let (entity_id, _) = seed_conflict(&path);
    let conflicts = open_service(&path)
        .unwrap()
        .list_conflicts(&Identity::manager("auditor"), &ConflictFilter::default())
        .unwrap();

    let rendered = format_conflict_lines(&conflicts);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains(&entity_id.to_string()));
    assert!(rendered[0].contains("client=7 server=1"));
    assert!(rendered[0].ends_with("open"));
}

#[test]
fn format_inspection_lines_flag_deleted_rows() {
    let (_tmp, path) = temp_db();
    let (entity_id, _) = seed_conflict(&path);
    let service = open_service(&path).unwrap();
    let deleted = service.process_single(
        &RawOperation::new(
            "DELETE_INSPECTION",
            "delete-1",
            json!({"id": entity_id.to_string(), "version": 1}),
        ),
        &Identity::inspector("alice"),
    );
    assert!(matches!(deleted.result, OperationResult::Success(_)));

    let query = fieldsync_core::db::InspectionQuery {
        inspector: None,
        include_deleted: true,
        limit: 10,
        offset: 0,
    };
    let inspections = service.admin_list_inspections(&query).unwrap();
    let rendered = format_inspection_lines(&inspections, i64::MAX);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("Plant A"));
    assert!(rendered[0].contains("v2"));
    assert!(rendered[0].ends_with("[deleted]"));
}

#[test]
fn run_completions_writes_bash_script_file() {
    let (_tmp, path) = temp_db();
    let output_path = path.with_extension("bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_fieldsync()"));
    assert!(script.contains("complete -F _fieldsync"));
}
