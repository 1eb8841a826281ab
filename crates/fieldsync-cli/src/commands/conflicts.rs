use std::path::Path;

use fieldsync_core::models::{ConflictFilter, ConflictRecord, InspectionId, ResolutionStrategy};

use crate::commands::common::{
    admin_identity, ensure_limit, format_timestamp, open_service, print_json, print_lines,
};
use crate::error::CliError;

const LIST_ACTOR: &str = "fieldsync-cli";

pub fn run_conflicts_list(
    entity_id: Option<&str>,
    unresolved: bool,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let filter = build_filter(entity_id, unresolved, limit)?;
    let conflicts = open_service(db_path)?.list_conflicts(&admin_identity(LIST_ACTOR), &filter)?;

    if as_json {
        return print_json(&conflicts);
    }
    print_lines(&format_conflict_lines(&conflicts), "No conflicts");
    Ok(())
}

pub fn run_conflicts_resolve(
    id: i64,
    strategy: ResolutionStrategy,
    as_user: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let record = open_service(db_path)?.resolve_conflict(&admin_identity(as_user), id, strategy)?;

    if as_json {
        return print_json(&record);
    }
    println!("Resolved conflict {} ({strategy})", record.id);
    Ok(())
}

pub fn build_filter(
    entity_id: Option<&str>,
    unresolved: bool,
    limit: usize,
) -> Result<ConflictFilter, CliError> {
    let entity_id = entity_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<InspectionId>()
                .map_err(|_| CliError::InvalidInspectionId(id.to_string()))
        })
        .transpose()?;

    Ok(ConflictFilter {
        entity_id,
        resolved: unresolved.then_some(false),
        limit: Some(ensure_limit(limit)?),
        offset: None,
    })
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let state = conflict
                .resolution_strategy
                .map_or_else(|| "open".to_string(), |strategy| strategy.to_string());
            format!(
                "#{:<5}  {}  {}  client={} server={}  {state}",
                conflict.id,
                format_timestamp(conflict.created_at),
                conflict.entity_id,
                conflict.client_version,
                conflict.server_version,
            )
        })
        .collect()
}
