use std::path::Path;

use fieldsync_core::models::SyncOperation;
use fieldsync_core::Identity;

use crate::commands::common::{
    ensure_limit, format_timestamp, open_service, print_json, print_lines,
};
use crate::error::CliError;

pub fn run_operations_list(
    user: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let identity = Identity::inspector(user.trim());
    let operations = open_service(db_path)?.history(&identity, ensure_limit(limit)?, 0)?;

    if as_json {
        return print_json(&operations);
    }
    print_lines(&format_operation_lines(&operations), "No operations");
    Ok(())
}

pub fn format_operation_lines(operations: &[SyncOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            format!(
                "{}  {:<8}  {}  {}",
                format_timestamp(operation.processed_at),
                operation.operation_type,
                operation.entity_id,
                operation.idempotency_key,
            )
        })
        .collect()
}
