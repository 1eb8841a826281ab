use std::path::Path;

use fieldsync_core::db::InspectionQuery;
use fieldsync_core::util::normalize_text_option;
use fieldsync_core::Inspection;

use crate::commands::common::{
    ensure_limit, format_relative_time, now_ms, open_service, print_json, print_lines, short_id,
};
use crate::error::CliError;

pub fn run_inspections_list(
    include_deleted: bool,
    inspector: Option<String>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let query = InspectionQuery {
        inspector: normalize_text_option(inspector),
        include_deleted,
        limit: ensure_limit(limit)?,
        offset: 0,
    };
    let inspections = open_service(db_path)?.admin_list_inspections(&query)?;

    if as_json {
        return print_json(&inspections);
    }
    print_lines(&format_inspection_lines(&inspections, now_ms()), "No inspections");
    Ok(())
}

pub fn format_inspection_lines(inspections: &[Inspection], now_ms: i64) -> Vec<String> {
    inspections
        .iter()
        .map(|inspection| {
            let id = inspection.id.as_str();
            let deleted = if inspection.is_deleted { "  [deleted]" } else { "" };
            format!(
                "{}  {:<9}  v{:<3}  {:<24}  {:<16}  {}{deleted}",
                short_id(&id),
                inspection.status.as_str(),
                inspection.version,
                inspection.facility_name,
                inspection.inspector,
                format_relative_time(inspection.updated_at, now_ms),
            )
        })
        .collect()
}
