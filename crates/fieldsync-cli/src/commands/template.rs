use std::path::Path;

use fieldsync_core::models::Template;
use serde_json::Value;

use crate::commands::common::{
    ensure_limit, format_timestamp, open_service, print_json, print_lines,
};
use crate::error::CliError;

pub fn run_template_add(
    name: &str,
    items: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let checklist_items = parse_checklist(items)?;
    let template = open_service(db_path)?.add_template(name, checklist_items)?;

    if as_json {
        print_json(&template)
    } else {
        println!("{}", template.id);
        Ok(())
    }
}

pub fn run_template_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let templates = open_service(db_path)?.list_templates(ensure_limit(limit)?)?;

    if as_json {
        return print_json(&templates);
    }
    print_lines(&format_template_lines(&templates), "No templates");
    Ok(())
}

pub fn parse_checklist(items: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(items)
        .map_err(|error| CliError::InvalidChecklist(error.to_string()))?;
    if !value.is_array() {
        return Err(CliError::InvalidChecklist(format!("got {value}")));
    }
    Ok(value)
}

pub fn format_template_lines(templates: &[Template]) -> Vec<String> {
    templates
        .iter()
        .map(|template| {
            let item_count = template.checklist_items.as_array().map_or(0, Vec::len);
            format!(
                "{}  {:<30}  v{}  {item_count} items  {}",
                template.id,
                template.name,
                template.version,
                format_timestamp(template.created_at)
            )
        })
        .collect()
}
