use std::path::Path;

use fieldsync_core::db::SCHEMA_VERSION;

use crate::commands::common::open_service;
use crate::error::CliError;

pub fn run_migrate(db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let version = service.database().schema_version()?;
    tracing::debug!(version, expected = SCHEMA_VERSION, "Migrations applied");
    println!("{} is at schema version {version}", db_path.display());
    Ok(())
}
