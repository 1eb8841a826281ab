//! Database layer for fieldsync

mod connection;
mod inspection_repository;
mod migrations;
mod template_repository;

pub use connection::Database;
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use inspection_repository::{InspectionQuery, InspectionRepository, SqliteInspectionRepository};
pub use template_repository::{SqliteTemplateRepository, TemplateRepository};
