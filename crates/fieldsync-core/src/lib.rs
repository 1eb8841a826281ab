//! fieldsync-core - Core library for fieldsync
//!
//! This crate contains the inspection models, database layer, and the batch
//! synchronization engine used by the API server and the admin CLI.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Identity, Inspection, InspectionId, Role};
pub use services::{SyncService, SyncSettings};
