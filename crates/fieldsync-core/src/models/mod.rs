//! Data models for fieldsync

mod conflict;
mod identity;
mod inspection;
mod sync_operation;
mod template;

pub use conflict::{ConflictFilter, ConflictId, ConflictRecord, ResolutionStrategy};
pub use identity::{Identity, Role};
pub use inspection::{Inspection, InspectionId, InspectionStatus};
pub use sync_operation::SyncOperation;
pub use template::{Template, TemplateId};
