pub mod common;
pub mod completions;
pub mod conflicts;
pub mod inspections;
pub mod migrate;
pub mod operations;
pub mod template;
