//! Domain graph construction and change tracking

pub mod builder;
pub mod change_log;

pub use builder::{FieldDiagnostics, ObjectGraphBuilder};
pub use change_log::{ChangeLog, ChangeLogEntry, ChangeObject, ChangeOperation, ChangeTracker};
