//! Utility modules for the W-phase publisher
//!
//! - `utils::datetime` for payload timestamp parsing and archive formatting
//! - `utils::deterministic_uuid` for stable public identifiers
//! - `utils::run_log` for the per-run log file

pub mod datetime;
pub mod deterministic_uuid;
pub mod run_log;

pub use datetime::DateTimeParser;
pub use run_log::RunLog;
