//! Publish pipeline: sinks, capabilities and the orchestrator that runs them

pub mod capabilities;
pub mod orchestrator;
pub mod report;
pub mod sinks;

pub use capabilities::{NotificationCapability, ObjectStoreCapability, PublishCapabilities};
pub use orchestrator::{PublishInput, PublishOrchestrator};
pub use report::{PublishReport, Severity, SinkKind, SinkOutcome, SinkStatus};
