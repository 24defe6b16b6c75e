//! Publish report
//!
//! One [`SinkOutcome`] per sink that ran or was skipped. Sinks disabled by
//! configuration never appear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::datetime::DateTimeParser;

/// Publish sinks, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Archive,
    Messaging,
    ObjectStore,
    Notification,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Archive => "archive",
            SinkKind::Messaging => "messaging",
            SinkKind::ObjectStore => "object_store",
            SinkKind::Notification => "notification",
        }
    }

    /// How a failure of this sink is reported
    pub fn severity(&self) -> Severity {
        match self {
            SinkKind::Archive => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SinkStatus {
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkOutcome {
    pub sink: SinkKind,
    pub status: SinkStatus,
    pub severity: Severity,
    /// Sink-specific detail: archive path, bus group, uploaded key count
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SinkOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SinkStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, SinkStatus::Failed { .. })
    }

    /// Whether the sink actually ran
    pub fn was_attempted(&self) -> bool {
        !matches!(self.status, SinkStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    outcomes: Vec<SinkOutcome>,
}

impl PublishReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        sink: SinkKind,
        status: SinkStatus,
        detail: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        self.outcomes.push(SinkOutcome {
            sink,
            status,
            severity: sink.severity(),
            detail,
            started_at,
            completed_at: DateTimeParser::now_utc(),
        });
    }

    pub fn outcomes(&self) -> &[SinkOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, sink: SinkKind) -> Option<&SinkOutcome> {
        self.outcomes.iter().find(|o| o.sink == sink)
    }

    /// Sinks in the order they were recorded
    pub fn sinks(&self) -> Vec<SinkKind> {
        self.outcomes.iter().map(|o| o.sink).collect()
    }

    pub fn failures(&self) -> Vec<&SinkOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(SinkOutcome::is_success)
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| {
                let status = match &o.status {
                    SinkStatus::Succeeded => "ok",
                    SinkStatus::Failed { .. } => "failed",
                    SinkStatus::Skipped { .. } => "skipped",
                };
                format!("{}={}", o.sink, status)
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_sink() {
        let mut report = PublishReport::new();
        let now = DateTimeParser::now_utc();
        report.record(
            SinkKind::Archive,
            SinkStatus::Failed {
                message: "disk full".to_string(),
            },
            None,
            now,
        );
        report.record(SinkKind::Messaging, SinkStatus::Succeeded, None, now);

        assert_eq!(report.outcome(SinkKind::Archive).unwrap().severity, Severity::Warning);
        assert_eq!(report.outcome(SinkKind::Messaging).unwrap().severity, Severity::Error);
        assert_eq!(report.failures().len(), 1);
        assert!(!report.all_succeeded());
        assert!(report.outcome(SinkKind::ObjectStore).is_none());
        assert_eq!(report.to_string(), "archive=failed messaging=ok");
    }

    #[test]
    fn test_skipped_is_not_attempted() {
        let mut report = PublishReport::new();
        report.record(
            SinkKind::Messaging,
            SinkStatus::Skipped {
                reason: "no domain graph".to_string(),
            },
            None,
            DateTimeParser::now_utc(),
        );

        let outcome = report.outcome(SinkKind::Messaging).unwrap();
        assert!(!outcome.was_attempted());
        assert!(!outcome.is_failure());
        assert_eq!(report.sinks(), vec![SinkKind::Messaging]);
    }
}
