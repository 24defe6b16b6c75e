//! Change tracking for the notifier replay
//!
//! The downstream consumer rebuilds its view of the event from an ordered
//! list of "added" notifications. Entries are recorded while the graph is
//! being wired; once the tracker is sealed no further entry is accepted,
//! which is what keeps child attachment out of the log.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GraphBuildError;
use crate::models::{FocalMechanismReference, OriginReference};

/// Operation carried by a change log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Add,
}

/// The object an entry adds
///
/// Entities are recorded by identity and resolved against the graph when
/// the log is replayed; reference records are small and carried whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChangeObject {
    Origin { public_id: String },
    OriginReference(OriginReference),
    FocalMechanism { public_id: String },
    FocalMechanismReference(FocalMechanismReference),
}

impl ChangeObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeObject::Origin { .. } => "Origin",
            ChangeObject::OriginReference(_) => "OriginReference",
            ChangeObject::FocalMechanism { .. } => "FocalMechanism",
            ChangeObject::FocalMechanismReference(_) => "FocalMechanismReference",
        }
    }
}

/// One notification: `operation` applied to `object` under `parent_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub parent_id: String,
    pub operation: ChangeOperation,
    pub object: ChangeObject,
}

/// Ordered, immutable change log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object kinds in emission order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.object.kind()).collect()
    }
}

/// Records additions under one external parent identity
#[derive(Debug)]
pub struct ChangeTracker {
    parent_id: String,
    entries: Vec<ChangeLogEntry>,
    sealed: bool,
}

impl ChangeTracker {
    pub fn new<S: Into<String>>(parent_id: S) -> Self {
        Self {
            parent_id: parent_id.into(),
            entries: Vec::new(),
            sealed: false,
        }
    }

    /// Append an ADD entry; fails once the tracker is sealed
    pub fn record(&mut self, object: ChangeObject) -> Result<(), GraphBuildError> {
        if self.sealed {
            return Err(GraphBuildError::ChangeLogSealed {
                kind: object.kind(),
            });
        }

        debug!(
            "Change recorded: parent={} op=ADD kind={} position={}",
            self.parent_id,
            object.kind(),
            self.entries.len()
        );
        self.entries.push(ChangeLogEntry {
            parent_id: self.parent_id.clone(),
            operation: ChangeOperation::Add,
            object,
        });
        Ok(())
    }

    /// Stop accepting entries
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn into_log(self) -> ChangeLog {
        ChangeLog {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_emission_order() {
        let mut tracker = ChangeTracker::new("ga2020abcd");
        tracker
            .record(ChangeObject::Origin {
                public_id: "smi:ga/Origin/1".to_string(),
            })
            .unwrap();
        tracker
            .record(ChangeObject::OriginReference(OriginReference {
                origin_id: "smi:ga/Origin/1".to_string(),
            }))
            .unwrap();

        let log = tracker.into_log();
        assert_eq!(log.kinds(), vec!["Origin", "OriginReference"]);
        assert!(log.entries().iter().all(|e| e.parent_id == "ga2020abcd"));
        assert!(log
            .entries()
            .iter()
            .all(|e| e.operation == ChangeOperation::Add));
    }

    #[test]
    fn test_sealed_tracker_rejects_entries() {
        let mut tracker = ChangeTracker::new("ga2020abcd");
        tracker.seal();
        assert!(tracker.is_sealed());

        let err = tracker
            .record(ChangeObject::FocalMechanism {
                public_id: "smi:ga/FocalMechanism/1".to_string(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            GraphBuildError::ChangeLogSealed {
                kind: "FocalMechanism"
            }
        );
        assert!(tracker.into_log().is_empty());
    }

    #[test]
    fn test_entry_serialization_shape() {
        let entry = ChangeLogEntry {
            parent_id: "ga2020abcd".to_string(),
            operation: ChangeOperation::Add,
            object: ChangeObject::FocalMechanismReference(FocalMechanismReference {
                focal_mechanism_id: "smi:ga/FocalMechanism/1".to_string(),
            }),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["parentId"], "ga2020abcd");
        assert_eq!(json["operation"], "ADD");
        assert_eq!(json["object"]["type"], "focalMechanismReference");
        assert_eq!(json["object"]["focalMechanismId"], "smi:ga/FocalMechanism/1");
    }
}
