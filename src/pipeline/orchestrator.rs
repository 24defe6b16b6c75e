//! Publish orchestrator
//!
//! Runs the sinks in a fixed order: archive, messaging, object store,
//! notification. Each sink's failure is recorded in the report and never
//! stops the sinks after it; nothing escapes `publish`.

use tracing::{error, info, warn};

use crate::errors::SinkError;
use crate::graph::ChangeLog;
use crate::models::DomainGraph;
use crate::utils::datetime::DateTimeParser;
use crate::utils::run_log::RunLog;

use super::capabilities::PublishCapabilities;
use super::report::{PublishReport, Severity, SinkKind, SinkStatus};
use super::sinks::{NotifierMessage, OutputUploader};

/// What one run hands to the sinks
#[derive(Debug, Clone, Copy)]
pub struct PublishInput<'a> {
    /// Graph and change log, absent when normalization or building failed
    pub graph: Option<(&'a DomainGraph, &'a ChangeLog)>,
    /// Whether the raw result carried a moment tensor section
    pub result_has_solution: bool,
    /// Run log to upload, then delete
    pub run_log: Option<&'a RunLog>,
}

pub struct PublishOrchestrator {
    capabilities: PublishCapabilities,
}

impl PublishOrchestrator {
    pub fn new(capabilities: PublishCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &PublishCapabilities {
        &self.capabilities
    }

    /// Attempt every enabled sink once, in order
    pub async fn publish(&self, input: PublishInput<'_>) -> PublishReport {
        let mut report = PublishReport::new();
        info!(
            "Publishing: graph={} object_store={} notification={}",
            input.graph.is_some(),
            self.capabilities.object_store.is_some(),
            self.capabilities.notification.is_some()
        );

        match input.graph {
            Some((graph, change_log)) => {
                self.publish_archive(&mut report, graph).await;
                self.publish_messaging(&mut report, graph, change_log).await;
            }
            None => {
                for sink in [SinkKind::Archive, SinkKind::Messaging] {
                    warn!("Sink skipped: sink={} reason=no domain graph", sink);
                    report.record(
                        sink,
                        SinkStatus::Skipped {
                            reason: "no domain graph".to_string(),
                        },
                        None,
                        DateTimeParser::now_utc(),
                    );
                }
            }
        }

        if self.capabilities.object_store.is_some() {
            self.publish_object_store(&mut report, input.run_log).await;
        }
        if self.capabilities.notification.is_some() {
            self.publish_notification(&mut report, input.result_has_solution)
                .await;
        }

        info!("Publish finished: {}", report);
        report
    }

    async fn publish_archive(&self, report: &mut PublishReport, graph: &DomainGraph) {
        let started_at = DateTimeParser::now_utc();
        let result = self.capabilities.archive.write(graph).await;
        record(
            report,
            SinkKind::Archive,
            result.map(|path| Some(path.display().to_string())),
            started_at,
        );
    }

    async fn publish_messaging(
        &self,
        report: &mut PublishReport,
        graph: &DomainGraph,
        change_log: &ChangeLog,
    ) {
        let started_at = DateTimeParser::now_utc();
        let result = match NotifierMessage::from_change_log(change_log, graph) {
            Ok(message) => self
                .capabilities
                .bus
                .send(&message)
                .await
                .map(|()| {
                    Some(format!(
                        "group={} notifiers={}",
                        message.group,
                        message.notifiers.len()
                    ))
                }),
            Err(e) => Err(e),
        };
        record(report, SinkKind::Messaging, result, started_at);
    }

    async fn publish_object_store(&self, report: &mut PublishReport, run_log: Option<&RunLog>) {
        let Some(capability) = &self.capabilities.object_store else {
            return;
        };
        let started_at = DateTimeParser::now_utc();

        let result = match OutputUploader::new(
            capability.store.as_ref(),
            &capability.event_id,
            &capability.result_id,
        ) {
            Ok(uploader) => uploader
                .upload(&self.capabilities.output_dir, run_log.map(RunLog::path))
                .await
                .map(|keys| {
                    Some(format!(
                        "bucket={} objects={}",
                        capability.store.bucket(),
                        keys.len()
                    ))
                }),
            Err(e) => Err(e),
        };

        // Uploaded or not, the log belongs to this run only
        if let Some(run_log) = run_log {
            run_log.remove();
        }

        record(report, SinkKind::ObjectStore, result, started_at);
    }

    async fn publish_notification(
        &self,
        report: &mut PublishReport,
        result_has_solution: bool,
    ) {
        let Some(capability) = &self.capabilities.notification else {
            return;
        };
        let Some(store) = &self.capabilities.object_store else {
            return;
        };
        let started_at = DateTimeParser::now_utc();

        let notification = capability
            .template
            .render(result_has_solution, store.store.bucket());
        let result = capability
            .mailer
            .send(&notification)
            .await
            .map(|()| Some(format!("recipients={}", notification.recipients.len())));
        record(report, SinkKind::Notification, result, started_at);
    }
}

fn record(
    report: &mut PublishReport,
    sink: SinkKind,
    result: Result<Option<String>, SinkError>,
    started_at: chrono::DateTime<chrono::Utc>,
) {
    match result {
        Ok(detail) => {
            info!(
                "Sink succeeded: sink={} detail={}",
                sink,
                detail.as_deref().unwrap_or("-")
            );
            report.record(sink, SinkStatus::Succeeded, detail, started_at);
        }
        Err(e) => {
            match sink.severity() {
                Severity::Warning => warn!("Sink failed: sink={} error={}", sink, e),
                Severity::Error => error!("Sink failed: sink={} error={}", sink, e),
            }
            report.record(
                sink,
                SinkStatus::Failed {
                    message: e.to_string(),
                },
                None,
                started_at,
            );
        }
    }
}
