//! Messaging sink
//!
//! Replays the change log as one notifier message addressed to the focal
//! mechanism group. Entity entries are resolved against the graph at send
//! time, so the message carries each entity with its attached children.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::defaults::FOCAL_MECHANISM_GROUP;
use crate::errors::{SinkError, SinkResult};
use crate::graph::{ChangeLog, ChangeObject, ChangeOperation};
use crate::models::DomainGraph;

/// One resolved notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notifier {
    pub parent_id: String,
    pub operation: ChangeOperation,
    /// Object kind, e.g. `Origin` or `OriginReference`
    pub kind: String,
    pub object: serde_json::Value,
}

/// The single message sent per publish cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierMessage {
    pub group: String,
    pub notifiers: Vec<Notifier>,
}

impl NotifierMessage {
    /// Resolve every change log entry against the graph, keeping log order
    pub fn from_change_log(log: &ChangeLog, graph: &DomainGraph) -> SinkResult<Self> {
        let mut notifiers = Vec::with_capacity(log.len());
        for entry in log.entries() {
            let object = match &entry.object {
                ChangeObject::Origin { public_id } => {
                    if *public_id != graph.origin.public_id {
                        return Err(SinkError::MissingInput(format!(
                            "origin {public_id} is not part of the graph"
                        )));
                    }
                    to_json(&graph.origin)?
                }
                ChangeObject::FocalMechanism { public_id } => {
                    if *public_id != graph.focal_mechanism.public_id {
                        return Err(SinkError::MissingInput(format!(
                            "focal mechanism {public_id} is not part of the graph"
                        )));
                    }
                    to_json(&graph.focal_mechanism)?
                }
                ChangeObject::OriginReference(reference) => to_json(reference)?,
                ChangeObject::FocalMechanismReference(reference) => to_json(reference)?,
            };

            notifiers.push(Notifier {
                parent_id: entry.parent_id.clone(),
                operation: entry.operation,
                kind: entry.object.kind().to_string(),
                object,
            });
        }

        Ok(Self {
            group: FOCAL_MECHANISM_GROUP.to_string(),
            notifiers,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> SinkResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| SinkError::serialization(e.to_string()))
}

/// Message bus transport
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn send(&self, message: &NotifierMessage) -> SinkResult<()>;
}

/// Posts notifier messages to an HTTP messaging gateway
pub struct HttpMessageBus {
    client: Client,
    base_url: String,
}

impl HttpMessageBus {
    pub fn new(base_url: &str, timeout: Duration) -> SinkResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wphase-publish/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, group: &str) -> String {
        format!("{}/groups/{}/messages", self.base_url, group)
    }
}

#[async_trait]
impl MessageBus for HttpMessageBus {
    async fn send(&self, message: &NotifierMessage) -> SinkResult<()> {
        let url = self.endpoint(&message.group);
        debug!("Posting notifier message: url={} notifiers={}", url, message.notifiers.len());

        let response = self.client.post(&url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::transport(
                "messaging",
                format!("HTTP {status}: {body}"),
            ));
        }

        info!("Notifier message accepted: group={} status={}", message.group, status);
        Ok(())
    }
}
