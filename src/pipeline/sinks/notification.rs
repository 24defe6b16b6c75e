//! Email notification sink
//!
//! Sent last, after the object store upload, because the message points
//! readers at the uploaded result.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::errors::{SinkError, SinkResult};

/// Everything the notification needs that is fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTemplate {
    pub recipients: Vec<String>,
    pub sender: String,
    pub region_tag: String,
    pub environment_tag: String,
    pub magnitude_type: String,
    pub magnitude_value: f64,
    pub event_id: String,
    pub result_id: String,
}

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipients: Vec<String>,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub success: bool,
    pub bucket: String,
    pub event_id: String,
    pub result_id: String,
    pub environment: String,
}

impl NotificationTemplate {
    /// Render for one run
    ///
    /// `success` is whether the raw result carried a moment tensor section,
    /// independent of whether a graph was published.
    pub fn render(&self, success: bool, bucket: &str) -> Notification {
        let outcome = if success { "succeeded" } else { "FAILED" };
        let subject = format!(
            "[{}] W-phase {} for {} {}{:.1} ({})",
            self.environment_tag,
            outcome,
            self.event_id,
            self.magnitude_type,
            self.magnitude_value,
            self.region_tag
        );
        let body = format!(
            "W-phase inversion {outcome} for event {event} ({mag_type} {mag:.1}).\n\
             Region: {region}\n\
             Environment: {env}\n\
             Result: s3://{bucket}/{event}/{result}/\n",
            event = self.event_id,
            mag_type = self.magnitude_type,
            mag = self.magnitude_value,
            region = self.region_tag,
            env = self.environment_tag,
            result = self.result_id,
        );

        Notification {
            recipients: self.recipients.clone(),
            sender: self.sender.clone(),
            subject,
            body,
            success,
            bucket: bucket.to_string(),
            event_id: self.event_id.clone(),
            result_id: self.result_id.clone(),
            environment: self.environment_tag.clone(),
        }
    }
}

/// Email delivery transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> SinkResult<()>;
}

/// Posts notifications as JSON to a mail gateway
pub struct HttpMailer {
    client: Client,
    gateway_url: String,
}

impl HttpMailer {
    pub fn new(gateway_url: &str, timeout: Duration) -> SinkResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wphase-publish/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            gateway_url: gateway_url.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, notification: &Notification) -> SinkResult<()> {
        let response = self
            .client
            .post(&self.gateway_url)
            .json(notification)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::transport(
                "notification",
                format!("mail gateway returned HTTP {status}"),
            ));
        }

        info!(
            "Notification sent: recipients={} success={}",
            notification.recipients.len(),
            notification.success
        );
        Ok(())
    }
}
