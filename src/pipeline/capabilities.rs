//! Publish capabilities
//!
//! The set of sinks available to a run, resolved once from configuration.
//! Optional transports are either present here or absent; sinks never
//! re-check configuration at send time.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::errors::ConfigurationError;

use super::sinks::{
    ArchiveSink, HttpMailer, HttpMessageBus, HttpObjectStore, Mailer, MessageBus,
    NotificationTemplate, ObjectStore,
};

/// Object store plus the identifiers its keys are derived from
#[derive(Clone)]
pub struct ObjectStoreCapability {
    pub store: Arc<dyn ObjectStore>,
    pub event_id: String,
    pub result_id: String,
}

#[derive(Clone)]
pub struct NotificationCapability {
    pub mailer: Arc<dyn Mailer>,
    pub template: NotificationTemplate,
}

#[derive(Clone)]
pub struct PublishCapabilities {
    pub output_dir: PathBuf,
    pub archive: ArchiveSink,
    pub bus: Arc<dyn MessageBus>,
    pub object_store: Option<ObjectStoreCapability>,
    pub notification: Option<NotificationCapability>,
}

impl PublishCapabilities {
    /// Archive and messaging only
    pub fn new<P: Into<PathBuf>>(
        output_dir: P,
        archive_file_name: &str,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            archive: ArchiveSink::new(output_dir.clone(), archive_file_name),
            output_dir,
            bus,
            object_store: None,
            notification: None,
        }
    }

    pub fn with_object_store(
        mut self,
        store: Arc<dyn ObjectStore>,
        event_id: &str,
        result_id: &str,
    ) -> Self {
        self.object_store = Some(ObjectStoreCapability {
            store,
            event_id: event_id.to_string(),
            result_id: result_id.to_string(),
        });
        self
    }

    pub fn with_notification(
        mut self,
        mailer: Arc<dyn Mailer>,
        template: NotificationTemplate,
    ) -> Self {
        self.notification = Some(NotificationCapability { mailer, template });
        self
    }

    /// Build the HTTP transports a validated configuration asks for
    pub fn resolve(config: &Config) -> Result<Self, ConfigurationError> {
        let bus = HttpMessageBus::new(&config.bus.url, config.bus.timeout)
            .map_err(|e| ConfigurationError::invalid("bus.url", e.to_string()))?;
        let mut capabilities = Self::new(
            config.output.output_dir.clone(),
            &config.output.archive_file_name,
            Arc::new(bus),
        );

        if config.object_store.enabled {
            let required_by = "the object store is enabled";
            let bucket = required(&config.object_store.bucket, "object_store.bucket", required_by)?;
            let event_id = required(&config.event.event_id, "event.event_id", required_by)?;
            let result_id = required(&config.event.result_id, "event.result_id", required_by)?;
            let store = HttpObjectStore::new(
                &config.object_store.endpoint,
                bucket,
                config.object_store.timeout,
            )
            .map_err(|e| ConfigurationError::invalid("object_store.endpoint", e.to_string()))?;
            capabilities = capabilities.with_object_store(Arc::new(store), event_id, result_id);
        }

        let notification = &config.notification;
        if !notification.recipients.is_empty() {
            let required_by = "notification recipients are configured";
            if capabilities.object_store.is_none() {
                return Err(ConfigurationError::missing(
                    "object_store.enabled",
                    required_by,
                ));
            }
            let gateway_url =
                required(&notification.gateway_url, "notification.gateway_url", required_by)?;
            let template = NotificationTemplate {
                recipients: notification.recipients.clone(),
                sender: required(&notification.sender, "notification.sender", required_by)?
                    .to_string(),
                region_tag: required(
                    &notification.region_tag,
                    "notification.region_tag",
                    required_by,
                )?
                .to_string(),
                environment_tag: required(
                    &notification.environment_tag,
                    "notification.environment_tag",
                    required_by,
                )?
                .to_string(),
                magnitude_type: required(
                    &config.location.magnitude_type,
                    "location.magnitude_type",
                    required_by,
                )?
                .to_string(),
                magnitude_value: config.location.magnitude_value.ok_or_else(|| {
                    ConfigurationError::missing("location.magnitude_value", required_by)
                })?,
                event_id: required(&config.event.event_id, "event.event_id", required_by)?
                    .to_string(),
                result_id: required(&config.event.result_id, "event.result_id", required_by)?
                    .to_string(),
            };
            let mailer = HttpMailer::new(gateway_url, notification.timeout).map_err(|e| {
                ConfigurationError::invalid("notification.gateway_url", e.to_string())
            })?;
            capabilities = capabilities.with_notification(Arc::new(mailer), template);
        }

        info!(
            "Publish capabilities resolved: object_store={} notification={}",
            capabilities.object_store.is_some(),
            capabilities.notification.is_some()
        );
        Ok(capabilities)
    }
}

fn required<'a>(
    value: &'a Option<String>,
    option: &'static str,
    required_by: &str,
) -> Result<&'a str, ConfigurationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigurationError::missing(option, required_by))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;

    fn base_config() -> Config {
        let mut config = Config::default();
        config.input.result_file = Some(PathBuf::from("/data/wphase_output.json"));
        config
    }

    #[test]
    fn test_default_capabilities() {
        let capabilities = PublishCapabilities::resolve(&base_config()).unwrap();
        assert!(capabilities.object_store.is_none());
        assert!(capabilities.notification.is_none());
        assert!(capabilities.archive.path().ends_with("wphase_seiscomp.xml"));
    }

    #[test]
    fn test_full_capabilities() {
        let mut config = base_config();
        config.event.event_id = Some("ga2020abcd".to_string());
        config.event.result_id = Some("r1".to_string());
        config.object_store.enabled = true;
        config.object_store.bucket = Some("wphase-results".to_string());
        config.location.magnitude_type = Some("Mww".to_string());
        config.location.magnitude_value = Some(7.1);
        config.notification = NotificationConfig {
            recipients: vec!["duty@example.org".to_string()],
            sender: Some("wphase@example.org".to_string()),
            region_tag: Some("au".to_string()),
            environment_tag: Some("prod".to_string()),
            gateway_url: Some("http://mail.internal/send".to_string()),
            ..NotificationConfig::default()
        };

        let capabilities = PublishCapabilities::resolve(&config).unwrap();
        let store = capabilities.object_store.as_ref().unwrap();
        assert_eq!(store.store.bucket(), "wphase-results");
        assert_eq!(store.event_id, "ga2020abcd");
        let notification = capabilities.notification.as_ref().unwrap();
        assert_eq!(notification.template.magnitude_type, "Mww");
    }

    #[test]
    fn test_notification_without_object_store_is_refused() {
        let mut config = base_config();
        config.notification.recipients = vec!["duty@example.org".to_string()];

        assert!(matches!(
            PublishCapabilities::resolve(&config),
            Err(ConfigurationError::MissingOption {
                option: "object_store.enabled",
                ..
            })
        ));
    }
}
