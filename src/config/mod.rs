use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::ConfigurationError;
use crate::pipeline::sinks::object_store::check_key_segment;
use crate::utils::datetime::DateTimeParser;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Publisher configuration
///
/// Loaded from an optional TOML file and then overridden from the command
/// line. Every option is optional on its own; [`Config::validate`] enforces
/// the combinations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub event: EventConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub computation: ComputationConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Re-publish mode input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Previously produced JSON result file
    pub result_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Run log location; removed at the end of every run
    #[serde(default = "default_run_log_path")]
    pub run_log_path: PathBuf,
    #[serde(default = "default_archive_file_name")]
    pub archive_file_name: String,
    #[serde(default = "default_result_file_name")]
    pub result_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub event_id: Option<String>,
    pub result_id: Option<String>,
    #[serde(default = "default_agency")]
    pub agency: String,
    /// Human-readable region label passed to the computation
    pub region: Option<String>,
}

/// Compute mode event location and triggering magnitude
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Kilometres
    pub depth: Option<f64>,
    /// Origin time, RFC 3339 or `YYYY-MM-DD HH:MM:SS`
    pub time: Option<String>,
    pub source_zone: Option<String>,
    pub magnitude_type: Option<String>,
    pub magnitude_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationConfig {
    #[serde(default = "default_computation_command")]
    pub command: String,
    /// Upstream waveform server
    pub server: Option<String>,
    /// Network filter, comma separated
    pub networks: Option<String>,
    #[serde(default = "default_computation_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

/// Messaging bus; the routing group is fixed to [`FOCAL_MECHANISM_GROUP`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_url")]
    pub url: String,
    #[serde(default = "default_bus_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_object_store_endpoint")]
    pub endpoint: String,
    pub bucket: Option<String>,
    #[serde(default = "default_object_store_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Empty disables the notification sink
    #[serde(default)]
    pub recipients: Vec<String>,
    pub sender: Option<String>,
    pub region_tag: Option<String>,
    pub environment_tag: Option<String>,
    /// Mail gateway accepting JSON messages
    pub gateway_url: Option<String>,
    #[serde(default = "default_notification_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}
fn default_run_log_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_RUN_LOG_FILE_NAME)
}
fn default_archive_file_name() -> String {
    DEFAULT_ARCHIVE_FILE_NAME.to_string()
}
fn default_result_file_name() -> String {
    DEFAULT_RESULT_FILE_NAME.to_string()
}
fn default_agency() -> String {
    DEFAULT_AGENCY.to_string()
}
fn default_computation_command() -> String {
    DEFAULT_COMPUTATION_COMMAND.to_string()
}
fn default_computation_timeout() -> Duration {
    Duration::from_secs(DEFAULT_COMPUTATION_TIMEOUT_SECONDS)
}
fn default_bus_url() -> String {
    DEFAULT_BUS_URL.to_string()
}
fn default_bus_timeout() -> Duration {
    Duration::from_secs(DEFAULT_BUS_TIMEOUT_SECONDS)
}
fn default_object_store_endpoint() -> String {
    DEFAULT_OBJECT_STORE_ENDPOINT.to_string()
}
fn default_object_store_timeout() -> Duration {
    Duration::from_secs(DEFAULT_OBJECT_STORE_TIMEOUT_SECONDS)
}
fn default_notification_timeout() -> Duration {
    Duration::from_secs(DEFAULT_NOTIFICATION_TIMEOUT_SECONDS)
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            run_log_path: default_run_log_path(),
            archive_file_name: default_archive_file_name(),
            result_file_name: default_result_file_name(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            event_id: None,
            result_id: None,
            agency: default_agency(),
            region: None,
        }
    }
}

impl Default for ComputationConfig {
    fn default() -> Self {
        Self {
            command: default_computation_command(),
            server: None,
            networks: None,
            timeout: default_computation_timeout(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            timeout: default_bus_timeout(),
        }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_object_store_endpoint(),
            bucket: None,
            timeout: default_object_store_timeout(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            sender: None,
            region_tag: None,
            environment_tag: None,
            gateway_url: None,
            timeout: default_notification_timeout(),
        }
    }
}

impl LocationConfig {
    /// Whether any positional option (latitude, longitude, depth, time) was given
    ///
    /// Source zone and triggering magnitude describe the event in both modes
    /// and do not select compute mode on their own.
    pub fn is_position_set(&self) -> bool {
        self.latitude.is_some()
            || self.longitude.is_some()
            || self.depth.is_some()
            || self.time.is_some()
    }
}

/// How the run obtains its result
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Publish a previously produced result file
    Republish { result_file: PathBuf },
    /// Run the computation for a location first
    Compute,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> Result<Self, ConfigurationError> {
        let path = config_file.as_ref();
        let file_error = |message: String| ConfigurationError::File {
            path: path.display().to_string(),
            message,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        let config = toml::from_str(&contents).map_err(|e| file_error(e.to_string()))?;
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    }

    /// Load from `config_file` when given, defaults otherwise
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigurationError> {
        match config_file {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Run mode implied by the input options; call after [`Config::validate`]
    pub fn run_mode(&self) -> RunMode {
        match &self.input.result_file {
            Some(result_file) => RunMode::Republish {
                result_file: result_file.clone(),
            },
            None => RunMode::Compute,
        }
    }

    /// Check option combinations before any work is done
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_input()?;
        self.validate_event()?;
        self.validate_object_store()?;
        self.validate_notification()?;
        Ok(())
    }

    fn validate_input(&self) -> Result<(), ConfigurationError> {
        let location = &self.location;
        match (&self.input.result_file, location.is_position_set()) {
            (Some(_), true) => {
                return Err(ConfigurationError::Conflict {
                    first: "input.result_file",
                    second: "location",
                })
            }
            (None, false) => {
                return Err(ConfigurationError::missing(
                    "input.result_file",
                    "no location parameters are given",
                ))
            }
            (Some(_), false) => return Ok(()),
            (None, true) => {}
        }

        let required_by = "location parameters are given";
        let latitude = location
            .latitude
            .ok_or_else(|| ConfigurationError::missing("location.latitude", required_by))?;
        let longitude = location
            .longitude
            .ok_or_else(|| ConfigurationError::missing("location.longitude", required_by))?;
        let depth = location
            .depth
            .ok_or_else(|| ConfigurationError::missing("location.depth", required_by))?;
        let time = location
            .time
            .as_deref()
            .ok_or_else(|| ConfigurationError::missing("location.time", required_by))?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigurationError::invalid(
                "location.latitude",
                format!("{latitude} is outside [-90, 90]"),
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigurationError::invalid(
                "location.longitude",
                format!("{longitude} is outside [-180, 180]"),
            ));
        }
        if !depth.is_finite() || depth < 0.0 {
            return Err(ConfigurationError::invalid(
                "location.depth",
                format!("{depth} is not a depth in km"),
            ));
        }
        DateTimeParser::parse_flexible(time)
            .map_err(|e| ConfigurationError::invalid("location.time", e.to_string()))?;
        Ok(())
    }

    fn validate_event(&self) -> Result<(), ConfigurationError> {
        if self.event.agency.trim().is_empty() {
            return Err(ConfigurationError::invalid("event.agency", "must not be empty"));
        }
        Ok(())
    }

    fn validate_object_store(&self) -> Result<(), ConfigurationError> {
        if !self.object_store.enabled {
            return Ok(());
        }
        let required_by = "the object store is enabled";
        if is_blank(&self.object_store.bucket) {
            return Err(ConfigurationError::missing("object_store.bucket", required_by));
        }
        if is_blank(&self.event.event_id) {
            return Err(ConfigurationError::missing("event.event_id", required_by));
        }
        if is_blank(&self.event.result_id) {
            return Err(ConfigurationError::missing("event.result_id", required_by));
        }
        let segments = [
            ("event.event_id", &self.event.event_id),
            ("event.result_id", &self.event.result_id),
        ];
        for (option, value) in segments {
            if let Some(value) = value {
                check_key_segment(value)
                    .map_err(|message| ConfigurationError::invalid(option, message))?;
            }
        }
        Ok(())
    }

    fn validate_notification(&self) -> Result<(), ConfigurationError> {
        let notification = &self.notification;
        if notification.recipients.is_empty() {
            return Ok(());
        }
        let required_by = "notification recipients are configured";

        let required: [(&'static str, bool); 8] = [
            ("notification.sender", is_blank(&notification.sender)),
            ("notification.region_tag", is_blank(&notification.region_tag)),
            ("notification.environment_tag", is_blank(&notification.environment_tag)),
            ("notification.gateway_url", is_blank(&notification.gateway_url)),
            ("location.magnitude_type", is_blank(&self.location.magnitude_type)),
            ("location.magnitude_value", self.location.magnitude_value.is_none()),
            ("event.event_id", is_blank(&self.event.event_id)),
            ("event.result_id", is_blank(&self.event.result_id)),
        ];
        if let Some((option, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(ConfigurationError::missing(*option, required_by));
        }

        if !self.object_store.enabled {
            return Err(ConfigurationError::missing("object_store.enabled", required_by));
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn republish_config() -> Config {
        let mut config = Config::default();
        config.input.result_file = Some(PathBuf::from("/data/wphase_output.json"));
        config
    }

    fn notifying_config() -> Config {
        let mut config = republish_config();
        config.event.event_id = Some("ga2020abcd".to_string());
        config.event.result_id = Some("r1".to_string());
        config.object_store.enabled = true;
        config.object_store.bucket = Some("wphase-results".to_string());
        config.notification = NotificationConfig {
            recipients: vec!["duty@example.org".to_string()],
            sender: Some("wphase@example.org".to_string()),
            region_tag: Some("au".to_string()),
            environment_tag: Some("prod".to_string()),
            gateway_url: Some("http://mail.internal/send".to_string()),
            ..NotificationConfig::default()
        };
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.output.archive_file_name, "wphase_seiscomp.xml");
        assert_eq!(config.output.result_file_name, "wphase_output.json");
        assert_eq!(config.event.agency, "GA");
        assert!(!config.object_store.enabled);
        assert_eq!(config.bus.timeout, Duration::from_secs(10));
        assert!(config.output.run_log_path.ends_with("wphase-publish.log"));
    }

    #[test]
    fn test_input_file_or_location_required() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigurationError::missing(
                "input.result_file",
                "no location parameters are given"
            ))
        );
        assert_eq!(republish_config().validate(), Ok(()));
        assert_eq!(republish_config().run_mode(), RunMode::Republish {
            result_file: PathBuf::from("/data/wphase_output.json")
        });
    }

    #[test]
    fn test_input_file_conflicts_with_location() {
        let mut config = republish_config();
        config.location.latitude = Some(-10.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Conflict { .. })
        ));
    }

    #[test]
    fn test_location_mode_requirements() {
        let mut config = Config::default();
        config.location.latitude = Some(-10.0);
        config.location.longitude = Some(120.0);
        config.location.depth = Some(15.0);
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::missing(
                "location.time",
                "location parameters are given"
            ))
        );

        config.location.time = Some("2020-01-01T00:00:00Z".to_string());
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.run_mode(), RunMode::Compute);

        config.location.latitude = Some(-100.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue {
                option: "location.latitude",
                ..
            })
        ));
    }

    #[test]
    fn test_object_store_requires_identifiers() {
        let mut config = republish_config();
        config.object_store.enabled = true;
        config.event.event_id = Some("ga2020abcd".to_string());
        config.event.result_id = Some("r1".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingOption {
                option: "object_store.bucket",
                ..
            })
        ));

        config.object_store.bucket = Some("wphase-results".to_string());
        config.event.result_id = Some("  ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingOption {
                option: "event.result_id",
                ..
            })
        ));
    }

    #[test]
    fn test_object_store_rejects_unsafe_identifiers() {
        let mut config = republish_config();
        config.object_store.enabled = true;
        config.object_store.bucket = Some("wphase-results".to_string());
        config.event.event_id = Some("../other".to_string());
        config.event.result_id = Some("r1".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue {
                option: "event.event_id",
                ..
            })
        ));

        config.event.event_id = Some("ga2020abcd".to_string());
        config.event.result_id = Some("..".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue {
                option: "event.result_id",
                ..
            })
        ));

        config.event.result_id = Some("r1".to_string());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_notification_requirements() {
        let mut config = notifying_config();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingOption {
                option: "location.magnitude_type",
                ..
            })
        ));

        config.location.magnitude_type = Some("Mww".to_string());
        config.location.magnitude_value = Some(7.1);
        assert_eq!(config.validate(), Ok(()));

        config.object_store.enabled = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingOption {
                option: "object_store.enabled",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[input]
result_file = "/data/wphase_output.json"

[event]
event_id = "ga2020abcd"
agency = "GA"

[bus]
url = "http://bus.internal:18180"
timeout = "3s"

[object_store]
enabled = false
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.event.event_id.as_deref(), Some("ga2020abcd"));
        assert_eq!(config.bus.url, "http://bus.internal:18180");
        assert_eq!(config.bus.timeout, Duration::from_secs(3));
        assert_eq!(config.output, OutputConfig::default());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_unreadable_file_is_configuration_error() {
        let err = Config::load_from_file("/nonexistent/wphase.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::File { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bus\nurl = 1").unwrap();
        assert!(matches!(
            Config::load_from_file(file.path()),
            Err(ConfigurationError::File { .. })
        ));
    }
}
