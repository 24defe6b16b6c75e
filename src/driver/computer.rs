//! Moment tensor computation collaborator
//!
//! The inversion itself runs elsewhere; the publisher only needs a JSON
//! result document back. [`CommandComputer`] runs the configured command
//! and reads the document from its stdout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ComputeError;
use crate::ingestor::RawResult;
use crate::utils::datetime::DateTimeParser;

/// Location and context for one computation
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub time: DateTime<Utc>,
    pub source_zone: Option<String>,
    pub magnitude_type: Option<String>,
    pub magnitude_value: Option<f64>,
    pub server: Option<String>,
    pub networks: Option<String>,
    pub region: Option<String>,
    pub output_dir: PathBuf,
}

impl ComputeRequest {
    /// Command-line arguments describing this request
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--lat".to_string(),
            self.latitude.to_string(),
            "--lon".to_string(),
            self.longitude.to_string(),
            "--depth".to_string(),
            self.depth.to_string(),
            "--time".to_string(),
            DateTimeParser::format_for_archive(&self.time),
            "--outputs".to_string(),
            self.output_dir.display().to_string(),
        ];

        let optional = [
            ("--source-zone", self.source_zone.clone()),
            ("--magnitude-type", self.magnitude_type.clone()),
            ("--magnitude", self.magnitude_value.map(|m| m.to_string())),
            ("--server", self.server.clone()),
            ("--networks", self.networks.clone()),
            ("--region", self.region.clone()),
        ];
        for (flag, value) in optional {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value);
            }
        }
        args
    }
}

/// Produces a raw result for a location
#[async_trait]
pub trait SolutionComputer: Send + Sync {
    async fn compute(&self, request: &ComputeRequest) -> Result<RawResult, ComputeError>;
}

/// Runs an external command and parses its stdout as the result document
///
/// The command string is split on whitespace; words after the first are
/// passed before the request arguments.
pub struct CommandComputer {
    command: String,
    timeout: Duration,
}

impl CommandComputer {
    pub fn new<S: Into<String>>(command: S, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SolutionComputer for CommandComputer {
    async fn compute(&self, request: &ComputeRequest) -> Result<RawResult, ComputeError> {
        let args = request.to_args();
        debug!("Starting computation: command={} args={:?}", self.command, args);

        let mut words = self.command.split_whitespace();
        let program = words.next().ok_or_else(|| ComputeError::Spawn {
            command: self.command.clone(),
            message: "empty command".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(words);
        cmd.args(&args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ComputeError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ComputeError::Spawn {
                command: self.command.clone(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ComputeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            warn!("Computation wrote to stderr: {}", stderr.trim());
        }

        let raw = RawResult::from_json_str(&String::from_utf8_lossy(&output.stdout))?;
        info!(
            "Computation finished: command={} solution={}",
            self.command,
            raw.has_solution()
        );
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ComputeRequest {
        ComputeRequest {
            latitude: -10.0,
            longitude: 120.5,
            depth: 15.0,
            time: DateTimeParser::parse_flexible("2020-01-01 00:00:00").unwrap(),
            source_zone: None,
            magnitude_type: Some("Mww".to_string()),
            magnitude_value: Some(7.1),
            server: None,
            networks: Some("II,IU".to_string()),
            region: None,
            output_dir: PathBuf::from("/data/out"),
        }
    }

    #[test]
    fn test_request_arguments() {
        let args = request().to_args();
        assert_eq!(
            args,
            vec![
                "--lat",
                "-10",
                "--lon",
                "120.5",
                "--depth",
                "15",
                "--time",
                "2020-01-01T00:00:00.000000Z",
                "--outputs",
                "/data/out",
                "--magnitude-type",
                "Mww",
                "--magnitude",
                "7.1",
                "--networks",
                "II,IU",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-wphase.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"MomentTensor\": {\"drmag\": 7.1}, \"HostName\": \"test\"}'\n",
        )
        .unwrap();

        let computer =
            CommandComputer::new(format!("sh {}", script.display()), Duration::from_secs(10));
        let raw = computer.compute(&request()).await.unwrap();
        assert!(raw.has_solution());
        assert!(raw.has_key("HostName"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let computer = CommandComputer::new("false", Duration::from_secs(10));
        assert!(matches!(
            computer.compute(&request()).await,
            Err(ComputeError::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let empty = CommandComputer::new("  ", Duration::from_secs(10));
        assert!(matches!(
            empty.compute(&request()).await,
            Err(ComputeError::Spawn { .. })
        ));

        let computer = CommandComputer::new("/nonexistent/wphase", Duration::from_secs(10));
        assert!(matches!(
            computer.compute(&request()).await,
            Err(ComputeError::Spawn { .. })
        ));
    }
}
