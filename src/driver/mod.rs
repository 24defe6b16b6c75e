//! Run driver
//!
//! Obtains the raw result (from a file or from the computation), normalizes
//! it, builds the graph and hands everything to the publish orchestrator.
//! Component failures become log entries and stage errors in the
//! [`RunSummary`]; the run always reaches the publish step so that the
//! failure-reporting sinks can record what happened.
//!
//! ```text
//! Start -> {Computing | LoadingFile} -> Normalizing -> Building -> Publishing -> Done
//! ```
//!
//! Any state may jump straight to `Publishing` without a graph.

pub mod computer;

use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::defaults::DEFAULT_EVENT_ID;
use crate::config::{Config, RunMode};
use crate::errors::{AppError, AppResult, ComputeError};
use crate::graph::{ChangeLog, ObjectGraphBuilder};
use crate::ingestor::payload::{ERROR_KEY, HOST_NAME_KEY, STACKTRACE_KEY, WARNINGS_KEY};
use crate::ingestor::{PayloadNormalizer, RawResult};
use crate::models::DomainGraph;
use crate::pipeline::sinks::archive::write_atomically;
use crate::pipeline::{PublishCapabilities, PublishInput, PublishOrchestrator, PublishReport};
use crate::utils::datetime::DateTimeParser;
use crate::utils::run_log::RunLog;

pub use computer::{CommandComputer, ComputeRequest, SolutionComputer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Computing,
    LoadingFile,
    Normalizing,
    Building,
    Publishing,
    Done,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Start => "start",
            RunState::Computing => "computing",
            RunState::LoadingFile => "loading_file",
            RunState::Normalizing => "normalizing",
            RunState::Building => "building",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded against the state it happened in
#[derive(Debug, Clone, PartialEq)]
pub struct StageError {
    pub state: RunState,
    pub message: String,
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// States visited, in order
    pub states: Vec<RunState>,
    pub graph_built: bool,
    pub errors: Vec<StageError>,
    pub report: PublishReport,
}

impl RunSummary {
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Start)
    }
}

/// Tracks state transitions and stage errors for one run
struct RunTracker {
    states: Vec<RunState>,
    errors: Vec<StageError>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            states: vec![RunState::Start],
            errors: Vec::new(),
        }
    }

    fn enter(&mut self, state: RunState) {
        let from = self.states.last().copied().unwrap_or(RunState::Start);
        info!("Run state: {} -> {}", from, state);
        self.states.push(state);
    }

    fn fail(&mut self, error: AppError) {
        let state = self.states.last().copied().unwrap_or(RunState::Start);
        error!("Stage failed: state={} error={}", state, error);
        self.errors.push(StageError {
            state,
            message: error.to_string(),
        });
    }
}

pub struct Driver {
    config: Config,
    orchestrator: PublishOrchestrator,
    computer: Arc<dyn SolutionComputer>,
    run_log: Option<RunLog>,
}

impl Driver {
    pub fn new(
        config: Config,
        orchestrator: PublishOrchestrator,
        computer: Arc<dyn SolutionComputer>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            computer,
            run_log: None,
        }
    }

    /// Attach the run log; it is uploaded by the object store sink and
    /// removed when the run ends
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Event identity every entity is recorded under
    fn event_id(&self) -> &str {
        self.config
            .event
            .event_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(DEFAULT_EVENT_ID)
    }

    /// Run to completion; never fails
    pub async fn run(&self) -> RunSummary {
        let mut tracker = RunTracker::new();

        let raw = match self.config.run_mode() {
            RunMode::Republish { result_file } => {
                tracker.enter(RunState::LoadingFile);
                match load_result_file(&result_file).await {
                    Ok(raw) => Some(raw),
                    Err(e) => {
                        tracker.fail(e);
                        None
                    }
                }
            }
            RunMode::Compute => {
                tracker.enter(RunState::Computing);
                self.compute(&mut tracker).await
            }
        };

        if let Some(raw) = &raw {
            log_result_diagnostics(raw);
        }

        let built = match &raw {
            Some(raw) => self.normalize_and_build(&mut tracker, raw),
            None => None,
        };

        tracker.enter(RunState::Publishing);
        let input = PublishInput {
            graph: built.as_ref().map(|(graph, log)| (graph, log)),
            result_has_solution: raw.as_ref().is_some_and(RawResult::has_solution),
            run_log: self.run_log.as_ref(),
        };
        let report = self.orchestrator.publish(input).await;

        tracker.enter(RunState::Done);
        if let Some(run_log) = &self.run_log {
            run_log.remove();
        }

        let summary = RunSummary {
            states: tracker.states,
            graph_built: built.is_some(),
            errors: tracker.errors,
            report,
        };
        info!(
            "Run finished: graph_built={} stage_errors={} sinks=[{}]",
            summary.graph_built,
            summary.errors.len(),
            summary.report
        );
        summary
    }

    fn normalize_and_build(
        &self,
        tracker: &mut RunTracker,
        raw: &RawResult,
    ) -> Option<(DomainGraph, ChangeLog)> {
        tracker.enter(RunState::Normalizing);
        let solution = match PayloadNormalizer::normalize(raw) {
            Ok(solution) => solution,
            Err(e) => {
                tracker.fail(e.into());
                return None;
            }
        };

        tracker.enter(RunState::Building);
        match ObjectGraphBuilder::build(&solution, self.event_id(), &self.config.event.agency) {
            Ok(built) => Some(built),
            Err(e) => {
                tracker.fail(e.into());
                None
            }
        }
    }

    /// Run the computation and persist whatever it produced
    async fn compute(&self, tracker: &mut RunTracker) -> Option<RawResult> {
        let output_dir = &self.config.output.output_dir;
        let result_path = output_dir.join(&self.config.output.result_file_name);

        let outcome = match self.compute_request() {
            Ok(request) => self.computer.compute(&request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(raw) => {
                if let Err(e) = persist_json(&result_path, raw.as_value()).await {
                    tracker.fail(e);
                }
                Some(raw)
            }
            Err(e) => {
                let document = json!({
                    ERROR_KEY: e.to_string(),
                    HOST_NAME_KEY: host_name(),
                });
                tracker.fail(e.into());
                if let Err(e) = persist_json(&result_path, &document).await {
                    tracker.fail(e);
                }
                None
            }
        }
    }

    fn compute_request(&self) -> Result<ComputeRequest, ComputeError> {
        let location = &self.config.location;
        let missing = |what: &str| ComputeError::Spawn {
            command: self.config.computation.command.clone(),
            message: format!("location {what} not configured"),
        };

        let time = location.time.as_deref().ok_or_else(|| missing("time"))?;
        let time = DateTimeParser::parse_flexible(time).map_err(|e| ComputeError::Spawn {
            command: self.config.computation.command.clone(),
            message: e.to_string(),
        })?;

        Ok(ComputeRequest {
            latitude: location.latitude.ok_or_else(|| missing("latitude"))?,
            longitude: location.longitude.ok_or_else(|| missing("longitude"))?,
            depth: location.depth.ok_or_else(|| missing("depth"))?,
            time,
            source_zone: location.source_zone.clone(),
            magnitude_type: location.magnitude_type.clone(),
            magnitude_value: location.magnitude_value,
            server: self.config.computation.server.clone(),
            networks: self.config.computation.networks.clone(),
            region: self.config.event.region.clone(),
            output_dir: self.config.output.output_dir.clone(),
        })
    }
}

/// Validate the configuration and resolve the sinks, then create the run log
///
/// Nothing touches the filesystem until the configuration has been accepted.
pub fn prepare(config: &Config) -> AppResult<(PublishCapabilities, RunLog)> {
    config.validate()?;
    let capabilities = PublishCapabilities::resolve(config)?;
    let run_log = RunLog::create(&config.output.run_log_path)?;
    Ok((capabilities, run_log))
}

async fn load_result_file(path: &Path) -> AppResult<RawResult> {
    let contents = tokio::fs::read_to_string(path).await?;
    let raw = RawResult::from_json_str(&contents)?;
    info!("Result loaded: path={} bytes={}", path.display(), contents.len());
    Ok(raw)
}

async fn persist_json(path: &Path, value: &serde_json::Value) -> AppResult<PathBuf> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomically(path, &bytes).await?;
    info!("Result persisted: path={}", path.display());
    Ok(path.to_path_buf())
}

/// Surface the error, warnings and stack trace the computation embedded
fn log_result_diagnostics(raw: &RawResult) {
    let root = raw.as_value();
    if let Some(message) = root.get(ERROR_KEY) {
        error!("Result reports a processing error: {}", message);
    }
    if let Some(trace) = root.get(STACKTRACE_KEY).and_then(|v| v.as_str()) {
        debug!("Result stack trace:\n{}", trace);
    }
    if let Some(warnings) = root.get(WARNINGS_KEY).and_then(|v| v.as_array()) {
        for warning in warnings {
            warn!("Result warning: {}", warning);
        }
    }
    if let Some(host) = root.get(HOST_NAME_KEY) {
        debug!("Result produced on host {}", host);
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
