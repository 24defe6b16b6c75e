use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wphase_publish::{
    config::Config,
    driver::{self, CommandComputer, Driver},
    pipeline::PublishOrchestrator,
};

#[derive(Parser)]
#[command(name = "wphase-publish")]
#[command(version)]
#[command(about = "Compute or load a W-phase moment tensor result and publish it")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Publish an existing result file instead of computing one
    #[arg(short = 'i', long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Event latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Event longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Event depth in kilometres
    #[arg(long)]
    depth: Option<f64>,

    /// Event origin time
    #[arg(long)]
    time: Option<String>,

    /// Source zone hint passed to the computation
    #[arg(long)]
    source_zone: Option<String>,

    /// Preliminary magnitude type
    #[arg(long)]
    magnitude_type: Option<String>,

    /// Preliminary magnitude value
    #[arg(long)]
    magnitude: Option<f64>,

    /// Event identifier
    #[arg(long)]
    event_id: Option<String>,

    /// Result identifier
    #[arg(long)]
    result_id: Option<String>,

    /// Agency id stamped on every entity
    #[arg(long)]
    agency: Option<String>,

    /// Region label
    #[arg(long)]
    region: Option<String>,

    /// Waveform server passed to the computation
    #[arg(long)]
    server: Option<String>,

    /// Network list passed to the computation
    #[arg(long)]
    networks: Option<String>,

    /// Computation command
    #[arg(long)]
    command: Option<String>,

    /// Computation time limit (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    compute_timeout: Option<Duration>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Messaging bus URL
    #[arg(long, value_name = "URL")]
    bus_url: Option<String>,

    /// Upload the output directory to the object store
    #[arg(long)]
    upload: bool,

    /// Object store bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Notification recipient (repeatable)
    #[arg(long = "email", value_name = "ADDRESS")]
    recipients: Vec<String>,

    /// Notification sender address
    #[arg(long)]
    sender: Option<String>,

    /// Region tag for the notification subject
    #[arg(long)]
    region_tag: Option<String>,

    /// Environment tag for the notification subject
    #[arg(long)]
    environment_tag: Option<String>,

    /// Mail gateway URL
    #[arg(long, value_name = "URL")]
    mail_gateway: Option<String>,
}

impl Cli {
    /// Override config with CLI arguments
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.input.result_file = Some(input);
        }

        let location = &mut config.location;
        location.latitude = self.lat.or(location.latitude);
        location.longitude = self.lon.or(location.longitude);
        location.depth = self.depth.or(location.depth);
        location.time = self.time.or(location.time.take());
        location.source_zone = self.source_zone.or(location.source_zone.take());
        location.magnitude_type = self.magnitude_type.or(location.magnitude_type.take());
        location.magnitude_value = self.magnitude.or(location.magnitude_value);

        let event = &mut config.event;
        event.event_id = self.event_id.or(event.event_id.take());
        event.result_id = self.result_id.or(event.result_id.take());
        if let Some(agency) = self.agency {
            event.agency = agency;
        }
        event.region = self.region.or(event.region.take());

        let computation = &mut config.computation;
        computation.server = self.server.or(computation.server.take());
        computation.networks = self.networks.or(computation.networks.take());
        if let Some(command) = self.command {
            computation.command = command;
        }
        if let Some(timeout) = self.compute_timeout {
            computation.timeout = timeout;
        }

        if let Some(output_dir) = self.output_dir {
            config.output.output_dir = output_dir;
        }
        if let Some(bus_url) = self.bus_url {
            config.bus.url = bus_url;
        }
        if self.upload {
            config.object_store.enabled = true;
        }
        config.object_store.bucket = self.bucket.or(config.object_store.bucket.take());

        let notification = &mut config.notification;
        if !self.recipients.is_empty() {
            notification.recipients = self.recipients;
        }
        notification.sender = self.sender.or(notification.sender.take());
        notification.region_tag = self.region_tag.or(notification.region_tag.take());
        notification.environment_tag = self.environment_tag.or(notification.environment_tag.take());
        notification.gateway_url = self.mail_gateway.or(notification.gateway_url.take());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_filter = format!("wphase_publish={}", cli.log_level);

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let (capabilities, run_log) = driver::prepare(&config).with_context(|| {
        format!(
            "run refused (run log {})",
            config.output.run_log_path.display()
        )
    })?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(run_log.make_writer())
                .with_ansi(false),
        )
        .init();

    info!("Starting W-phase publisher v{}", env!("CARGO_PKG_VERSION"));
    info!("Run log: {}", run_log.path().display());

    let computer = Arc::new(CommandComputer::new(
        config.computation.command.clone(),
        config.computation.timeout,
    ));

    let driver = Driver::new(config, PublishOrchestrator::new(capabilities), computer)
        .with_run_log(run_log);
    let summary = driver.run().await;

    info!(
        "Run complete: final_state={} stage_errors={}",
        summary.final_state(),
        summary.errors.len()
    );
    Ok(())
}
