//! AWS IoT Jobs agent - Main Entry Point
//!
//! Connects to the broker as one thing, follows its next pending job and
//! reports every job it receives as SUCCEEDED once the job document parses.

use clap::{Parser, Subcommand};
use iot_jobs::config::JobsConfig;
use iot_jobs::jobs::{JobExecution, JobHandler, JobOutcome, JobsDriver};
use iot_jobs::observability::{init_logging, LogSettings};
use iot_jobs::protocol::topics::{JobId, JobOperation, JobTopic, ReplyFilter, MAX_JOB_TOPIC_LEN};
use iot_jobs::transport::mqtt::MqttClient;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

const SUCCESS_DETAIL: &str = r#"{"exampleDetail":"a value appropriate for your successful job"}"#;
const INVALID_DOCUMENT_DETAIL: &str = r#"{"failureDetail":"Job document is not valid JSON"}"#;

/// AWS IoT Jobs agent
#[derive(Parser)]
#[command(name = "jobs-agent")]
#[command(about = "Follows and reports AWS IoT job executions for one thing")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "JOBS_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and process jobs until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the Jobs topics used by this thing
    Topics,
}

/// Accepts any job whose document is valid JSON
struct ExampleHandler;

impl JobHandler for ExampleHandler {
    fn process_job(
        &mut self,
        job_id: &str,
        job_document: &str,
        execution: &JobExecution<'_>,
    ) -> JobOutcome {
        match serde_json::from_str::<serde_json::Value>(job_document) {
            Ok(document) => {
                info!(
                    job_id,
                    status = %execution.status,
                    operation = document.get("operation").and_then(|v| v.as_str()).unwrap_or("-"),
                    "Executing job"
                );
                JobOutcome::succeeded().with_details(SUCCESS_DETAIL)
            }
            Err(e) => {
                warn!(job_id, error = %e, "Job document did not parse");
                JobOutcome::failed().with_details(INVALID_DOCUMENT_DETAIL)
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = LogSettings::from_env();
    match cli.verbose {
        0 => {}
        1 => settings.level = Level::DEBUG,
        _ => settings.level = Level::TRACE,
    }
    init_logging(settings);

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Topics => print_topics(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<JobsConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(JobsConfig::load_from_file(path)?)
        }
        None => {
            let (config, path) = JobsConfig::load_default()?;
            info!("Loading configuration from: {}", path.display());
            Ok(config)
        }
    }
}

async fn run_agent(config: JobsConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        thing = %config.thing.name,
        "Starting jobs agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut client = MqttClient::new(config.client_id(), config.mqtt.clone())?;
    client.connect().await?;

    let mut driver = JobsDriver::from_config(client, ExampleHandler, &config)?;
    driver.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
    });

    let outcome = driver.run_until_shutdown(shutdown_rx).await;

    let metrics = driver.transport().health_metrics();
    info!(
        reconnects = metrics.reconnect_count,
        uptime_secs = metrics.uptime.map(|d| d.as_secs()),
        "Disconnecting"
    );
    if let Err(e) = driver.transport_mut().disconnect().await {
        warn!("Error during disconnect: {}", e);
    }

    outcome?;
    Ok(())
}

fn handle_config_command(config: &JobsConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
        if config.mqtt.username_env.is_some() {
            let state = match config.get_mqtt_username() {
                Some(_) => "set",
                None => "not set",
            };
            println!("# MQTT username variable is {state}");
        }
    }
    println!("Configuration is valid");
    Ok(())
}

fn print_topics(config: &JobsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let thing = config.thing.name.as_str();
    let topics = [
        ("subscribe", JobTopic::new(thing, None, JobOperation::GetPending, ReplyFilter::Wildcard)),
        ("subscribe", JobTopic::new(thing, None, JobOperation::NotifyNext, ReplyFilter::None)),
        ("subscribe", JobTopic::new(thing, Some(JobId::Next), JobOperation::Describe, ReplyFilter::Wildcard)),
        ("subscribe", JobTopic::new(thing, Some(JobId::Wildcard), JobOperation::Update, ReplyFilter::Accepted)),
        ("subscribe", JobTopic::new(thing, Some(JobId::Wildcard), JobOperation::Update, ReplyFilter::Rejected)),
        ("publish", JobTopic::request(thing, None, JobOperation::GetPending)),
        ("publish", JobTopic::request(thing, Some(JobId::Next), JobOperation::Describe)),
        ("publish", JobTopic::request(thing, None, JobOperation::StartNext)),
        ("publish", JobTopic::request(thing, Some(JobId::Id("<jobId>")), JobOperation::Update)),
    ];

    for (direction, topic) in topics {
        match topic.render(MAX_JOB_TOPIC_LEN) {
            Ok(rendered) => println!("{direction:<10} {rendered}"),
            // Placeholder job ids are not valid ids; print them literally
            Err(_) => println!(
                "{direction:<10} $aws/things/{thing}/jobs/<jobId>/{}",
                topic.operation
            ),
        }
    }
    Ok(())
}
