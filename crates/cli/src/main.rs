//! `paws`: run a command under heartbeat supervision.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use colored::Colorize;
use paws_core::config::{load_config, validate_config, CONFIG_FILE_NAME};
use paws_core::state::StatusRecord;
use paws_core::status::{console_timestamp_to_iso8601, parse_status_line};
use paws_core::supervisor::{policy::seconds, ProcessLaunch, Supervisor, TerminationReason};
use paws_protocol::process_models::{CompletionStatus, ProcessStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "paws", version, about = "Process supervision for instrument-control jobs")]
struct Cli {
    /// Supervisor settings file.
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command line and print its final status record as JSON.
    Run {
        /// Tool label used in logs.
        #[arg(long)]
        tool: Option<String>,

        /// Extra environment, as KEY=VALUE. Repeatable.
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Seconds allowed before the first status line, on top of the deadline.
        #[arg(long)]
        stall: Option<f64>,

        /// Heartbeat deadline in seconds when a line carries no timeout.
        #[arg(long)]
        deadline: Option<f64>,

        /// Factor applied to child-requested timeouts.
        #[arg(long)]
        multiplier: Option<f64>,

        /// Command line, passed to the shell with `-c`.
        #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Decode one status line and print the event as JSON.
    ParseLine { line: String },

    /// Convert `Fri Sep 23 2017 15:38:22 GMT+0630` to UTC ISO-8601.
    ConvertTimestamp { text: String },
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            tool,
            env,
            stall,
            deadline,
            multiplier,
            command,
        } => {
            let mut config = load_config(&cli.config)
                .await
                .wrap_err("Failed to load supervisor config")?;
            if let Some(deadline) = deadline {
                config.default_deadline_secs = deadline;
            }
            if let Some(multiplier) = multiplier {
                config.timeout_multiplier = multiplier;
            }
            if let Some(stall) = stall {
                config.initial_stall_secs = stall;
            }
            validate_config(&config).map_err(|reason| eyre!("Invalid option: {reason}"))?;

            let mut launch = ProcessLaunch::new(command.join(" ")).with_env_assignments(env);
            if let Some(tool) = tool {
                launch = launch.with_tool(tool);
            }
            run(Supervisor::new(config), launch).await
        }
        Command::ParseLine { line } => {
            let event = parse_status_line(&line)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ConvertTimestamp { text } => {
            println!("{}", console_timestamp_to_iso8601(&text)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(supervisor: Supervisor, launch: ProcessLaunch) -> color_eyre::Result<ExitCode> {
    let stall = seconds(supervisor.config().initial_stall_secs);
    let record = Arc::new(StatusRecord::new());
    let handle = supervisor
        .start_controlled(launch, Arc::clone(&record), stall)
        .await?;

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; stopping child");
            handle.stop()?;
            handle.wait().await?
        }
    };

    let status = record.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    print_summary(&status, outcome.reason);

    Ok(match status.completion_status {
        CompletionStatus::Success => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn print_summary(status: &ProcessStatus, reason: TerminationReason) {
    let exit_code = status
        .exit_code
        .map_or_else(|| "none".to_string(), |code| code.to_string());
    let headline = match (status.completion_status, reason) {
        (CompletionStatus::Success, _) => "completed".green().bold(),
        (_, TerminationReason::TimedOut) => "killed: no status before deadline".red().bold(),
        (_, TerminationReason::Stopped) => "stopped".yellow().bold(),
        _ => "failed".red().bold(),
    };
    eprintln!("{headline} (exit code {exit_code})");

    if let Some(message) = &status.message {
        eprintln!("  {} {message}", "exception:".red());
    }
    if !status.progress.stage_name.is_empty() || status.progress.counter_max > 0 {
        eprintln!(
            "  stage {} '{}': {}/{} ({:.0}% overall)",
            status.progress.stage_number,
            status.progress.stage_name,
            status.progress.counter,
            status.progress.counter_max,
            status.progress.net_progress * 100.0
        );
    }
}
