pub mod commands;

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use triage_core::config::{AppConfig, LoadOptions, LogFormat, PipelineMode};
use triage_core::domain::ticket::TicketId;

#[derive(Debug, Parser)]
#[command(
    name = "triage",
    about = "Ticket triage operator CLI",
    long_about = "Run migrations, load demo data, inspect configuration, check readiness, and \
                  request guarded triage suggestions for tickets.",
    after_help = "Examples:\n  triage doctor --json\n  triage seed\n  triage suggest 2 --pipeline multi"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo categories and sample tickets (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, and language model reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Suggest category, priority and status for a ticket")]
    Suggest {
        #[arg(help = "Ticket id")]
        ticket_id: i64,
        #[arg(long, help = "Pipeline to run: single or multi (default from config)")]
        pipeline: Option<PipelineMode>,
        #[arg(long, help = "Persist the guardrail-approved patch")]
        apply: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        if let Err(error) = init_logging(&config) {
            eprintln!("logging disabled: {error}");
        }
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Suggest { ticket_id, pipeline, apply } => {
            commands::suggest::run(TicketId(ticket_id), pipeline, apply)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}
