pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sqlreact_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "sqlreact",
    about = "Guarded natural-language questions over a local SQLite database",
    long_about = "Seed the demo database, trace a single ReACT run stage by stage, or ask a question \
                  through the full agent. Every generated query passes the read-only guard first.",
    after_help = "Examples:\n  sqlreact seed\n  sqlreact trace --offline\n  sqlreact ask \"Which department has the most employees?\"\n  sqlreact doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create the demo tables and load the deterministic demo rows")]
    Seed,
    #[command(about = "Run one question and print every stage's prompt and output")]
    Trace {
        #[arg(long, help = "Replay the built-in demo script instead of calling the model")]
        offline: bool,
        #[arg(help = "Question to answer; defaults to the demo question")]
        question: Option<String>,
    },
    #[command(about = "Answer a question with the configured model")]
    Ask {
        question: String,
        #[arg(long, value_name = "PATH", help = "Append stage trace records as JSON lines")]
        trace_file: Option<PathBuf>,
    },
    #[command(about = "Validate config, model credentials, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Seed => commands::seed::run(),
        Command::Trace { offline, question } => commands::trace::run(question, offline),
        Command::Ask { question, trace_file } => commands::ask::run(&question, trace_file),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}
