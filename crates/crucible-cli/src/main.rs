mod commands;

use clap::{Parser, Subcommand};
use crucible_core::config::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// crucible CLI -- run model-written code through persistent interpreter
/// sessions.
#[derive(Parser)]
#[command(name = "crucible", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a code block through a language interpreter, streaming events as
    /// JSON lines.
    Run {
        /// Language binding to use (e.g. python, shell, javascript).
        #[arg(short, long)]
        language: String,
        /// File to read code from; stdin when omitted.
        file: Option<std::path::PathBuf>,
    },

    /// Execute one command in the persistent shell session.
    Exec {
        /// The command line to run.
        command: String,
        /// Per-command deadline in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// List the supported language bindings.
    Languages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crucible_telemetry::logging::init_logging("crucible", "warn");

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { language, file } => {
            commands::run::run(&config, &language, file.as_deref())?;
        }
        Commands::Exec { command, timeout } => {
            commands::exec::run(&config, &command, timeout).await?;
        }
        Commands::Languages => {
            commands::languages::run();
        }
    }

    Ok(())
}
