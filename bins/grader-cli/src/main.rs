mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Grade submissions locally and inspect entry points", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a request file (exit status 0 only when every case passes)
    Grade {
        /// Grading request JSON file, or `-` for stdin
        #[arg(short, long)]
        request: String,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Override the request's per-case time limit
        #[arg(short, long)]
        time_limit_ms: Option<u64>,
    },

    /// Show the entry point discovered in a source file
    Inspect {
        /// Language tag (javascript, python, java, cpp or an alias)
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        source: PathBuf,
    },

    /// List configured language runtimes
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so reports on stdout stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            request,
            format,
            time_limit_ms,
        } => {
            let all_passed = commands::grade(&request, format, time_limit_ms).await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        Commands::Inspect { language, source } => {
            commands::inspect(&language, &source)?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
    }

    Ok(())
}
