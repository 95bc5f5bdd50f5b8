//! quizrules CLI: validate and apply questionnaire processing rules.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(
    name = "quizrules",
    version,
    about = "Questionnaire processing rules engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the processing_rules of questionnaire documents
    Validate {
        /// Path to a questionnaire JSON file or a directory of them
        #[arg(long)]
        questionnaire: PathBuf,

        /// Output format: text, sarif
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Score one set of answers
    Evaluate {
        /// Questionnaire JSON file
        #[arg(long)]
        questionnaire: PathBuf,

        /// Answer JSON file
        #[arg(long)]
        answers: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score every answer file in a directory
    Score {
        /// Questionnaire JSON file
        #[arg(long)]
        questionnaire: PathBuf,

        /// Directory of answer JSON files, one per respondent
        #[arg(long)]
        answers_dir: PathBuf,

        /// Max concurrent scoring runs (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, markdown, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config, questionnaire and answer file
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quizrules=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            questionnaire,
            format,
        } => commands::validate::execute(questionnaire, format),
        Commands::Evaluate {
            questionnaire,
            answers,
            format,
            config,
        } => commands::evaluate::execute(questionnaire, answers, format, config),
        Commands::Score {
            questionnaire,
            answers_dir,
            parallelism,
            output,
            format,
            config,
        } => {
            commands::score::execute(
                questionnaire,
                answers_dir,
                parallelism,
                output,
                format,
                config,
            )
            .await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
