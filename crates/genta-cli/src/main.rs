//! genta CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod fixture;

#[derive(Parser)]
#[command(name = "genta", version, about = "Adaptive UTBK practice engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example practice fixture
    Init,

    /// Validate a practice fixture
    Validate {
        /// Path to the fixture .toml file
        #[arg(long)]
        fixture: PathBuf,
    },

    /// Apply one ability update and print the result
    Score {
        /// Current ability estimate
        #[arg(long, allow_hyphen_values = true)]
        theta: f64,

        /// Question difficulty (0 when omitted)
        #[arg(long, allow_hyphen_values = true)]
        difficulty: Option<f64>,

        /// The answer was correct
        #[arg(long)]
        correct: bool,
    },

    /// Run a fixture through submission, the feedback queue, and readiness
    Simulate {
        /// Path to the fixture .toml file
        #[arg(long)]
        fixture: PathBuf,

        /// Use the offline mock generator instead of the configured backend
        #[arg(long)]
        mock: bool,

        /// Also print the detail page for this section code (e.g. PK)
        #[arg(long)]
        section: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the configured generation models
    ListModels {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "genta=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { fixture } => commands::validate::execute(fixture),
        Commands::Score {
            theta,
            difficulty,
            correct,
        } => commands::score::execute(theta, difficulty, correct),
        Commands::Simulate {
            fixture,
            mock,
            section,
            config,
        } => commands::simulate::execute(fixture, mock, section, config).await,
        Commands::ListModels { config } => commands::list_models::execute(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
