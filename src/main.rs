use anyhow::Result;
use clap::{Parser, Subcommand};
use incident_assist::commands::{build_index, heal, search, show_status, solve};
use incident_assist::config::{Config, run_interactive_config, show_config};
use incident_assist::corpus::CorpusKind;

#[derive(Parser)]
#[command(name = "incident-assist")]
#[command(about = "Retrieve similar past incidents and suggest grounded remediation steps")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Rebuild the index from the corpus directory
    Build,
    /// Show provider health and index freshness
    Status,
    /// Find past incidents and KB articles similar to a description
    Search {
        /// Incident description to search for
        query: String,
        /// Number of results to return
        #[arg(short, long)]
        k: Option<usize>,
        /// Only show results of this kind ("incident" or "kb")
        #[arg(long)]
        kind: Option<CorpusKind>,
    },
    /// Suggest remediation steps grounded in similar incidents
    Solve {
        /// Incident description to resolve
        query: String,
        /// Number of evidence items to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Propose an auto-heal action for a description without running it
    Heal {
        /// Incident description
        description: String,
        /// Service the command should target
        #[arg(long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Build => {
            build_index(&Config::load_default()?).await?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?).await?;
        }
        Commands::Search { query, k, kind } => {
            search(&Config::load_default()?, &query, k, kind).await?;
        }
        Commands::Solve { query, k } => {
            solve(&Config::load_default()?, &query, k).await?;
        }
        Commands::Heal {
            description,
            target,
        } => {
            heal(&description, target.as_deref());
        }
    }

    Ok(())
}
