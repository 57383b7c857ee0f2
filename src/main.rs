//! # ReadMate CLI (`readmate`)
//!
//! Loads books, shows how they were split into chapters, and sends
//! structured questions about them to the configured model provider.
//!
//! ## Usage
//!
//! ```bash
//! readmate --config ./config/readmate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `readmate extract <file>` | Print the extracted plain text |
//! | `readmate chapters <file>` | List detected chapters (`--json` for full sections) |
//! | `readmate digest <file>` | Print the digest sent along with queries |
//! | `readmate analyze` | Analyze a book for a reading intent |
//! | `readmate discover` | Recommend books for interests and a goal |
//! | `readmate refine` | Refine a note against the author's view |
//! | `readmate assist` | Free-form help on a passage |
//! | `readmate serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `readmate=info`).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use readmate::commands;
use readmate::config;
use readmate::gateway::QueryParameters;
use readmate::models::Language;
use readmate::server;

/// ReadMate: chapter-aware reading with a schema-constrained model gateway.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means all defaults.
#[derive(Parser)]
#[command(
    name = "readmate",
    about = "ReadMate: split books into chapters and ask a model structured questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/readmate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the query commands.
#[derive(Args)]
struct QueryArgs {
    /// Reply language (`en` or `zh`). Defaults to `[reader].language`.
    #[arg(long, value_parser = parse_language)]
    language: Option<Language>,

    /// Model identifier. Defaults to `[provider].model`.
    #[arg(long)]
    model: Option<String>,

    /// Load this book first so the request carries its digest.
    #[arg(long)]
    book: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the plain text extracted from a document.
    Extract {
        file: PathBuf,
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
    },

    /// List the chapters detected in a document.
    Chapters {
        file: PathBuf,
        /// Print full sections (index, title, content) as JSON.
        #[arg(long)]
        json: bool,
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
    },

    /// Print the digest (title and leading chapter titles) of a document.
    Digest {
        file: PathBuf,
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
    },

    /// Analyze a book for a reader's intent.
    Analyze {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        intent: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Recommend books for a set of interests and a goal.
    Discover {
        /// Interest tag; repeat for several.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value = "")]
        goal: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Refine your understanding against the author's viewpoint.
    Refine {
        #[arg(long, default_value = "")]
        author_view: String,
        #[arg(long)]
        understanding: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Ask for help with a passage (explain, summarize, translate...).
    Assist {
        #[arg(long)]
        text: String,
        #[arg(long)]
        action: String,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn parse_language(s: &str) -> Result<Language, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readmate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Extract { file, language } => {
            commands::run_extract(&cfg, &file, language).await?;
        }
        Commands::Chapters {
            file,
            json,
            language,
        } => {
            commands::run_chapters(&cfg, &file, language, json).await?;
        }
        Commands::Digest { file, language } => {
            commands::run_digest(&cfg, &file, language).await?;
        }
        Commands::Analyze {
            title,
            intent,
            query,
        } => {
            let params = QueryParameters::AnalyzeBook { title, intent };
            run_query(&cfg, params, query).await?;
        }
        Commands::Discover { tags, goal, query } => {
            let params = QueryParameters::DiscoveryRecommendations { tags, goal };
            run_query(&cfg, params, query).await?;
        }
        Commands::Refine {
            author_view,
            understanding,
            query,
        } => {
            let params = QueryParameters::RefineInsight {
                author_view,
                my_understanding: understanding,
            };
            run_query(&cfg, params, query).await?;
        }
        Commands::Assist {
            text,
            action,
            query,
        } => {
            let params = QueryParameters::AssistReading {
                target_text: text,
                action,
            };
            run_query(&cfg, params, query).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_query(
    cfg: &config::Config,
    params: QueryParameters,
    query: QueryArgs,
) -> anyhow::Result<()> {
    commands::run_query(cfg, params, query.book.as_deref(), query.language, query.model).await
}
