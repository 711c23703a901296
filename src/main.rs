//! # Code Proof CLI (`cproof`)
//!
//! The `cproof` binary loads a codebase from a ZIP archive or a public
//! GitHub repository and lets you browse it, search it, and ask questions
//! whose answers cite exact line ranges.
//!
//! ## Usage
//!
//! ```bash
//! cproof [--config ./cproof.toml] [--verbose] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cproof files` | List ingested paths and skipped files |
//! | `cproof tree` | Print the directory tree |
//! | `cproof context` | Print the assembled context window |
//! | `cproof search "<query>"` | Case-insensitive line search |
//! | `cproof show <file>` | Print a line range with line numbers |
//! | `cproof ask "<question>"` | Ask the reasoning engine, with proof |
//! | `cproof history list` | Show recorded answers |
//! | `cproof config set-key <key>` | Store the engine API key |
//! | `cproof serve` | Start the HTTP server |
//!
//! Corpus commands take exactly one of `--zip <path>` or `--repo <url>`.
//!
//! ## Examples
//!
//! ```bash
//! cproof files --zip ./project.zip
//! cproof search "jwt" --repo https://github.com/owner/repo
//! cproof show src/auth.js --start 10 --end 25 --zip ./project.zip
//! cproof ask "How are sessions validated?" --repo https://github.com/owner/repo
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use code_proof::commands::{self, Source};
use code_proof::config::{self, Config};
use code_proof::server;

/// Code Proof CLI: evidence-backed answers about a codebase.
#[derive(Parser)]
#[command(
    name = "cproof",
    about = "Code Proof: ask questions about a codebase and get answers with line-level proof",
    version,
    long_about = "Code Proof ingests a ZIP archive or a public GitHub repository, keeps the \
    source files in memory, and answers questions through a reasoning engine. Every cited \
    reference is resolved back to the exact lines of the ingested files."
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Corpus source: exactly one of `--zip` or `--repo`.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Path to a ZIP archive of the project.
    #[arg(long)]
    zip: Option<PathBuf>,

    /// Public GitHub repository URL (https://github.com/owner/repo).
    #[arg(long)]
    repo: Option<String>,
}

impl SourceArgs {
    fn into_source(self) -> Source {
        match (self.zip, self.repo) {
            (Some(path), _) => Source::Zip(path),
            (None, Some(url)) => Source::Repo(url),
            // clap's group guarantees one of the two.
            (None, None) => unreachable!("source group is required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the ingested file paths and any skipped files.
    Files {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the directory tree, directories first.
    Tree {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the context window sent to the reasoning engine.
    Context {
        #[command(flatten)]
        source: SourceArgs,

        /// Override `[limits].context_max_chars`.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Case-insensitive substring search over every line.
    Search {
        /// The search query string.
        query: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print a line range of one file with line numbers.
    ///
    /// Out-of-range lines are clamped into the file.
    Show {
        /// File path as listed by `cproof files`.
        file: String,

        /// First line (1-based).
        #[arg(long)]
        start: Option<i64>,

        /// Last line (inclusive).
        #[arg(long)]
        end: Option<i64>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Ask a question and print the answer with resolved references.
    ///
    /// Requires an API key (`cproof config set-key`, or the environment
    /// variable named by `[engine].api_key_env`).
    Ask {
        /// The question.
        question: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Manage recorded answers.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage stored settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List entries, newest first.
    List {
        /// Case-insensitive filter over question, tags, and source.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Delete one entry by id.
    Delete { id: String },
    /// Delete every entry.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store the reasoning engine API key under `[store].dir`.
    SetKey { key: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "code_proof=debug"
    } else {
        "code_proof=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Files { source } => {
            commands::run_files(&cfg, &source.into_source()).await?;
        }
        Commands::Tree { source } => {
            commands::run_tree(&cfg, &source.into_source()).await?;
        }
        Commands::Context { source, max_chars } => {
            commands::run_context(&cfg, &source.into_source(), max_chars).await?;
        }
        Commands::Search { query, source } => {
            commands::run_search(&cfg, &source.into_source(), &query).await?;
        }
        Commands::Show {
            file,
            start,
            end,
            source,
        } => {
            commands::run_show(&cfg, &source.into_source(), &file, start, end).await?;
        }
        Commands::Ask { question, source } => {
            commands::run_ask(&cfg, &source.into_source(), &question).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::List { filter } => {
                commands::run_history_list(&cfg, filter.as_deref()).await?;
            }
            HistoryAction::Delete { id } => {
                commands::run_history_delete(&cfg, &id).await?;
            }
            HistoryAction::Clear => {
                commands::run_history_clear(&cfg).await?;
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::SetKey { key } => {
                commands::run_set_key(&cfg, &key).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
