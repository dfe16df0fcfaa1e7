//! # Context Pack CLI (`ctx`)
//!
//! The `ctx` binary indexes a project's text files and selects the chunks
//! most relevant to a query within a token budget. The same operations are
//! available to AI assistants through `ctx serve`.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctx init` | Create `.ctx/config.toml` and the index store |
//! | `ctx source add <id> <path>` | Configure a source root |
//! | `ctx source remove <id>` | Drop a source and its indexed chunks |
//! | `ctx source list` | Show configured sources |
//! | `ctx index` | Discover, chunk, embed and store every source |
//! | `ctx select "<query>"` | Select relevant chunks within a budget |
//! | `ctx status` | Show what is indexed |
//! | `ctx serve` | Serve `select`, `index`, `status` as MCP tools over stdio |
//!
//! ## Examples
//!
//! ```bash
//! ctx init
//! ctx source add src ./src --include '**/*.rs' --exclude '**/generated/**'
//! ctx index
//! ctx select "how are chunk ids derived" --budget 2000 --explain
//! ctx select "error handling" --format json --sources src
//! ```
//!
//! Errors print one line to stderr. Usage errors (bad budget, unknown
//! source) exit with 2, everything else with 1. Logs go to stderr; raise
//! the level with `-v` / `-vv` or `RUST_LOG`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use context_pack::config::{Config, Project, SourceConfig};
use context_pack::embedding::EmbeddingAdapter;
use context_pack::error::ContextError;
use context_pack::format::format;
use context_pack::index::run_index;
use context_pack::mcp::run_stdio_server;
use context_pack::select::{select, validate_budget, SelectRequest};
use context_pack::sources::{add_source, remove_source, render_list};
use context_pack::status::status;
use context_pack::store::IndexStore;

/// Context Pack: local context retrieval for AI tools.
#[derive(Parser)]
#[command(
    name = "ctx",
    about = "Context Pack: select the most relevant project context for a query within a token budget",
    version,
    long_about = "Context Pack indexes a project's text files into token-bounded chunks with \
    embeddings, and selects the chunks most relevant to a natural-language query, packed to fit \
    a token budget. The same operations are exposed as MCP tools over stdio."
)]
struct Cli {
    /// Project root holding the `.ctx/` directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the project.
    ///
    /// Creates `.ctx/config.toml` with defaults (an existing file is kept)
    /// and the index store. Running it again is safe.
    Init,

    /// Manage source roots.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Index configured sources.
    ///
    /// Discovers files, chunks them, embeds new or changed chunks and
    /// replaces each source's chunks atomically. Without `--source`, sources
    /// removed from the config are dropped from the index.
    Index {
        /// Only index these sources (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Select the chunks most relevant to a query.
    Select {
        /// Natural-language query.
        query: String,

        /// Token budget (defaults to `retrieval.default_budget`).
        #[arg(long, allow_negative_numbers = true)]
        budget: Option<i64>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Comma-separated source ids to search.
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Show similarity and boost per chunk.
        #[arg(long)]
        explain: bool,
    },

    /// Show index status.
    Status {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Serve the `select`, `index` and `status` tools over MCP stdio.
    Serve,
}

#[derive(Subcommand)]
enum SourceAction {
    /// Add a source root.
    Add {
        /// Unique source id.
        id: String,
        /// Directory, relative to the project root.
        path: PathBuf,
        /// Include glob (repeatable; default `**/*`).
        #[arg(long)]
        include: Vec<String>,
        /// Exclude glob (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Remove a source and delete its indexed chunks.
    Remove { id: String },
    /// List configured sources.
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .filter_module("sqlx", log::LevelFilter::Warn)
        .filter_module("ort", log::LevelFilter::Off)
        .init();
}

/// Print a single-line error (plus hint) and map it to an exit code.
fn report(e: anyhow::Error) -> ExitCode {
    match e.downcast_ref::<ContextError>() {
        Some(err) => {
            eprintln!("error: {}", err);
            if let Some(hint) = err.hint() {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(err.exit_code() as u8)
        }
        None => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let root = cli.root;

    match cli.command {
        Commands::Init => {
            let project = match Project::load(&root) {
                Ok(project) => project,
                Err(ContextError::NotInitialized(_)) => {
                    let project = Project::new(&root, Config::default());
                    project.save()?;
                    project
                }
                Err(e) => return Err(e.into()),
            };
            IndexStore::initialize(&project.store_path()).await?.close().await;
            println!("Initialized {}", project.ctx_dir().display());
        }

        Commands::Source { action } => {
            let mut project = Project::load(&root)?;
            match action {
                SourceAction::Add {
                    id,
                    path,
                    include,
                    exclude,
                } => {
                    let mut source = SourceConfig::new(&id, path);
                    if !include.is_empty() {
                        source.include = include;
                    }
                    source.exclude = exclude;
                    add_source(&mut project, source)?;
                    println!("Added source '{}'. Run `ctx index` to index it.", id);
                }
                SourceAction::Remove { id } => {
                    let store = open_existing(&project).await?;
                    remove_source(&mut project, store.as_ref(), &id).await?;
                    if let Some(store) = store {
                        store.close().await;
                    }
                    println!("Removed source '{}'.", id);
                }
                SourceAction::List => print!("{}", render_list(&project)),
            }
        }

        Commands::Index { sources, format } => {
            let project = Project::load(&root)?;
            let store = IndexStore::open(&project.store_path()).await?;
            let adapter = EmbeddingAdapter::from_config(&project.config.embedding)?;
            let filter = (!sources.is_empty()).then_some(sources.as_slice());
            let report = run_index(&project, &store, &adapter, filter).await;
            store.close().await;
            let report = report?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print!("{}", report.render_text()),
            }
            if report.failed() > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Select {
            query,
            budget,
            format: output,
            sources,
            explain,
        } => {
            // Reject a bad budget before touching the project or the store.
            if let Some(budget) = budget {
                validate_budget(budget)?;
            }
            let project = Project::load(&root)?;
            let store = IndexStore::open(&project.store_path()).await?;
            let adapter = EmbeddingAdapter::from_config(&project.config.embedding)?;
            let request = SelectRequest {
                query,
                budget,
                sources: (!sources.is_empty()).then_some(sources),
            };
            let result = select(&project, &store, &adapter, &request).await;
            store.close().await;
            let result = result?;

            if result.is_empty {
                eprintln!("warning: the index is empty; run `ctx index` first");
            }
            let formatted = format(&result, explain);
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&formatted.data)?),
                OutputFormat::Text => print!("{}", formatted.text),
            }
        }

        Commands::Status { format } => {
            let project = Project::load(&root)?;
            let store = open_existing(&project).await?;
            let adapter = EmbeddingAdapter::from_config(&project.config.embedding)?;
            let report = status(&project, store.as_ref(), &adapter).await;
            if let Some(store) = store {
                store.close().await;
            }
            let report = report?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print!("{}", report.render_text()),
            }
        }

        Commands::Serve => {
            let project = Project::load(&root)?;
            run_stdio_server(project).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Open the store if its file exists.
async fn open_existing(project: &Project) -> Result<Option<IndexStore>, ContextError> {
    let path = project.store_path();
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(IndexStore::open(&path).await?))
}
