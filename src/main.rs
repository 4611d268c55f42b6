use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use treeidx::index::{build_index, snapshot};
use treeidx::output;
use treeidx::server::{Worker, WorkerHandle, serve_framed};
use treeidx::utils::{AppConfig, Tokenizer, get_config_path};

#[derive(Parser)]
#[command(name = "treeidx")]
#[command(about = "Ranked full-text search over a directory tree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from scratch and write its snapshot
    Index {
        /// Root of the tree to index
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Search the index, building it first if needed
    Search {
        /// Query terms
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// Root of the indexed tree
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the state of the index for a tree
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Delete the snapshot for a tree
    Remove {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Run a worker speaking the framed protocol on stdin/stdout
    Worker {
        /// Root of the tree this worker owns
        #[arg(long)]
        root: PathBuf,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TREEIDX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries worker frames, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn resolve_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Cannot open {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::load()?;
    let color = !cli.no_color;

    match cli.command {
        Commands::Index { path, quiet } => {
            let root = resolve_root(&path)?;
            let tokenizer = Tokenizer::by_name(&config.index.tokenizer)
                .ok_or_else(|| anyhow!("Unknown tokenizer `{}`", config.index.tokenizer))?;

            let (index, report) = build_index(&root, &config.index, tokenizer, quiet)
                .with_context(|| format!("Failed to index {}", root.display()))?;

            let snapshot_path = snapshot::snapshot_path(&root, &config.index);
            snapshot::save(&index, &snapshot_path).context("Failed to write snapshot")?;

            println!(
                "Indexed {} of {} files ({} unreadable) -> {}",
                report.indexed,
                report.discovered,
                report.failed,
                snapshot_path.display()
            );
        }

        Commands::Search {
            query,
            path,
            limit,
            json,
        } => {
            let root = resolve_root(&path)?;
            let handle = WorkerHandle::spawn(&root, config.index.clone(), config.request_timeout())?;

            let mut hits = handle.search(&query.join(" "))?;
            handle.stop()?;

            if let Some(limit) = limit {
                hits.truncate(limit);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                output::print_hits(&hits, color)?;
            }
        }

        Commands::Status { path } => {
            let root = resolve_root(&path)?;
            let snapshot_path = snapshot::snapshot_path(&root, &config.index);
            let snapshot = snapshot_path.exists().then_some(snapshot_path.as_path());

            let handle = WorkerHandle::spawn(&root, config.index.clone(), config.request_timeout())?;
            let (state, documents) = handle.probe()?;
            handle.stop()?;

            output::print_status(&root, state, documents, snapshot, color)?;
        }

        Commands::Remove { path } => {
            let root = resolve_root(&path)?;
            let snapshot_path = snapshot::snapshot_path(&root, &config.index);

            match fs::remove_file(&snapshot_path) {
                Ok(()) => println!("Removed index for: {}", root.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    println!("No index found for: {}", root.display())
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", snapshot_path.display()));
                }
            }
        }

        Commands::Worker { root } => {
            let root = resolve_root(&root)?;
            let worker = Worker::new(&root, config.index.clone())?;
            tracing::info!(root = %root.display(), "worker started");

            let stdin = io::stdin();
            let stdout = io::stdout();
            serve_framed(worker, stdin.lock(), stdout.lock())?;
        }

        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config.save()?;
                println!("Wrote {}", get_config_path()?.display());
            }
        }
    }

    Ok(())
}
