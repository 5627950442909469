use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use quote_normalize::Config;
use quote_normalize::pipeline::{self, BuildOptions, SimilarOptions};

#[derive(Parser)]
#[command(
    name = "quote_normalize",
    about = "Normalize raw dialogue transcripts into a speaker-resolved dataset"
)]
struct Cli {
    /// Data directory holding raw/, truth/, characters/ and the description files
    #[arg(long, global = true, env = "QUOTE_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse raw transcripts into truth/episodes and seed the speaker mapping
    Truth,
    /// Resolve every speaker through the mapping into the canonical list
    Merge,
    /// Build or update the speaker identifier table
    Ids,
    /// Build or update the character classification table
    Meta,
    /// Copy classifications from meta.json back into the identifier table
    MetaUpdate,
    /// Compile parsed episodes against the curated tables
    Compile,
    /// Assemble the presentation dataset
    Build {
        /// Output directory (defaults to the configured build directory)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the full nested dataset as data.json
        #[arg(long)]
        mega: bool,
    },
    /// Find speaker mapping entries similar to TEXT
    Similar {
        text: String,
        /// Search destinations instead of sources
        #[arg(short, long)]
        destination: bool,
        /// Number of results; -1 for all
        #[arg(short = 'n', long = "results", default_value_t = 5, allow_negative_numbers = true)]
        results: i64,
        /// Minimum similarity in [0, 1]
        #[arg(long)]
        cutoff: Option<f64>,
        /// Keep duplicate names separate
        #[arg(long)]
        no_merge: bool,
        /// Best match last
        #[arg(short, long)]
        reversed: bool,
    },
    /// Check the curated tables for likely mistakes
    Check,
    /// Run every stage in order
    RunAll {
        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt} [y/N] ")?;
    stderr.flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.data_dir)
        .with_context(|| format!("loading configuration from {}", cli.data_dir.display()))?;

    match cli.command {
        Command::Truth => {
            let summary = pipeline::run_truth(&config).context("truth stage failed")?;
            if summary.failed > 0 {
                tracing::warn!("{} transcripts need fixing before they are included", summary.failed);
            }
        }
        Command::Merge => {
            pipeline::run_merge(&config).context("merge stage failed")?;
        }
        Command::Ids => {
            pipeline::run_ids(&config).context("ids stage failed")?;
        }
        Command::Meta => {
            pipeline::run_meta(&config).context("meta stage failed")?;
        }
        Command::MetaUpdate => {
            pipeline::run_meta_update(&config).context("meta-update failed")?;
        }
        Command::Compile => {
            pipeline::run_compile(&config).context("compile stage failed")?;
        }
        Command::Build { out, mega } => {
            pipeline::run_build(&config, &BuildOptions { out, mega }).context("build stage failed")?;
        }
        Command::Similar {
            text,
            destination,
            results,
            cutoff,
            no_merge,
            reversed,
        } => {
            if results == 0 || results < -1 {
                bail!("--results must be positive or -1, got {results}");
            }
            let options = SimilarOptions {
                text,
                destination,
                limit: usize::try_from(results).ok(),
                cutoff,
                no_merge,
                reversed,
            };
            for line in pipeline::run_similar(&config, &options).context("similar failed")? {
                println!("{line}");
            }
        }
        Command::Check => {
            pipeline::run_check(&config).context("check failed")?;
        }
        Command::RunAll { confirm: confirmed } => {
            tracing::warn!("`run-all` command running...");
            if confirmed || confirm("This can overwrite uncommitted data. Are you sure?")? {
                pipeline::run_all(&config)?;
            } else {
                tracing::info!("Canceled.");
            }
        }
    }

    Ok(())
}
