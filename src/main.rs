use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Hybrid ranking toolkit for religious-text search", long_about = None)]
struct Cli {
    /// Config file (defaults to $KITAB_CONFIG, then .kitab/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Content type of the documents in a fuse request
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Kind {
    Book,
    Verse,
    Tradition,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse per-variant semantic and keyword lists from a JSON request
    Fuse {
        /// Request file ("-" for stdin)
        input: PathBuf,

        /// Content type of the documents
        #[arg(short, long, value_enum, default_value = "book")]
        kind: Kind,

        /// Maximum results to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Score one text against query terms with BM25
    Bm25 {
        /// Document text
        #[arg(long)]
        text: String,

        /// Query terms (e.g., --terms mercy,patience)
        #[arg(long, value_delimiter = ',', required = true)]
        terms: Vec<String>,

        /// Documents in the corpus
        #[arg(long)]
        total_docs: u64,

        /// Average document length in words
        #[arg(long)]
        avg_len: f32,

        /// Document frequency per term (e.g., --df mercy=12)
        #[arg(long)]
        df: Vec<String>,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the effective ranking configuration
    Config {
        /// Show built-in defaults instead of the loaded file
        #[arg(long)]
        default: bool,

        /// Write the configuration to this path instead of printing it
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KITAB_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fuse {
            input,
            kind,
            limit,
            json,
        } => {
            let config = kitab::config::load(cli.config.as_deref())?;
            commands::fuse::execute(&input, kind, limit, json, &config)?;
        }
        Commands::Bm25 {
            text,
            terms,
            total_docs,
            avg_len,
            df,
            json,
        } => {
            let config = kitab::config::load(cli.config.as_deref())?;
            let args = commands::bm25::Bm25Args {
                text,
                terms,
                total_docs,
                avg_len,
                df,
            };
            commands::bm25::execute(&args, json, &config)?;
        }
        Commands::Config { default, write } => {
            commands::config::execute(cli.config.as_deref(), default, write.as_deref())?;
        }
    }

    Ok(())
}
