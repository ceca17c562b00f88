mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docsage", about = "Index documents and ask questions about them", version)]
pub(crate) struct Cli {
    /// Saved vector index
    #[arg(long, global = true, default_value = "data/vectors/index.json")]
    index: PathBuf,

    /// JSON file with pipeline settings (chunk sizes, top_k, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedding and generation backend
    #[arg(long, global = true, value_enum, default_value = "hash")]
    provider: Provider,

    /// Vector size for the hash embedder
    #[arg(long, global = true, default_value_t = 384)]
    dimensions: usize,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Provider {
    /// Offline feature hashing; no answer generation
    Hash,
    /// OpenAI embeddings and chat completions (needs OPENAI_API_KEY)
    #[cfg(feature = "openai")]
    Openai,
    /// Gemini embeddings and generateContent (needs GEMINI_API_KEY)
    #[cfg(feature = "gemini")]
    Gemini,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Add PDF, Markdown or HTML files to the index
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the passages most similar to a query
    Query {
        text: String,
        /// Number of passages (defaults to top_k from the config)
        #[arg(short, long)]
        k: Option<usize>,
        /// Drop passages scoring below this
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Answer a question from the indexed documents
    Ask {
        question: String,
        /// JSON chat history; read for context and appended to
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Remove a document and its chunks from the index
    Delete { document_id: String },

    /// Summarize what the index holds
    Stats,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    commands::run(cli, &cancel).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["docsage", "query", "restore", "-k", "3", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.index, PathBuf::from("data/vectors/index.json"));
        assert!(matches!(cli.command, Command::Query { k: Some(3), .. }));
    }

    #[test]
    fn ingest_needs_at_least_one_file() {
        assert!(Cli::try_parse_from(["docsage", "ingest"]).is_err());
    }
}
