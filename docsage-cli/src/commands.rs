use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use docsage_rag::{
    ChatTurn, EmbeddingProvider, GenerationProvider, HashEmbeddingProvider, InMemoryVectorIndex,
    RagConfig, RagError, RagPipeline, Retrieval, SourceAttribution, Upload, VectorIndex,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Cli, Command, Provider};

struct Providers {
    embedding: Arc<dyn EmbeddingProvider>,
    generation: Option<Arc<dyn GenerationProvider>>,
}

impl Providers {
    fn new(provider: Provider, dimensions: usize) -> Result<Self> {
        match provider {
            Provider::Hash => Ok(Self {
                embedding: Arc::new(HashEmbeddingProvider::new(dimensions)?),
                generation: None,
            }),
            #[cfg(feature = "openai")]
            Provider::Openai => Ok(Self {
                embedding: Arc::new(docsage_rag::OpenAIEmbeddingProvider::from_env()?),
                generation: Some(Arc::new(docsage_rag::OpenAIGenerationProvider::from_env()?)),
            }),
            #[cfg(feature = "gemini")]
            Provider::Gemini => Ok(Self {
                embedding: Arc::new(docsage_rag::GeminiEmbeddingProvider::from_env()?),
                generation: Some(Arc::new(docsage_rag::GeminiGenerationProvider::from_env()?)),
            }),
        }
    }
}

/// A missing generator is the only config error `ask` can hit after the
/// pipeline is built; point at the flag that fixes it.
fn explain_ask_error(err: RagError) -> anyhow::Error {
    match err {
        RagError::ConfigError(_) => anyhow::Error::new(err)
            .context("ask needs a generation backend, e.g. --provider openai or --provider gemini"),
        other => other.into(),
    }
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn load_history(path: &Path) -> Result<Vec<ChatTurn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid history {}", path.display()))
}

fn save_history(path: &Path, history: &[ChatTurn]) -> Result<()> {
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json).with_context(|| format!("failed to write history {}", path.display()))
}

pub(crate) async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Command::Query { k, min_score, .. } = &cli.command {
        if let Some(k) = k {
            config.top_k = *k;
        }
        if min_score.is_some() {
            config.min_score = *min_score;
        }
    }

    let providers = Providers::new(cli.provider, cli.dimensions)?;
    let index = Arc::new(
        InMemoryVectorIndex::restore_or_new(&cli.index, providers.embedding.dimensions())
            .await
            .with_context(|| format!("failed to open index {}", cli.index.display()))?,
    );

    let mut builder = RagPipeline::builder()
        .config(config)
        .embedding_provider(providers.embedding)
        .index(index.clone());
    if let Some(generation) = providers.generation {
        builder = builder.generation_provider(generation);
    }
    let pipeline = builder.build()?;

    match cli.command {
        Command::Ingest { files } => {
            ingest(&pipeline, &files, cancel, cli.json).await?;
            save(&index, &cli.index).await
        }
        Command::Query { text, .. } => query(&pipeline, &text, cli.json).await,
        Command::Ask { question, history } => {
            ask(&pipeline, &question, history.as_deref(), cli.json).await
        }
        Command::Delete { document_id } => {
            let removed = pipeline.delete_document(&document_id).await?;
            println!("Removed {removed} chunks of {document_id}");
            save(&index, &cli.index).await
        }
        Command::Stats => stats(index.as_ref(), cli.json).await,
    }
}

async fn save(index: &InMemoryVectorIndex, path: &Path) -> Result<()> {
    index.save(path).await.with_context(|| format!("failed to save index {}", path.display()))
}

async fn ingest(
    pipeline: &RagPipeline,
    files: &[PathBuf],
    cancel: &CancellationToken,
    json: bool,
) -> Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    let mut unreadable = 0usize;
    for path in files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match tokio::fs::read(path).await {
            Ok(bytes) => uploads.push(Upload::new(filename, bytes)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file");
                eprintln!("✗ {}: {e}", path.display());
                unreadable += 1;
            }
        }
    }

    let report = pipeline.ingest_batch(uploads, cancel).await;

    if json {
        let ingested: Vec<_> = report.ingested.iter().map(|d| &d.document).collect();
        println!("{}", serde_json::to_string_pretty(&ingested)?);
    } else {
        for done in &report.ingested {
            println!(
                "✓ {} ({}): {} chunks",
                done.document.source_filename, done.document.id, done.chunk_count
            );
        }
    }
    for failure in &report.failed {
        eprintln!("✗ {}: {}", failure.filename, failure.error);
    }

    info!(ingested = report.ingested.len(), failed = report.failed.len() + unreadable, "ingest finished");
    if report.ingested.is_empty() {
        bail!("no documents were ingested");
    }
    Ok(())
}

async fn query(pipeline: &RagPipeline, text: &str, json: bool) -> Result<()> {
    match pipeline.retrieve(text).await? {
        Retrieval::Relevant(results) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    println!("{}", SourceAttribution::from(result));
                }
            }
        }
        Retrieval::NoRelevantContext { best_score } => match best_score {
            Some(score) => println!("No passage cleared the score floor (best {score:.2})"),
            None => println!("No passage cleared the score floor"),
        },
        Retrieval::EmptyIndex => println!("The index is empty; ingest some documents first"),
    }
    Ok(())
}

async fn ask(
    pipeline: &RagPipeline,
    question: &str,
    history_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mut history = match history_path {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let answer = pipeline
        .ask_follow_up(question, &history)
        .await
        .map_err(explain_ask_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.text);
        if !answer.sources.is_empty() {
            println!("\nSources:");
            for source in &answer.sources {
                println!("  {source}");
            }
        }
    }

    if let Some(path) = history_path {
        history.push(ChatTurn::user(question));
        history.push(ChatTurn::assistant(answer.text));
        save_history(path, &history)?;
    }
    Ok(())
}

async fn stats(index: &InMemoryVectorIndex, json: bool) -> Result<()> {
    let documents = index.document_ids().await;
    let chunks = index.len().await;
    let dimension = index.dimension().await;

    if json {
        let summary = serde_json::json!({
            "chunks": chunks,
            "dimension": dimension,
            "documents": documents,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} chunks from {} documents", chunks, documents.len());
    if let Some(dimension) = dimension {
        println!("dimension: {dimension}");
    }
    for (document_id, count) in &documents {
        println!("  {document_id}: {count} chunks");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use docsage_rag::NoContextPolicy;

    use super::*;

    #[test]
    fn missing_config_means_defaults() {
        assert_eq!(load_config(None).unwrap(), RagConfig::default());
    }

    #[test]
    fn partial_config_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsage.json");
        std::fs::write(
            &path,
            r#"{"top_k": 8, "chunking": {"max_chunk_chars": 500}, "no_context_policy": "answer_without_context"}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.top_k, 8);
        assert_eq!(config.chunking.max_chunk_chars, 500);
        assert_eq!(config.chunking.overlap_chars, RagConfig::default().chunking.overlap_chars);
        assert_eq!(config.no_context_policy, NoContextPolicy::AnswerWithoutContext);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsage.json");
        std::fs::write(&path, r#"{"top_k": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn only_missing_generator_errors_get_the_backend_hint() {
        let missing = explain_ask_error(RagError::ConfigError("no generation provider".into()));
        assert!(missing.to_string().starts_with("ask needs a generation backend"));
        assert!(format!("{missing:#}").contains("no generation provider"));

        let limited = explain_ask_error(RagError::RateLimited {
            provider: "OpenAI".into(),
            message: "slow down".into(),
            retry_after: None,
        });
        assert!(!format!("{limited:#}").contains("generation backend"));
        assert!(matches!(limited.downcast_ref::<RagError>(), Some(RagError::RateLimited { .. })));

        let mismatch = explain_ask_error(RagError::DimensionMismatch { expected: 384, actual: 1536 });
        assert_eq!(mismatch.to_string(), "Dimension mismatch: expected 384, got 1536");
    }

    #[test]
    fn history_round_trips_and_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        assert!(load_history(&path).unwrap().is_empty());

        let turns = vec![ChatTurn::user("what is it?"), ChatTurn::assistant("a tool")];
        save_history(&path, &turns).unwrap();
        assert_eq!(load_history(&path).unwrap(), turns);
    }
}
