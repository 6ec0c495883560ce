//! ragpipe CLI - for exercising the retrieval pipeline
//!
//! # Commands
//!
//! ```bash
//! # Chunk a document and show results
//! ragpipe chunk --merge-min 100 notes.md
//!
//! # Embed text and show vector stats
//! ragpipe embed "What is retrieval-augmented generation?"
//!
//! # Index files and ask a question through the full pipeline
//! ragpipe ask "What is RAG?" guide.txt notes.md --web
//! ```
//!
//! Settings come from `--config <file.toml>` and `RAGPIPE_*` variables;
//! logging is controlled by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ragpipe_lib::{
    chunk::{chunk_stats, merge_small, Chunk, Chunker, DocumentMetadata, FileType, PageChunker},
    config::{ChunkingSettings, Settings},
    embed::{EmbeddingClient, LocalEmbedder},
    pipeline::{ExtractiveGenerator, Pipeline, PipelineComponents, RuleBasedAnalyzer},
    rerank::SimilarityReranker,
    search::HybridRetriever,
    sparse::SparseIndex,
    store::MemoryStore,
    web::{build_web_search, WebSearch},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ragpipe")]
#[command(about = "Hybrid retrieval pipeline for retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a document and show the chunks
    Chunk {
        /// Extracted text of a .pdf, .txt or .md document
        input: PathBuf,

        /// Merge runs of chunks shorter than this many characters
        #[arg(long)]
        merge_min: Option<usize>,
    },

    /// Embed text and show vector info
    Embed {
        /// Text to embed
        text: String,
    },

    /// Index documents and answer a query through every pipeline stage
    Ask {
        /// The question
        query: String,

        /// Documents to index first
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Allow web search for queries that ask for recent information
        #[arg(short, long)]
        web: bool,

        /// Print the whole pipeline state as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_document(path: &Path, chunking: &ChunkingSettings) -> Result<Vec<Chunk>> {
    let file_type = FileType::from_path(path)?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {} (PDFs must be passed as extracted text)", path.display()))?;

    let filename = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let metadata = DocumentMetadata::new(Uuid::new_v4().to_string(), filename, file_type);

    let chunker = PageChunker::new(chunking.chunk_size, chunking.chunk_overlap)?
        .with_min_chunk_chars(chunking.min_chunk_chars);
    Ok(chunker.chunk(&text, &metadata))
}

fn embedding_client(settings: &Settings) -> Result<Arc<EmbeddingClient>> {
    println!("Loading {} (first run downloads the model)...", settings.embedding.model);
    let model = LocalEmbedder::from_settings(&settings.embedding)?;
    let client = EmbeddingClient::new(Arc::new(model));
    if client.dimension() != settings.embedding.dimension {
        bail!(
            "{} produces {}-dimensional vectors, settings expect {}",
            client.model_name(),
            client.dimension(),
            settings.embedding.dimension
        );
    }
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Chunk { input, merge_min } => {
            let mut chunks = load_document(&input, &settings.chunking)?;
            if let Some(min_size) = merge_min {
                chunks = merge_small(chunks, min_size);
            }

            let stats = chunk_stats(&chunks);
            println!(
                "Chunked '{}' into {} chunks (avg {} chars, min {}, max {}):\n",
                input.display(),
                stats.total_chunks,
                stats.avg_chunk_size,
                stats.min_chunk_size,
                stats.max_chunk_size
            );
            for chunk in &chunks {
                let page = chunk
                    .metadata
                    .page_number
                    .map(|p| format!(", page {p}"))
                    .unwrap_or_default();
                println!("--- {} ({} chars{page}) ---", chunk.id, chunk.content.chars().count());
                let preview: String = chunk.content.chars().take(200).collect();
                let ellipsis = if chunk.content.chars().count() > 200 { "..." } else { "" };
                println!("{preview}{ellipsis}\n");
            }
        }

        Commands::Embed { text } => {
            let client = embedding_client(&settings)?;
            let embedding = client.embed(&text)?;

            println!("\nEmbedding stats:");
            println!("  Dimensions: {}", embedding.len());
            println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
            println!("  Min: {:.4}", embedding.iter().copied().fold(f32::INFINITY, f32::min));
            println!("  Max: {:.4}", embedding.iter().copied().fold(f32::NEG_INFINITY, f32::max));
        }

        Commands::Ask {
            query,
            inputs,
            web,
            json,
        } => {
            let mut corpus = Vec::new();
            for input in &inputs {
                let chunks = merge_small(
                    load_document(input, &settings.chunking)?,
                    settings.chunking.merge_min_size,
                );
                if chunks.is_empty() {
                    warn!(file = %input.display(), "no chunks produced");
                }
                corpus.extend(chunks);
            }
            if corpus.is_empty() {
                bail!("nothing to index");
            }

            let embeddings = embedding_client(&settings)?;
            let retriever = HybridRetriever::new(
                Arc::new(MemoryStore::new(embeddings.clone())),
                Arc::new(SparseIndex::new()),
            );
            let stored = retriever.index_corpus(&corpus).await?;
            info!(documents = inputs.len(), chunks = stored, "indexed corpus");

            let web: Option<Arc<dyn WebSearch>> = if web {
                Some(Arc::from(build_web_search(&settings.web_search)?))
            } else {
                None
            };

            let pipeline = Pipeline::from_components(
                PipelineComponents {
                    retriever: Arc::new(retriever),
                    reranker: Arc::new(SimilarityReranker::new(embeddings)),
                    analyzer: Arc::new(RuleBasedAnalyzer),
                    generator: Arc::new(ExtractiveGenerator::default()),
                    web,
                },
                &settings,
            )?;

            let state = pipeline.run(&query, None).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else if let Some(error) = &state.error {
                bail!("{error}");
            } else {
                let trace: Vec<&str> = state.stages.iter().map(|stage| stage.as_str()).collect();
                println!("\n{}", state.final_response.unwrap_or_default());
                println!("Stages: {}", trace.join(" -> "));
            }
        }
    }

    Ok(())
}
