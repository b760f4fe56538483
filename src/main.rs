//! docrag CLI: ingest plain-text documents and answer questions over
//! them with RAG, HyDE or GraphRAG.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docrag::{
    AnswerOptions, Embedder, EmbeddingReranker, Generator, GraphRagPipeline, HashEmbedder,
    HeuristicParser, OpenAiEmbedder, OpenAiGenerator, PipelineConfig, RagPipeline,
    SamplingParams, SourceKind, Tokenizer, WordTokenizer,
};

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Hybrid RAG + GraphRAG question answering over local documents")]
struct Cli {
    /// Path to a YAML config file (default: docrag.yml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Args)]
struct RetrievalArgs {
    /// Number of passages to retrieve per source
    #[arg(long, default_value_t = 3)]
    top_k: usize,

    /// Max new tokens for the answer
    #[arg(long, default_value_t = 200)]
    max_length: usize,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Disable sampling (deterministic generation)
    #[arg(long)]
    no_sample: bool,

    /// Comma-separated sources to retrieve from: user,db
    #[arg(long, default_value = "user,db")]
    sources: String,

    /// Score candidates with BM25 instead of the vector index
    #[arg(long)]
    bm25: bool,

    /// Rerank retrieved candidates before generation
    #[arg(long)]
    rerank: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Index plain-text files or directories into a corpus
    Ingest {
        /// Target corpus: user or db
        #[arg(long, default_value = "user")]
        source: String,

        /// Files or directories (.txt / .md) to index
        paths: Vec<PathBuf>,
    },

    /// Answer a question with direct RAG
    Ask {
        query: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Answer a question with HyDE (pseudo-answer driven retrieval)
    Hyde {
        query: String,

        /// Token bound for the generated pseudo-answer
        #[arg(long, default_value_t = 50)]
        pseudo_max_tokens: usize,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Answer with both RAG and HyDE and print both answers
    Compare {
        query: String,

        /// Token bound for the generated pseudo-answer
        #[arg(long, default_value_t = 50)]
        pseudo_max_tokens: usize,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Build the knowledge graph and answer through it
    Graph {
        query: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Remove all user-uploaded documents
    ClearDocs,

    /// Delete the persisted answer cache
    ClearCache,

    /// Show corpus statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docrag=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::load(),
    };

    match cli.command {
        Command::Ingest { source, paths } => {
            let source: SourceKind = source.parse()?;
            let mut pipeline = build_pipeline(config, &RetrievalArgs::default_args(), false)?;
            let mut total = 0;
            for file in collect_text_files(&paths)? {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let doc_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string());
                total += pipeline.add_document(source, &doc_name, &text).await?;
            }
            pipeline.save(source)?;
            println!("Indexed {} chunks into the {} corpus", total, source);
        }

        Command::Ask { query, retrieval } => {
            let pipeline = build_pipeline(config, &retrieval, true)?;
            let opts = retrieval.to_options()?;
            let answer = pipeline.answer(&query, &opts).await?;
            println!("{}", answer);
        }

        Command::Hyde {
            query,
            pseudo_max_tokens,
            retrieval,
        } => {
            let pipeline = build_pipeline(config, &retrieval, true)?;
            let opts = retrieval.to_options()?;
            let answer = pipeline.hyde_answer(&query, &opts, pseudo_max_tokens).await?;
            println!("{}", answer);
        }

        Command::Compare {
            query,
            pseudo_max_tokens,
            retrieval,
        } => {
            let pipeline = build_pipeline(config, &retrieval, true)?;
            let opts = retrieval.to_options()?;
            let rag_answer = pipeline.answer(&query, &opts).await?;
            let hyde_answer = pipeline.hyde_answer(&query, &opts, pseudo_max_tokens).await?;
            println!("=== RAG answer ===\n{}\n", rag_answer);
            println!("=== HyDE answer ===\n{}", hyde_answer);
        }

        Command::Graph { query, retrieval } => {
            let pipeline = build_pipeline(config, &retrieval, true)?;
            let opts = retrieval.to_options()?;
            let mut graph = GraphRagPipeline::new(pipeline, Arc::new(HeuristicParser::new()));
            graph.build_graph();
            let answer = graph.query(&query, &opts).await?;
            println!("{}", answer);
        }

        Command::ClearDocs => {
            let mut pipeline = build_pipeline(config, &RetrievalArgs::default_args(), false)?;
            pipeline.clear_user_documents()?;
            println!("All uploaded documents cleared");
        }

        Command::ClearCache => {
            let pipeline = build_pipeline(config, &RetrievalArgs::default_args(), false)?;
            pipeline.clear_cache()?;
            println!("Answer cache cleared");
        }

        Command::Stats => {
            let pipeline = build_pipeline(config, &RetrievalArgs::default_args(), false)?;
            let stats = pipeline.stats();
            println!("User corpus: {} passages", stats.user_passages);
            println!("Db corpus:   {} passages", stats.db_passages);
            println!("Doc hash:    {}", pipeline.doc_hash());
        }
    }

    Ok(())
}

impl RetrievalArgs {
    fn default_args() -> Self {
        Self {
            top_k: 3,
            max_length: 200,
            temperature: 0.7,
            no_sample: false,
            sources: "user,db".to_string(),
            bm25: false,
            rerank: false,
        }
    }

    fn to_options(&self) -> anyhow::Result<AnswerOptions> {
        Ok(AnswerOptions {
            sources: SourceKind::parse_list(&self.sources)?,
            top_k: self.top_k.max(1),
            max_length: self.max_length.max(1),
            temperature: self.temperature.clamp(0.0, 1.0),
            do_sample: !self.no_sample,
        })
    }
}

/// Refuses generation for commands that never answer (ingest, stats,
/// clear-*), so those work without an API key.
struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _max_new_tokens: usize,
        _sampling: &SamplingParams,
    ) -> docrag::Result<String> {
        Err(docrag::Error::GenerationError(
            "this command does not generate answers".to_string(),
        ))
    }
}

/// Wire up the pipeline: OpenAI models when a key is available, the
/// deterministic local embedder otherwise. The generator is only
/// constructed (and its API key required) when the command answers.
fn build_pipeline(
    mut config: PipelineConfig,
    args: &RetrievalArgs,
    needs_generator: bool,
) -> anyhow::Result<RagPipeline> {
    config.use_bm25 = config.use_bm25 || args.bm25;

    let embedder: Arc<dyn Embedder> = match OpenAiEmbedder::new(&config.embedding_model) {
        Ok(embedder) => {
            info!("Using OpenAI embeddings ({})", config.embedding_model);
            Arc::new(embedder)
        }
        Err(err) => {
            warn!("Falling back to local hash embeddings ({})", err);
            Arc::new(HashEmbedder::default())
        }
    };
    let generator: Arc<dyn Generator> = if needs_generator {
        Arc::new(OpenAiGenerator::from_env(&config.generator_model)?)
    } else {
        Arc::new(DisabledGenerator)
    };
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(WordTokenizer::new());

    let pipeline = RagPipeline::new(config, Arc::clone(&embedder), generator, tokenizer)?;
    Ok(if args.rerank {
        pipeline.with_reranker(Arc::new(EmbeddingReranker::new(embedder)))
    } else {
        pipeline
    })
}

/// Expand the given paths into a flat list of .txt / .md files.
fn collect_text_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && is_text_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("no such file or directory: {}", path.display());
        }
    }
    if files.is_empty() {
        anyhow::bail!("no ingestable files found (expected .txt or .md)");
    }
    Ok(files)
}

fn is_text_file(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("txt") | Some("md")
    )
}
