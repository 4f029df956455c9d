use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pdf_digest_core::{
    build_provider, search, CharacterNgramEmbedder, ChunkStore, DigestConfig, IngestOptions,
    IngestOutcome, IngestionPipeline, LlmProvider, LocalStore, MetadataValue, OverviewResult,
    ProviderKind, QdrantStore, Report, ReportWriter, SearchOutcome, SectionQuery,
    SectionedSummary, StoreBackend, SummarizeRequest, Summarizer, SummarizerSettings,
    SummaryResult, SummaryType,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pdf-digest",
    version,
    about = "Ingest PDFs into a chunk store and summarize them with an LLM."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SaveArgs {
    /// Write the result as a markdown report under the output directory.
    #[arg(long, default_value_t = false)]
    save: bool,

    /// Report file name stem (sanitized).
    #[arg(long)]
    filename: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and store one PDF.
    Scan {
        pdf: PathBuf,
        /// Extra chunk metadata as key=value; repeatable.
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, MetadataValue)>,
        /// Delete the document's previous chunks first.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Scan every matching PDF under a directory.
    ScanDir {
        dir: PathBuf,
        /// Glob relative to the directory; `**/*.pdf` recurses.
        #[arg(long, default_value = "*.pdf")]
        pattern: String,
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Similarity search over stored chunks.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Only chunks from this source file name.
        #[arg(long)]
        source: Option<String>,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Summarize retrieved chunks: comprehensive, executive or key_points.
    Summarize {
        #[arg(default_value = "comprehensive")]
        summary_type: String,
        /// Retrieval query; defaults to a generic topics query.
        query: Vec<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        n_chunks: Option<usize>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        /// openai or anthropic; defaults to DEFAULT_LLM_PROVIDER.
        #[arg(long)]
        provider: Option<String>,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Key-point summaries for introduction, main content, conclusions and key data.
    Sections {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// High-level overview with collection statistics.
    Overview {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Remove every chunk of one source file.
    Delete { source: String },
    /// Chunk store and report statistics.
    Stats,
    /// Show resolved configuration and API key status.
    Config,
    /// Stats, sample searches and one summary per type.
    Demo {
        #[arg(long)]
        provider: Option<String>,
    },
}

fn parse_meta(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in '{raw}'"));
    }
    Ok((key.to_string(), MetadataValue::parse_loose(value.trim())))
}

fn open_store(config: &DigestConfig) -> anyhow::Result<Box<dyn ChunkStore>> {
    let settings = &config.store;
    let embedder = CharacterNgramEmbedder::new(settings.embedding_dimensions);
    Ok(match settings.backend {
        StoreBackend::Local => Box::new(LocalStore::new(
            settings.persist_directory.clone(),
            settings.collection_name.clone(),
            embedder,
        )),
        StoreBackend::Qdrant => Box::new(
            QdrantStore::new(&settings.qdrant_url, &settings.collection_name, embedder)
                .context("invalid QDRANT_URL")?,
        ),
    })
}

/// Provider named on the command line, else the configured default.
fn open_provider(
    config: &DigestConfig,
    requested: Option<&str>,
) -> Result<(ProviderKind, Box<dyn LlmProvider>), String> {
    let describe = |error: pdf_digest_core::ConfigError| format!("{} ({error})", error.kind());
    let kind = match requested {
        Some(name) => name.parse::<ProviderKind>().map_err(describe)?,
        None => config.provider,
    };
    let provider = build_provider(config, kind).map_err(describe)?;
    Ok((kind, provider))
}

/// Tracks whether every reported result succeeded.
#[derive(Default)]
struct Outcome {
    failed: bool,
}

impl Outcome {
    fn record(&mut self, success: bool) {
        self.failed |= !success;
    }

    fn exit_code(&self) -> ExitCode {
        if self.failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

fn print_ingest(outcome: &IngestOutcome) {
    if outcome.success {
        println!(
            "ok   {}: {} chunks, {} characters",
            outcome.source, outcome.chunks_added, outcome.total_characters
        );
    } else {
        let kind = outcome
            .error_kind
            .map(|kind| kind.to_string())
            .unwrap_or_default();
        println!("fail {}: {} ({kind})", outcome.source, outcome.message);
    }
}

fn print_search(outcome: &SearchOutcome) {
    if !outcome.success {
        println!(
            "search failed: {}",
            outcome.message.as_deref().unwrap_or("unknown error")
        );
        return;
    }
    println!("query: {} ({} matches)", outcome.query, outcome.matches.len());
    for (position, hit) in outcome.matches.iter().enumerate() {
        let preview: String = hit.text.chars().take(200).collect();
        println!(
            "[{}] score={:.4} source={} chunk={}/{}",
            position + 1,
            hit.score,
            hit.metadata.source,
            hit.metadata.chunk_index,
            hit.metadata.total_chunks
        );
        println!("    {}", preview.replace('\n', " "));
    }
}

fn print_summary(result: &SummaryResult) {
    if result.success {
        println!(
            "== {} summary ({} via {}, {} chunks) ==",
            result.summary_type, result.model, result.provider, result.chunks_used
        );
        println!("{}", result.summary);
    } else {
        println!(
            "{} summary failed: {}",
            result.summary_type,
            result.message.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_sections(sectioned: &SectionedSummary) {
    for section in &sectioned.sections {
        println!("## {}", section.name);
        print_summary(&section.result);
        println!();
    }
    println!(
        "{}/{} sections generated",
        sectioned.succeeded(),
        sectioned.sections.len()
    );
}

fn print_overview(overview: &OverviewResult) {
    if let Some(stats) = &overview.stats {
        println!(
            "collection {}: {} chunks",
            stats.collection_name, stats.total_chunks
        );
    }
    if !overview.source_files.is_empty() {
        println!("sources: {}", overview.source_files.join(", "));
    }
    if let Some((min, max)) = overview.chunk_length_range {
        println!("chunk length: {min}-{max} characters");
    }
    print_summary(&overview.summary);
}

/// Saves when asked. A failed write is reported but does not change the exit code.
fn save_report(
    writer: &ReportWriter,
    save: &SaveArgs,
    report: Report<'_>,
    success: bool,
    source: Option<&str>,
) {
    if !save.save {
        return;
    }
    if !success {
        println!("not saving: the result was unsuccessful");
        return;
    }
    match writer.write_report(report, source, save.filename.as_deref()) {
        Ok(path) => println!("saved to {}", path.display()),
        Err(error) => {
            warn!(error = %error, kind = %error.kind(), "could not save report");
            println!("failed to save report: {error}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = DigestConfig::load().context("failed to load configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-digest boot"
    );

    if let Command::Config = cli.command {
        println!("{}", config.status());
        return Ok(ExitCode::SUCCESS);
    }

    let store = open_store(&config)?;
    let writer = ReportWriter::new(config.output_directory.clone());
    let mut outcome = Outcome::default();

    match cli.command {
        Command::Scan { pdf, meta, replace } => {
            let pipeline = IngestionPipeline::new(&*store, config.chunking);
            let options = IngestOptions {
                extra_metadata: meta.into_iter().collect(),
                replace_existing: replace,
            };
            let result = pipeline.ingest(&pdf, &options).await;
            print_ingest(&result);
            outcome.record(result.success);
        }
        Command::ScanDir {
            dir,
            pattern,
            replace,
        } => {
            let pipeline = IngestionPipeline::new(&*store, config.chunking);
            let options = IngestOptions {
                replace_existing: replace,
                ..IngestOptions::default()
            };
            let results = pipeline.ingest_directory(&dir, &pattern, &options).await;
            for result in &results {
                print_ingest(result);
                outcome.record(result.success);
            }
            let succeeded = results.iter().filter(|result| result.success).count();
            println!("{succeeded}/{} files ingested", results.len());
        }
        Command::Search {
            query,
            top_k,
            source,
            save,
        } => {
            let result = search(&*store, &query, top_k, source.as_deref()).await;
            print_search(&result);
            outcome.record(result.success);
            save_report(
                &writer,
                &save,
                Report::Search(&result),
                result.success,
                source.as_deref(),
            );
        }
        Command::Summarize {
            summary_type,
            query,
            source,
            n_chunks,
            max_tokens,
            temperature,
            provider,
            save,
        } => match open_provider(&config, provider.as_deref()) {
            Ok((kind, provider)) => {
                let summarizer = Summarizer::new(
                    &*store,
                    &*provider,
                    SummarizerSettings::from_config(&config, kind),
                );
                let defaults = config.summarize_request();
                let request = SummarizeRequest {
                    query: if query.is_empty() {
                        defaults.query.clone()
                    } else {
                        query.join(" ")
                    },
                    summary_type,
                    n_chunks: n_chunks.unwrap_or(defaults.n_chunks),
                    source_filter: source.clone(),
                    max_tokens: max_tokens.unwrap_or(defaults.max_tokens),
                    temperature: temperature.unwrap_or(defaults.temperature),
                };
                let result = summarizer.summarize(&request).await;
                print_summary(&result);
                outcome.record(result.success);
                save_report(
                    &writer,
                    &save,
                    Report::Summary(&result),
                    result.success,
                    source.as_deref(),
                );
            }
            Err(message) => {
                println!("configuration error: {message}");
                outcome.record(false);
            }
        },
        Command::Sections {
            source,
            provider,
            save,
        } => match open_provider(&config, provider.as_deref()) {
            Ok((kind, provider)) => {
                let summarizer = Summarizer::new(
                    &*store,
                    &*provider,
                    SummarizerSettings::from_config(&config, kind),
                );
                let sectioned = summarizer
                    .summarize_by_sections(source.as_deref(), &SectionQuery::defaults())
                    .await;
                print_sections(&sectioned);
                for section in &sectioned.sections {
                    outcome.record(section.result.success);
                }
                save_report(
                    &writer,
                    &save,
                    Report::Sections(&sectioned),
                    sectioned.success(),
                    source.as_deref(),
                );
            }
            Err(message) => {
                println!("configuration error: {message}");
                outcome.record(false);
            }
        },
        Command::Overview {
            provider,
            source,
            save,
        } => match open_provider(&config, provider.as_deref()) {
            Ok((kind, provider)) => {
                let summarizer = Summarizer::new(
                    &*store,
                    &*provider,
                    SummarizerSettings::from_config(&config, kind),
                );
                let overview = summarizer.overview(source.as_deref()).await;
                print_overview(&overview);
                outcome.record(overview.success);
                save_report(
                    &writer,
                    &save,
                    Report::Overview(&overview),
                    overview.success,
                    source.as_deref(),
                );
            }
            Err(message) => {
                println!("configuration error: {message}");
                outcome.record(false);
            }
        },
        Command::Delete { source } => match store.delete_by_source(&source).await {
            Ok(removed) => println!("removed {removed} chunks from {source}"),
            Err(error) => {
                println!("delete failed: {error}");
                outcome.record(false);
            }
        },
        Command::Stats => {
            match store.stats().await {
                Ok(stats) => println!(
                    "collection {}: {} chunks ({})",
                    stats.collection_name, stats.total_chunks, stats.persist_directory
                ),
                Err(error) => {
                    println!("stats failed: {error}");
                    outcome.record(false);
                }
            }
            match writer.stats() {
                Ok(stats) => println!(
                    "reports in {}: {} summaries, {} overviews, {} sections, {} searches",
                    stats.output_directory,
                    stats.summaries,
                    stats.overviews,
                    stats.sections,
                    stats.searches
                ),
                Err(error) => println!("report stats unavailable: {error}"),
            }
        }
        Command::Demo { provider } => {
            run_demo(&config, &*store, provider.as_deref(), &mut outcome).await;
        }
        Command::Config => {}
    }

    Ok(outcome.exit_code())
}

const DEMO_QUERIES: [&str; 3] = ["main topics", "key findings", "conclusions recommendations"];

async fn run_demo(
    config: &DigestConfig,
    store: &dyn ChunkStore,
    provider: Option<&str>,
    outcome: &mut Outcome,
) {
    match store.stats().await {
        Ok(stats) if stats.total_chunks == 0 => {
            println!("the collection is empty; run `pdf-digest scan <pdf>` first");
            outcome.record(false);
            return;
        }
        Ok(stats) => println!(
            "collection {}: {} chunks",
            stats.collection_name, stats.total_chunks
        ),
        Err(error) => {
            println!("stats failed: {error}");
            outcome.record(false);
            return;
        }
    }

    for query in DEMO_QUERIES {
        let result = search(store, query, 3, None).await;
        print_search(&result);
        outcome.record(result.success);
    }

    let (kind, provider) = match open_provider(config, provider) {
        Ok(opened) => opened,
        Err(message) => {
            println!("skipping summaries: {message}");
            outcome.record(false);
            return;
        }
    };
    let summarizer = Summarizer::new(
        store,
        &*provider,
        SummarizerSettings::from_config(config, kind),
    );
    for summary_type in SummaryType::ALL {
        let request = SummarizeRequest {
            summary_type: summary_type.as_str().to_string(),
            n_chunks: 5,
            ..config.summarize_request()
        };
        let result = summarizer.summarize(&request).await;
        print_summary(&result);
        outcome.record(result.success);
    }
}
