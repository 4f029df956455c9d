pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod output;
pub mod prompts;
pub mod providers;
pub mod stores;
pub mod summarizer;
pub mod traits;

pub use chunking::{make_chunk_id, merge_overlapping, split_text, ChunkingConfig};
pub use config::{ConfigStatus, DigestConfig, ProviderKind, StoreBackend};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    ConfigError, ErrorKind, IngestError, OutputError, ProviderError, StoreError,
};
pub use extractor::{extract_page_texts, join_pages, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{build_chunks, discover_files, IngestionPipeline};
pub use models::{
    Chunk, ChunkMetadata, CollectionStats, ExtraMetadata, IngestOptions, IngestOutcome,
    MetadataValue, OverviewResult, QueryFilter, SearchOutcome, SectionQuery, SectionSummary,
    SectionedSummary, StoreMatch, SummarizeRequest, SummaryResult, SummaryType,
};
pub use output::{sanitize_filename, OutputStats, Report, ReportCategory, ReportWriter};
pub use providers::{build_provider, AnthropicProvider, OpenAiProvider};
pub use stores::{LocalStore, QdrantStore};
pub use summarizer::{search, Summarizer, SummarizerSettings};
pub use traits::{ChunkStore, GenerationRequest, LlmProvider};
