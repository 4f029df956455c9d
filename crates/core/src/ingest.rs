use crate::chunking::{make_chunk_id, split_text, ChunkingConfig};
use crate::error::ErrorKind;
use crate::extractor::{join_pages, LopdfExtractor, PdfExtractor};
use crate::models::{
    Chunk, ChunkMetadata, ExtraMetadata, IngestOptions, IngestOutcome, RESERVED_METADATA_KEYS,
};
use crate::traits::ChunkStore;
use crate::IngestError;
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists files under `folder` whose path relative to it matches `pattern`.
///
/// `*` does not cross directory separators, so `*.pdf` only sees the top
/// level and `**/*.pdf` descends. Matching ignores case.
pub fn discover_files(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, IngestError> {
    let matcher = compile_pattern(pattern)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_match = entry
            .path()
            .strip_prefix(folder)
            .map(|relative| matcher.is_match(relative))
            .unwrap_or(false);

        if is_match {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, IngestError> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .case_insensitive(true)
        .build()?;
    Ok(glob.compile_matcher())
}

/// Everything ingestion knows about one file before chunking.
struct DocumentInfo {
    source: String,
    source_path: String,
    file_size: u64,
}

fn describe_document(path: &Path) -> Result<DocumentInfo, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let file_metadata = fs::metadata(path)?;
    if !file_metadata.is_file() {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a file: {}", path.display()),
        )));
    }
    // Open once so unreadable files fail here rather than inside the parser.
    fs::File::open(path)?;

    Ok(DocumentInfo {
        source,
        source_path: path.to_string_lossy().to_string(),
        file_size: file_metadata.len(),
    })
}

/// Caller metadata minus the keys ingestion owns and values JSON cannot hold.
fn caller_metadata(source: &str, extra: &ExtraMetadata) -> ExtraMetadata {
    extra
        .iter()
        .filter(|(key, value)| {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                tracing::warn!(source, key = %key, "ignoring reserved metadata key");
                return false;
            }
            if !value.is_storable() {
                tracing::warn!(source, key = %key, "ignoring non-finite metadata value");
                return false;
            }
            true
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Splits extracted text and stamps every chunk with document metadata.
pub fn build_chunks(
    source: &str,
    source_path: &str,
    file_size: u64,
    text: &str,
    config: ChunkingConfig,
    extra: &ExtraMetadata,
) -> Result<Vec<Chunk>, IngestError> {
    let pieces = split_text(text, config)?
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .collect::<Vec<_>>();
    let total_chunks = pieces.len() as u64;
    let extra = caller_metadata(source, extra);

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk_index = index as u64;
            Chunk {
                id: make_chunk_id(source, chunk_index, &text),
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    source_path: source_path.to_string(),
                    chunk_index,
                    total_chunks,
                    file_size,
                    extra: extra.clone(),
                },
                text,
            }
        })
        .collect())
}

/// Write path: PDF file to stored chunks.
pub struct IngestionPipeline<'a, S: ChunkStore + ?Sized, X: PdfExtractor = LopdfExtractor> {
    store: &'a S,
    extractor: X,
    chunking: ChunkingConfig,
}

impl<'a, S: ChunkStore + ?Sized> IngestionPipeline<'a, S, LopdfExtractor> {
    pub fn new(store: &'a S, chunking: ChunkingConfig) -> Self {
        Self::with_extractor(store, LopdfExtractor, chunking)
    }
}

impl<'a, S: ChunkStore + ?Sized, X: PdfExtractor> IngestionPipeline<'a, S, X> {
    pub fn with_extractor(store: &'a S, extractor: X, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            extractor,
            chunking,
        }
    }

    /// Ingests one document. Failures come back as an unsuccessful outcome.
    pub async fn ingest(&self, path: &Path, options: &IngestOptions) -> IngestOutcome {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let document = match describe_document(path) {
            Ok(document) => document,
            Err(error) => {
                tracing::error!(path = %path.display(), error = %error, "document not readable");
                return IngestOutcome::failed(
                    display_name,
                    ErrorKind::DocumentNotFound,
                    format!("PDF file not found or unreadable: {} ({error})", path.display()),
                );
            }
        };

        tracing::info!(path = %path.display(), "scanning pdf");
        let text = match self.extractor.extract_pages(path) {
            Ok(pages) => join_pages(&pages),
            Err(error) => {
                tracing::error!(path = %path.display(), error = %error, "text extraction failed");
                return IngestOutcome::failed(
                    document.source,
                    error.kind(),
                    format!("Could not extract text: {error}"),
                );
            }
        };

        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "no text content found");
            return IngestOutcome::failed(
                document.source,
                ErrorKind::NoExtractableText,
                "No text content found in PDF",
            );
        }
        let total_characters = text.chars().count();
        tracing::info!(
            source = %document.source,
            characters = total_characters,
            "extracted text"
        );

        let chunks = match build_chunks(
            &document.source,
            &document.source_path,
            document.file_size,
            &text,
            self.chunking,
            &options.extra_metadata,
        ) {
            Ok(chunks) => chunks,
            Err(error) => {
                tracing::error!(source = %document.source, error = %error, "chunking failed");
                return IngestOutcome::failed(document.source, error.kind(), error.to_string());
            }
        };

        if options.replace_existing {
            if let Err(error) = self.store.delete_by_source(&document.source).await {
                return IngestOutcome::failed(
                    document.source,
                    ErrorKind::StoreWrite,
                    format!("Could not remove previous chunks: {error}"),
                );
            }
        }

        match self.store.upsert_chunks(&document.source, &chunks).await {
            Ok(added) => {
                tracing::info!(source = %document.source, chunks = added, "stored chunks");
                IngestOutcome {
                    success: true,
                    message: format!("Successfully processed {}", document.source),
                    source: document.source,
                    chunks_added: added,
                    total_characters,
                    error_kind: None,
                }
            }
            Err(error) => {
                tracing::error!(source = %document.source, error = %error, "chunk store rejected batch");
                IngestOutcome::failed(
                    document.source,
                    ErrorKind::StoreWrite,
                    format!("Error adding document to chunk store: {error}"),
                )
            }
        }
    }

    /// One outcome per matched file, in path order; never stops early.
    pub async fn ingest_directory(
        &self,
        folder: &Path,
        pattern: &str,
        options: &IngestOptions,
    ) -> Vec<IngestOutcome> {
        if !folder.is_dir() {
            return vec![IngestOutcome::failed(
                folder.display().to_string(),
                ErrorKind::DocumentNotFound,
                format!("Directory not found: {}", folder.display()),
            )];
        }

        let files = match discover_files(folder, pattern) {
            Ok(files) => files,
            Err(error) => {
                return vec![IngestOutcome::failed(
                    folder.display().to_string(),
                    error.kind(),
                    error.to_string(),
                )]
            }
        };

        if files.is_empty() {
            tracing::warn!(folder = %folder.display(), pattern, "no files matched");
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            outcomes.push(self.ingest(&path, options).await);
        }
        outcomes
    }
}
