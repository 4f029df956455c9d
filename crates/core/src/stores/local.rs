//! Disk-persisted collection kept as one JSON file per collection.
//!
//! The file is read lazily on first access and rewritten through a temp file
//! and rename after every mutation. The cached copy only changes once that
//! write has succeeded. Similarity is cosine over embeddings from
//! the configured [`Embedder`], scanned exhaustively.

use crate::embeddings::{cosine_similarity, Embedder};
use crate::models::{Chunk, CollectionStats, QueryFilter, StoreMatch};
use crate::traits::ChunkStore;
use crate::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    dimensions: usize,
    chunks: Vec<StoredChunk>,
}

pub struct LocalStore<E: Embedder> {
    collection: String,
    persist_directory: PathBuf,
    embedder: E,
    state: Mutex<Option<CollectionFile>>,
}

impl<E: Embedder> LocalStore<E> {
    pub fn new(
        persist_directory: impl Into<PathBuf>,
        collection: impl Into<String>,
        embedder: E,
    ) -> Self {
        Self {
            collection: collection.into(),
            persist_directory: persist_directory.into(),
            embedder,
            state: Mutex::new(None),
        }
    }

    fn collection_path(&self) -> PathBuf {
        self.persist_directory
            .join(format!("{}.json", self.collection))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<CollectionFile>>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Request("collection lock poisoned".to_string()))
    }

    /// Loads the collection file on first use, or starts an empty collection.
    fn loaded<'a>(
        &self,
        guard: &'a mut MutexGuard<'_, Option<CollectionFile>>,
    ) -> Result<&'a mut CollectionFile, StoreError> {
        if guard.is_none() {
            let path = self.collection_path();
            let collection = if path.exists() {
                let raw = fs::read(&path)?;
                let parsed: CollectionFile = serde_json::from_slice(&raw)?;
                tracing::debug!(
                    collection = %self.collection,
                    chunks = parsed.chunks.len(),
                    "loaded collection"
                );
                parsed
            } else {
                tracing::info!(collection = %self.collection, "created new collection");
                CollectionFile {
                    name: self.collection.clone(),
                    dimensions: self.embedder.dimensions(),
                    chunks: Vec::new(),
                }
            };

            if collection.dimensions != self.embedder.dimensions() {
                return Err(StoreError::Dimension {
                    expected: collection.dimensions,
                    actual: self.embedder.dimensions(),
                });
            }
            **guard = Some(collection);
        }

        match &mut **guard {
            Some(collection) => Ok(collection),
            None => Err(StoreError::Request("collection failed to load".to_string())),
        }
    }

    fn persist(&self, collection: &CollectionFile) -> Result<(), StoreError> {
        fs::create_dir_all(&self.persist_directory)?;
        let path = self.collection_path();
        let temp = temp_path(&path);
        fs::write(&temp, serde_json::to_vec(collection)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl<E: Embedder> ChunkStore for LocalStore<E> {
    async fn upsert_chunks(&self, source: &str, chunks: &[Chunk]) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut guard = self.lock()?;
        let collection = self.loaded(&mut guard)?;
        let mut updated = collection.clone();

        let mut added = 0;
        for chunk in chunks {
            let embedding = self.embedder.embed(&chunk.text);
            if embedding.len() != updated.dimensions {
                return Err(StoreError::Dimension {
                    expected: updated.dimensions,
                    actual: embedding.len(),
                });
            }

            let stored = StoredChunk {
                chunk: chunk.clone(),
                embedding,
            };
            match updated
                .chunks
                .iter()
                .position(|existing| existing.chunk.id == chunk.id)
            {
                Some(position) => updated.chunks[position] = stored,
                None => {
                    updated.chunks.push(stored);
                    added += 1;
                }
            }
        }

        self.persist(&updated)?;
        *collection = updated;
        tracing::debug!(
            source,
            written = chunks.len(),
            new = added,
            "upserted chunks"
        );
        Ok(chunks.len())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<StoreMatch>, StoreError> {
        let mut guard = self.lock()?;
        let collection = self.loaded(&mut guard)?;
        if top_k == 0 || collection.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text);
        let mut scored = collection
            .chunks
            .iter()
            .filter(|stored| filter.map_or(true, |filter| filter.matches(&stored.chunk.metadata)))
            .map(|stored| {
                let score = cosine_similarity(&query_vector, &stored.embedding) as f64;
                (score, stored)
            })
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, stored)| StoreMatch {
                chunk_id: stored.chunk.id.clone(),
                text: stored.chunk.text.clone(),
                metadata: stored.chunk.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError> {
        let mut guard = self.lock()?;
        let collection = self.loaded(&mut guard)?;

        let kept = collection
            .chunks
            .iter()
            .filter(|stored| stored.chunk.metadata.source != source)
            .cloned()
            .collect::<Vec<_>>();
        let removed = collection.chunks.len() - kept.len();

        if removed > 0 {
            let updated = CollectionFile {
                name: collection.name.clone(),
                dimensions: collection.dimensions,
                chunks: kept,
            };
            self.persist(&updated)?;
            *collection = updated;
            tracing::info!(source, removed, "deleted chunks");
        } else {
            tracing::warn!(source, "no chunks found for source");
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let mut guard = self.lock()?;
        let collection = self.loaded(&mut guard)?;
        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            total_chunks: collection.chunks.len() as u64,
            persist_directory: self.persist_directory.display().to_string(),
        })
    }
}
