use crate::error::{ProviderError, StoreError};
use crate::models::{Chunk, CollectionStats, QueryFilter, StoreMatch};
use async_trait::async_trait;

/// A named, persistent collection of chunks searchable by similarity.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Writes every chunk of one document. Chunks whose id already exists are overwritten.
    async fn upsert_chunks(&self, source: &str, chunks: &[Chunk]) -> Result<usize, StoreError>;

    /// At most `top_k` matches, best first. An empty collection yields no matches.
    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<StoreMatch>, StoreError>;

    /// Removes every chunk whose `source` equals `source`; returns how many went away.
    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<CollectionStats, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One hosted LLM API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}
