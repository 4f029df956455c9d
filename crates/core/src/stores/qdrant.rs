use crate::embeddings::Embedder;
use crate::models::{Chunk, ChunkMetadata, CollectionStats, QueryFilter, StoreMatch};
use crate::traits::ChunkStore;
use crate::StoreError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

/// Chunk store backed by a Qdrant collection over its HTTP API.
pub struct QdrantStore<E: Embedder> {
    endpoint: Url,
    collection: String,
    client: Client,
    embedder: E,
    collection_ready: AtomicBool,
}

impl<E: Embedder> QdrantStore<E> {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        embedder: E,
    ) -> Result<Self, StoreError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client: Client::new(),
            embedder,
            collection_ready: AtomicBool::new(false),
        })
    }

    fn url(&self, suffix: &str) -> Result<Url, StoreError> {
        let path = format!("collections/{}{suffix}", self.collection);
        Ok(self.endpoint.join(&path)?)
    }

    /// Creates the collection with cosine distance unless it already exists.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self.client.get(self.url("")?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            let response = self
                .client
                .put(self.url("")?)
                .json(&json!({
                    "vectors": {
                        "size": self.embedder.dimensions(),
                        "distance": "Cosine",
                    }
                }))
                .send()
                .await?;
            check_status(response).await?;
            tracing::info!(collection = %self.collection, "created new collection");
        } else {
            check_status(response).await?;
        }

        self.collection_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let response = self.client.get(self.url("")?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }
}

fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn source_filter(source: &str) -> Value {
    json!({
        "must": [
            { "key": "source", "match": { "value": source } }
        ]
    })
}

fn build_payload(chunk: &Chunk) -> Result<Value, StoreError> {
    let mut payload = match serde_json::to_value(&chunk.metadata)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("chunk_id".to_string(), Value::String(chunk.id.clone()));
    payload.insert("text".to_string(), Value::String(chunk.text.clone()));
    Ok(Value::Object(payload))
}

fn parse_hit(hit: &Value) -> Result<StoreMatch, StoreError> {
    let mut payload = hit
        .pointer("/payload")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search hit without payload".to_string(),
        })?;

    let chunk_id = payload
        .remove("chunk_id")
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    let text = payload
        .remove("text")
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    let metadata: ChunkMetadata = serde_json::from_value(Value::Object(payload))?;
    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

    Ok(StoreMatch {
        chunk_id,
        text,
        metadata,
        score,
    })
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    })
}

#[async_trait]
impl<E: Embedder> ChunkStore for QdrantStore<E> {
    async fn upsert_chunks(&self, source: &str, chunks: &[Chunk]) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let points = chunks
            .iter()
            .map(|chunk| {
                let vector = self.embedder.embed(&chunk.text);
                if vector.len() != self.embedder.dimensions() {
                    return Err(StoreError::Dimension {
                        expected: self.embedder.dimensions(),
                        actual: vector.len(),
                    });
                }
                Ok(json!({
                    "id": point_id(&chunk.id),
                    "vector": vector,
                    "payload": build_payload(chunk)?,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(self.url("/points?wait=true")?)
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check_status(response).await?;

        tracing::debug!(source, points = chunks.len(), "upserted points");
        Ok(chunks.len())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<StoreMatch>, StoreError> {
        if top_k == 0 || !self.collection_exists().await? {
            return Ok(Vec::new());
        }

        let mut body = json!({
            "vector": self.embedder.embed(text),
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(source) = filter.and_then(|filter| filter.source.as_deref()) {
            body["filter"] = source_filter(source);
        }

        let response = self
            .client
            .post(self.url("/points/search")?)
            .json(&body)
            .send()
            .await?;
        let parsed: Value = check_status(response).await?.json().await?;

        parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .post(self.url("/points/count")?)
            .json(&json!({ "filter": source_filter(source), "exact": true }))
            .send()
            .await?;
        let counted: Value = check_status(response).await?.json().await?;
        let count = counted
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        if count == 0 {
            tracing::warn!(source, "no chunks found for source");
            return Ok(0);
        }

        let response = self
            .client
            .post(self.url("/points/delete?wait=true")?)
            .json(&json!({ "filter": source_filter(source) }))
            .send()
            .await?;
        check_status(response).await?;

        tracing::info!(source, removed = count, "deleted chunks");
        Ok(count)
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let response = self.client.get(self.url("")?).send().await?;
        let total_chunks = if response.status() == StatusCode::NOT_FOUND {
            0
        } else {
            let parsed: Value = check_status(response).await?.json().await?;
            parsed
                .pointer("/result/points_count")
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };

        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            total_chunks,
            persist_directory: self.endpoint.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use httpmock::{Method::GET, Method::POST, Method::PUT, MockServer};

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            id: crate::chunking::make_chunk_id("plan.pdf", index, text),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "plan.pdf".to_string(),
                source_path: "/docs/plan.pdf".to_string(),
                chunk_index: index,
                total_chunks: 2,
                file_size: 2_048,
                extra: Default::default(),
            },
        }
    }

    fn store(server: &MockServer) -> Result<QdrantStore<CharacterNgramEmbedder>, StoreError> {
        QdrantStore::new(
            &server.base_url(),
            "pdf_documents",
            CharacterNgramEmbedder::new(16),
        )
    }

    #[tokio::test]
    async fn upsert_creates_missing_collection_then_writes_points(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start_async().await;
        let missing = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/pdf_documents");
                then.status(404).json_body(json!({ "status": "not found" }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/pdf_documents")
                    .json_body(json!({ "vectors": { "size": 16, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/pdf_documents/points")
                    .query_param("wait", "true")
                    .body_contains("plan.pdf_0_");
                then.status(200)
                    .json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let store = store(&server)?;
        let written = store
            .upsert_chunks("plan.pdf", &[chunk(0, "first"), chunk(1, "second")])
            .await?;

        assert_eq!(written, 2);
        missing.assert_async().await;
        create.assert_async().await;
        upsert.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn query_sends_source_filter_and_parses_payloads(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/pdf_documents");
                then.status(200)
                    .json_body(json!({ "result": { "points_count": 2 } }));
            })
            .await;
        let search = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/pdf_documents/points/search")
                    .body_contains("\"filter\"")
                    .body_contains("plan.pdf");
                then.status(200).json_body(json!({
                    "result": [
                        {
                            "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26",
                            "score": 0.91,
                            "payload": {
                                "chunk_id": "plan.pdf_1_abcdef12",
                                "text": "budget details",
                                "source": "plan.pdf",
                                "source_path": "/docs/plan.pdf",
                                "chunk_index": 1,
                                "total_chunks": 2,
                                "file_size": 2048,
                                "department": "finance"
                            }
                        }
                    ]
                }));
            })
            .await;

        let store = store(&server)?;
        let matches = store
            .query("budget", 5, Some(&QueryFilter::source("plan.pdf")))
            .await?;

        search.assert_async().await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_id, "plan.pdf_1_abcdef12");
        assert_eq!(matches[0].text, "budget details");
        assert_eq!(matches[0].metadata.chunk_index, 1);
        assert_eq!(
            matches[0].metadata.extra.get("department").map(ToString::to_string),
            Some("finance".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn query_on_missing_collection_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/pdf_documents");
                then.status(404);
            })
            .await;

        let store = store(&server)?;
        assert!(store.query("anything", 5, None).await?.is_empty());
        assert_eq!(store.stats().await?.total_chunks, 0);
        Ok(())
    }

    #[tokio::test]
    async fn delete_counts_before_removing() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/pdf_documents");
                then.status(200)
                    .json_body(json!({ "result": { "points_count": 3 } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/pdf_documents/points/count")
                    .body_contains("plan.pdf");
                then.status(200).json_body(json!({ "result": { "count": 3 } }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/pdf_documents/points/delete")
                    .body_contains("plan.pdf");
                then.status(200)
                    .json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let store = store(&server)?;
        assert_eq!(store.delete_by_source("plan.pdf").await?, 3);
        delete.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn backend_errors_surface_with_status() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/pdf_documents");
                then.status(500).body("disk full");
            })
            .await;

        let store = store(&server)?;
        let result = store.upsert_chunks("plan.pdf", &[chunk(0, "x")]).await;
        assert!(matches!(result, Err(StoreError::BackendResponse { .. })));
        Ok(())
    }
}
