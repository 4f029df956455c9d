//! Runtime settings resolved once at process start.
//!
//! Values come from the environment (after an optional `.env` file) through
//! [`DigestConfig::load`], or from any key lookup through
//! [`DigestConfig::from_lookup`]. A missing API key is not an error here; it
//! only fails the operations that need a provider.

use crate::chunking::ChunkingConfig;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::error::ConfigError;
use crate::models::{SummarizeRequest, SummaryType, DEFAULT_SUMMARY_QUERY};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Anthropic => "ANTHROPIC",
        }
    }

    pub fn api_key_variable(&self) -> String {
        format!("{}_API_KEY", self.env_prefix())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Qdrant,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local),
            "qdrant" => Ok(StoreBackend::Qdrant),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub model_overrides: HashMap<SummaryType, String>,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub collection_name: String,
    pub persist_directory: PathBuf,
    pub qdrant_url: String,
    pub embedding_dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub provider: ProviderKind,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n_chunks: usize,
    pub context_window_tokens: u32,
    pub timeout_secs: u64,
    pub chunking: ChunkingConfig,
    pub store: StoreSettings,
    pub output_directory: PathBuf,
}

impl DigestConfig {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let provider = match get("DEFAULT_LLM_PROVIDER") {
            Some(value) => value.parse()?,
            None => ProviderKind::OpenAi,
        };

        let openai = provider_settings(
            &get,
            ProviderKind::OpenAi,
            "https://api.openai.com/v1",
            "gpt-3.5-turbo",
        );
        let anthropic = provider_settings(
            &get,
            ProviderKind::Anthropic,
            "https://api.anthropic.com/v1",
            "claude-3-sonnet-20240229",
        );

        let chunking = ChunkingConfig {
            chunk_size: parse_or(&get, "PDF_CHUNK_SIZE", 1_000)?,
            chunk_overlap: parse_or(&get, "PDF_CHUNK_OVERLAP", 200)?,
        };
        chunking
            .validate()
            .map_err(|error| ConfigError::InvalidValue {
                key: "PDF_CHUNK_OVERLAP".to_string(),
                value: error.to_string(),
            })?;

        let store = StoreSettings {
            backend: match get("CHUNK_STORE_BACKEND") {
                Some(value) => value.parse()?,
                None => StoreBackend::Local,
            },
            collection_name: get("CHROMA_COLLECTION_NAME")
                .unwrap_or_else(|| "pdf_documents".to_string()),
            persist_directory: PathBuf::from(
                get("CHROMA_PERSIST_DIRECTORY").unwrap_or_else(|| "./chroma_db".to_string()),
            ),
            qdrant_url: get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6333".to_string()),
            embedding_dimensions: parse_or(
                &get,
                "EMBEDDING_DIMENSIONS",
                DEFAULT_EMBEDDING_DIMENSIONS,
            )?,
        };

        let temperature: f32 = parse_or(&get, "DEFAULT_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_TEMPERATURE".to_string(),
                value: temperature.to_string(),
            });
        }

        Ok(Self {
            provider,
            openai,
            anthropic,
            max_tokens: parse_or(&get, "DEFAULT_MAX_TOKENS", 2_000)?,
            temperature,
            n_chunks: parse_or(&get, "DEFAULT_N_CHUNKS", 10)?,
            context_window_tokens: parse_or(&get, "LLM_CONTEXT_WINDOW_TOKENS", 16_000)?,
            timeout_secs: parse_or(&get, "LLM_TIMEOUT_SECS", 60)?,
            chunking,
            store,
            output_directory: PathBuf::from(
                get("OUTPUT_DIRECTORY").unwrap_or_else(|| "./output".to_string()),
            ),
        })
    }

    pub fn provider_settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    pub fn api_key(&self, kind: ProviderKind) -> Result<&str, ConfigError> {
        self.provider_settings(kind)
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey(kind.api_key_variable()))
    }

    pub fn available_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.provider_settings(*kind).api_key.is_some())
            .collect()
    }

    /// Summarization defaults taken from configuration.
    pub fn summarize_request(&self) -> SummarizeRequest {
        SummarizeRequest {
            query: DEFAULT_SUMMARY_QUERY.to_string(),
            summary_type: SummaryType::Comprehensive.as_str().to_string(),
            n_chunks: self.n_chunks,
            source_filter: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            api_keys: ProviderKind::ALL
                .into_iter()
                .map(|kind| (kind, self.provider_settings(kind).api_key.is_some()))
                .collect(),
            default_provider: self.provider,
            default_models: ProviderKind::ALL
                .into_iter()
                .map(|kind| (kind, self.provider_settings(kind).default_model.clone()))
                .collect(),
            backend: self.store.backend,
            collection_name: self.store.collection_name.clone(),
            persist_directory: self.store.persist_directory.display().to_string(),
            chunking: self.chunking,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            n_chunks: self.n_chunks,
            output_directory: self.output_directory.display().to_string(),
        }
    }
}

fn provider_settings<G>(
    get: &G,
    kind: ProviderKind,
    base_url: &str,
    model: &str,
) -> ProviderSettings
where
    G: Fn(&str) -> Option<String>,
{
    let prefix = kind.env_prefix();
    let default_model = get(&format!("DEFAULT_MODEL_{prefix}")).unwrap_or_else(|| model.to_string());

    let mut model_overrides = HashMap::new();
    for summary_type in SummaryType::ALL {
        let key = format!("{}_MODEL_{prefix}", summary_type.as_str().to_uppercase());
        if let Some(model) = get(&key) {
            model_overrides.insert(summary_type, model);
        }
    }

    ProviderSettings {
        api_key: get(&kind.api_key_variable()),
        base_url: get(&format!("{prefix}_BASE_URL")).unwrap_or_else(|| base_url.to_string()),
        default_model,
        model_overrides,
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub api_keys: Vec<(ProviderKind, bool)>,
    pub default_provider: ProviderKind,
    pub default_models: Vec<(ProviderKind, String)>,
    pub backend: StoreBackend,
    pub collection_name: String,
    pub persist_directory: String,
    #[serde(skip)]
    pub chunking: ChunkingConfig,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n_chunks: usize,
    pub output_directory: String,
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "API keys:")?;
        for (kind, present) in &self.api_keys {
            let mark = if *present { "set" } else { "missing" };
            writeln!(f, "  {:<18} {mark}", kind.api_key_variable())?;
        }
        let available = self
            .api_keys
            .iter()
            .filter(|(_, present)| *present)
            .map(|(kind, _)| kind.as_str())
            .collect::<Vec<_>>();
        writeln!(
            f,
            "Available providers: {}",
            if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            }
        )?;
        writeln!(f, "Default provider: {}", self.default_provider)?;
        for (kind, model) in &self.default_models {
            writeln!(f, "  {kind} model: {model}")?;
        }
        writeln!(f, "Chunk store: {:?}", self.backend)?;
        writeln!(f, "  collection: {}", self.collection_name)?;
        writeln!(f, "  directory: {}", self.persist_directory)?;
        writeln!(
            f,
            "Chunking: size={} overlap={}",
            self.chunking.chunk_size, self.chunking.chunk_overlap
        )?;
        writeln!(
            f,
            "Summaries: max_tokens={} temperature={} chunks={}",
            self.max_tokens, self.temperature, self.n_chunks
        )?;
        write!(f, "Output directory: {}", self.output_directory)
    }
}
