use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classes reported inside structured results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentNotFound,
    NoExtractableText,
    StoreWrite,
    StoreQuery,
    NoContext,
    UnknownSummaryType,
    Provider,
    ProviderTimeout,
    OutputWrite,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::DocumentNotFound => "document not found",
            ErrorKind::NoExtractableText => "no extractable text",
            ErrorKind::StoreWrite => "chunk store write failed",
            ErrorKind::StoreQuery => "chunk store query failed",
            ErrorKind::NoContext => "no context",
            ErrorKind::UnknownSummaryType => "unknown summary type",
            ErrorKind::Provider => "llm provider error",
            ErrorKind::ProviderTimeout => "llm provider timeout",
            ErrorKind::OutputWrite => "output write failed",
            ErrorKind::Configuration => "configuration error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Io(error) if error.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::DocumentNotFound
            }
            IngestError::MissingFileName(_) => ErrorKind::DocumentNotFound,
            IngestError::InvalidChunkConfig(_) | IngestError::Pattern(_) => {
                ErrorKind::Configuration
            }
            _ => ErrorKind::NoExtractableText,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} did not answer within {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    #[error("{provider} rejected the credentials: {details}")]
    Auth { provider: String, details: String },

    #[error("{provider} quota or rate limit exceeded: {details}")]
    Quota { provider: String, details: String },

    #[error("{provider} returned {status}: {details}")]
    Status {
        provider: String,
        status: u16,
        details: String,
    },

    #[error("failed to reach {provider}: {details}")]
    Transport { provider: String, details: String },

    #[error("malformed response from {provider}: {details}")]
    InvalidResponse { provider: String, details: String },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout { .. } => ErrorKind::ProviderTimeout,
            _ => ErrorKind::Provider,
        }
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OutputError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::OutputWrite
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set; export it or add it to .env")]
    MissingKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("unsupported provider: {0}")]
    UnknownProvider(String),

    #[error("unsupported chunk store backend: {0}")]
    UnknownBackend(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_errors_map_to_result_kinds() {
        let error = IngestError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(error.kind(), ErrorKind::DocumentNotFound);

        let error = IngestError::PdfParse("bad xref".to_string());
        assert_eq!(error.kind(), ErrorKind::NoExtractableText);

        let error = IngestError::InvalidChunkConfig("overlap too large".to_string());
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn only_timeouts_map_to_provider_timeout() {
        let timeout = ProviderError::Timeout {
            provider: "openai".to_string(),
            seconds: 5,
        };
        let quota = ProviderError::Quota {
            provider: "openai".to_string(),
            details: "slow down".to_string(),
        };
        assert_eq!(timeout.kind(), ErrorKind::ProviderTimeout);
        assert_eq!(quota.kind(), ErrorKind::Provider);
    }

    #[test]
    fn error_kind_serializes_snake_case() -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(&ErrorKind::UnknownSummaryType)?;
        assert_eq!(encoded, "\"unknown_summary_type\"");
        Ok(())
    }
}
