use crate::error::{ErrorKind, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metadata keys written by the ingestion pipeline that callers may not override.
pub const RESERVED_METADATA_KEYS: [&str; 5] = [
    "source",
    "chunk_index",
    "total_chunks",
    "source_path",
    "file_size",
];

/// Scalar value allowed in caller-supplied chunk metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(value) => write!(f, "{value}"),
            MetadataValue::Integer(value) => write!(f, "{value}"),
            MetadataValue::Float(value) => write!(f, "{value}"),
            MetadataValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl MetadataValue {
    /// Parses a CLI-style value, preferring bool, then integer, then finite
    /// float. `nan` and `inf` stay text.
    pub fn parse_loose(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<bool>() {
            return MetadataValue::Bool(value);
        }
        if let Ok(value) = raw.parse::<i64>() {
            return MetadataValue::Integer(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => MetadataValue::Float(value),
            _ => MetadataValue::Text(raw.to_string()),
        }
    }

    /// False for floats JSON would write as `null`.
    pub fn is_storable(&self) -> bool {
        match self {
            MetadataValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

pub type ExtraMetadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub source: String,
    pub source_path: String,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub file_size: u64,
    #[serde(flatten)]
    pub extra: ExtraMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct QueryFilter {
    pub source: Option<String>,
}

impl QueryFilter {
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }

    pub fn from_source(source: Option<&str>) -> Option<Self> {
        source.map(Self::source)
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.source
            .as_deref()
            .map_or(true, |source| metadata.source == source)
    }
}

/// One similarity hit. Scores follow the engine's own convention: higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMatch {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection_name: String,
    pub total_chunks: u64,
    pub persist_directory: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub extra_metadata: ExtraMetadata,
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub source: String,
    pub chunks_added: usize,
    pub total_characters: usize,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl IngestOutcome {
    pub fn failed(source: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            source: source.into(),
            chunks_added: 0,
            total_characters: 0,
            message: message.into(),
            error_kind: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    Comprehensive,
    Executive,
    KeyPoints,
}

impl SummaryType {
    pub const ALL: [SummaryType; 3] = [
        SummaryType::Comprehensive,
        SummaryType::Executive,
        SummaryType::KeyPoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Comprehensive => "comprehensive",
            SummaryType::Executive => "executive",
            SummaryType::KeyPoints => "key_points",
        }
    }

    /// Title used for saved reports.
    pub fn heading(&self) -> &'static str {
        match self {
            SummaryType::Comprehensive => "Comprehensive Summary",
            SummaryType::Executive => "Executive Summary",
            SummaryType::KeyPoints => "Key Points",
        }
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSummaryType(pub String);

impl fmt::Display for UnknownSummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported summary type '{}' (expected comprehensive, executive or key_points)",
            self.0
        )
    }
}

impl std::error::Error for UnknownSummaryType {}

impl FromStr for SummaryType {
    type Err = UnknownSummaryType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "comprehensive" => Ok(SummaryType::Comprehensive),
            "executive" => Ok(SummaryType::Executive),
            "key_points" | "key-points" => Ok(SummaryType::KeyPoints),
            _ => Err(UnknownSummaryType(value.to_string())),
        }
    }
}

/// Options for a single summarization call.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeRequest {
    pub query: String,
    pub summary_type: String,
    pub n_chunks: usize,
    pub source_filter: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

pub const DEFAULT_SUMMARY_QUERY: &str = "summary overview main topics";

impl Default for SummarizeRequest {
    fn default() -> Self {
        Self {
            query: DEFAULT_SUMMARY_QUERY.to_string(),
            summary_type: SummaryType::Comprehensive.as_str().to_string(),
            n_chunks: 10,
            source_filter: None,
            max_tokens: 2_000,
            temperature: 0.7,
        }
    }
}

impl SummarizeRequest {
    /// Rejects values no provider would accept.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query is empty".to_string());
        }
        if self.n_chunks == 0 {
            return Err("n_chunks must be at least 1".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub success: bool,
    pub query: String,
    pub summary_type: String,
    pub summary: String,
    pub chunk_ids: Vec<String>,
    pub chunks_used: usize,
    pub total_chunks_available: Option<u64>,
    pub source_filter: Option<String>,
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub generated_at: String,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionQuery {
    pub name: String,
    pub query: String,
}

impl SectionQuery {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }

    pub fn defaults() -> Vec<SectionQuery> {
        vec![
            SectionQuery::new("introduction", "introduction overview background context"),
            SectionQuery::new("main_content", "main topics findings analysis methodology"),
            SectionQuery::new("conclusions", "conclusion recommendations next steps summary"),
            SectionQuery::new("key_data", "data statistics numbers metrics results"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub name: String,
    pub query: String,
    pub result: SummaryResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionedSummary {
    pub source_filter: Option<String>,
    pub sections: Vec<SectionSummary>,
}

impl SectionedSummary {
    pub fn get(&self, name: &str) -> Option<&SummaryResult> {
        self.sections
            .iter()
            .find(|section| section.name == name)
            .map(|section| &section.result)
    }

    pub fn succeeded(&self) -> usize {
        self.sections
            .iter()
            .filter(|section| section.result.success)
            .count()
    }

    /// True when at least one section produced a summary.
    pub fn success(&self) -> bool {
        self.succeeded() > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewResult {
    pub success: bool,
    pub summary: SummaryResult,
    pub stats: Option<CollectionStats>,
    pub source_files: Vec<String>,
    pub chunk_length_range: Option<(usize, usize)>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub query: String,
    pub source_filter: Option<String>,
    pub matches: Vec<StoreMatch>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl SearchOutcome {
    pub fn from_store(
        query: &str,
        source_filter: Option<&str>,
        result: Result<Vec<StoreMatch>, StoreError>,
    ) -> Self {
        match result {
            Ok(matches) => Self {
                success: true,
                query: query.to_string(),
                source_filter: source_filter.map(str::to_string),
                message: Some(format!("{} matching chunks", matches.len())),
                matches,
                error_kind: None,
            },
            Err(error) => Self {
                success: false,
                query: query.to_string(),
                source_filter: source_filter.map(str::to_string),
                matches: Vec::new(),
                message: Some(error.to_string()),
                error_kind: Some(ErrorKind::StoreQuery),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_type_parses_known_names_only() {
        assert_eq!("executive".parse::<SummaryType>(), Ok(SummaryType::Executive));
        assert_eq!(" Key_Points ".parse::<SummaryType>(), Ok(SummaryType::KeyPoints));
        assert!("bogus".parse::<SummaryType>().is_err());
    }

    #[test]
    fn chunk_metadata_flattens_extra_keys() -> Result<(), serde_json::Error> {
        let mut extra = ExtraMetadata::new();
        extra.insert("author".to_string(), MetadataValue::from("Ada"));
        extra.insert("year".to_string(), MetadataValue::from(1843));
        let metadata = ChunkMetadata {
            source: "notes.pdf".to_string(),
            source_path: "/tmp/notes.pdf".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            file_size: 10,
            extra,
        };

        let value = serde_json::to_value(&metadata)?;
        assert_eq!(value["author"], "Ada");
        assert_eq!(value["year"], 1843);

        let decoded: ChunkMetadata = serde_json::from_value(value)?;
        assert_eq!(decoded, metadata);
        Ok(())
    }

    #[test]
    fn loose_metadata_values_pick_the_narrowest_type() {
        assert_eq!(MetadataValue::parse_loose("true"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::parse_loose("42"), MetadataValue::Integer(42));
        assert_eq!(MetadataValue::parse_loose("0.5"), MetadataValue::Float(0.5));
        assert_eq!(
            MetadataValue::parse_loose("draft"),
            MetadataValue::Text("draft".to_string())
        );
    }

    #[test]
    fn non_finite_numbers_stay_text() {
        for raw in ["nan", "NaN", "inf", "-infinity"] {
            let value = MetadataValue::parse_loose(raw);
            assert_eq!(value, MetadataValue::Text(raw.to_string()));
            assert!(value.is_storable());
        }
        assert!(!MetadataValue::Float(f64::NAN).is_storable());
    }

    #[test]
    fn request_validation_rejects_zero_chunks() {
        let request = SummarizeRequest {
            n_chunks: 0,
            ..SummarizeRequest::default()
        };
        assert!(request.validate().is_err());
        assert!(SummarizeRequest::default().validate().is_ok());
    }
}
