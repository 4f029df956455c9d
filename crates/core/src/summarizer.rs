//! Retrieval-augmented summarization over a [`ChunkStore`].
//!
//! Every operation returns a structured result. Store, provider and
//! argument failures come back with `success = false` and an [`ErrorKind`]
//! instead of an `Err`, so batch callers keep going.

use crate::config::{DigestConfig, ProviderKind};
use crate::error::ErrorKind;
use crate::models::{
    OverviewResult, QueryFilter, SearchOutcome, SectionQuery, SectionSummary, SectionedSummary,
    StoreMatch, SummarizeRequest, SummaryResult, SummaryType,
};
use crate::prompts::{assemble_context, context_budget, render_prompt};
use crate::traits::{ChunkStore, GenerationRequest, LlmProvider};
use std::collections::{BTreeSet, HashMap};

pub const OVERVIEW_QUERY: &str = "document overview main purpose scope";

const SECTION_CHUNKS: usize = 5;
const SECTION_MAX_TOKENS: u32 = 1_000;

/// Model choice and request defaults for one provider.
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub default_model: String,
    pub model_overrides: HashMap<SummaryType, String>,
    pub context_window_tokens: u32,
    pub defaults: SummarizeRequest,
}

impl SummarizerSettings {
    pub fn from_config(config: &DigestConfig, kind: ProviderKind) -> Self {
        let provider = config.provider_settings(kind);
        Self {
            default_model: provider.default_model.clone(),
            model_overrides: provider.model_overrides.clone(),
            context_window_tokens: config.context_window_tokens,
            defaults: config.summarize_request(),
        }
    }

    pub fn model_for(&self, summary_type: SummaryType) -> &str {
        self.model_overrides
            .get(&summary_type)
            .unwrap_or(&self.default_model)
    }
}

pub struct Summarizer<'a, S: ChunkStore + ?Sized, P: LlmProvider + ?Sized> {
    store: &'a S,
    provider: &'a P,
    settings: SummarizerSettings,
}

impl<'a, S: ChunkStore + ?Sized, P: LlmProvider + ?Sized> Summarizer<'a, S, P> {
    pub fn new(store: &'a S, provider: &'a P, settings: SummarizerSettings) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    fn blank_result(&self, request: &SummarizeRequest, model: &str) -> SummaryResult {
        SummaryResult {
            success: false,
            query: request.query.clone(),
            summary_type: request.summary_type.clone(),
            summary: String::new(),
            chunk_ids: Vec::new(),
            chunks_used: 0,
            total_chunks_available: None,
            source_filter: request.source_filter.clone(),
            provider: self.provider.name().to_string(),
            model: model.to_string(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            generated_at: chrono::Local::now().to_rfc3339(),
            message: None,
            error_kind: None,
        }
    }

    fn failed(
        &self,
        request: &SummarizeRequest,
        model: &str,
        kind: ErrorKind,
        message: String,
    ) -> SummaryResult {
        tracing::warn!(kind = %kind, message = %message, "summarization failed");
        SummaryResult {
            message: Some(message),
            error_kind: Some(kind),
            ..self.blank_result(request, model)
        }
    }

    /// Retrieves context for `request.query` and asks the provider for a summary.
    pub async fn summarize(&self, request: &SummarizeRequest) -> SummaryResult {
        let summary_type = match request.summary_type.parse::<SummaryType>() {
            Ok(summary_type) => summary_type,
            Err(error) => {
                return self.failed(
                    request,
                    &self.settings.default_model,
                    ErrorKind::UnknownSummaryType,
                    error.to_string(),
                )
            }
        };
        let model = self.settings.model_for(summary_type).to_string();

        if let Err(problem) = request.validate() {
            return self.failed(
                request,
                &model,
                ErrorKind::Configuration,
                format!("Invalid summarize request: {problem}"),
            );
        }

        tracing::info!(
            summary_type = %summary_type,
            n_chunks = request.n_chunks,
            source = request.source_filter.as_deref().unwrap_or("*"),
            "starting summarization"
        );

        let filter = QueryFilter::from_source(request.source_filter.as_deref());
        let matches = match self
            .store
            .query(&request.query, request.n_chunks, filter.as_ref())
            .await
        {
            Ok(matches) => matches,
            Err(error) => {
                return self.failed(
                    request,
                    &model,
                    ErrorKind::StoreQuery,
                    format!("Could not query chunk store: {error}"),
                )
            }
        };

        if matches.is_empty() {
            return self.failed(
                request,
                &model,
                ErrorKind::NoContext,
                "No relevant chunks found for summarization".to_string(),
            );
        }

        let budget = context_budget(
            summary_type,
            self.settings.context_window_tokens,
            request.max_tokens,
        );
        let context = assemble_context(&matches, budget);
        if context.chunk_ids.is_empty() {
            return self.failed(
                request,
                &model,
                ErrorKind::NoContext,
                format!("No retrieved chunk fits the {budget}-character context budget"),
            );
        }

        let generation = GenerationRequest {
            model: model.clone(),
            prompt: render_prompt(summary_type, &context.text),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let summary = match self.provider.generate(&generation).await {
            Ok(summary) => summary,
            Err(error) => {
                return self.failed(
                    request,
                    &model,
                    error.kind(),
                    format!("Error during summarization: {error}"),
                )
            }
        };

        let total_chunks_available = match self.store.stats().await {
            Ok(stats) => Some(stats.total_chunks),
            Err(error) => {
                tracing::warn!(error = %error, "could not read collection stats");
                None
            }
        };

        tracing::info!(
            summary_type = %summary_type,
            chunks = context.chunk_ids.len(),
            "generated summary"
        );
        SummaryResult {
            success: true,
            summary,
            chunks_used: context.chunk_ids.len(),
            chunk_ids: context.chunk_ids,
            total_chunks_available,
            message: None,
            error_kind: None,
            ..self.blank_result(request, &model)
        }
    }

    /// Runs one key-points summary per section, in the given order.
    ///
    /// An empty `sections` slice means the built-in section queries.
    pub async fn summarize_by_sections(
        &self,
        source_filter: Option<&str>,
        sections: &[SectionQuery],
    ) -> SectionedSummary {
        let defaults;
        let sections = if sections.is_empty() {
            defaults = SectionQuery::defaults();
            &defaults[..]
        } else {
            sections
        };

        let mut summaries = Vec::with_capacity(sections.len());
        for section in sections {
            tracing::info!(section = %section.name, "summarizing section");
            let request = SummarizeRequest {
                query: section.query.clone(),
                summary_type: SummaryType::KeyPoints.as_str().to_string(),
                n_chunks: SECTION_CHUNKS,
                source_filter: source_filter.map(str::to_string),
                max_tokens: SECTION_MAX_TOKENS,
                temperature: self.settings.defaults.temperature,
            };
            summaries.push(SectionSummary {
                name: section.name.clone(),
                query: section.query.clone(),
                result: self.summarize(&request).await,
            });
        }

        SectionedSummary {
            source_filter: source_filter.map(str::to_string),
            sections: summaries,
        }
    }

    /// Comprehensive summary under a fixed query, plus collection facts.
    pub async fn overview(&self, source_filter: Option<&str>) -> OverviewResult {
        let request = SummarizeRequest {
            query: OVERVIEW_QUERY.to_string(),
            summary_type: SummaryType::Comprehensive.as_str().to_string(),
            source_filter: source_filter.map(str::to_string),
            ..self.settings.defaults.clone()
        };

        let filter = QueryFilter::from_source(source_filter);
        let sample = self
            .store
            .query(OVERVIEW_QUERY, request.n_chunks, filter.as_ref())
            .await
            .unwrap_or_default();
        let source_files = sample
            .iter()
            .map(|hit| hit.metadata.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let chunk_length_range = chunk_length_range(&sample);

        let summary = self.summarize(&request).await;
        let stats = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(error) => {
                tracing::warn!(error = %error, "could not read collection stats");
                None
            }
        };

        OverviewResult {
            success: summary.success,
            message: summary.message.clone(),
            error_kind: summary.error_kind,
            summary,
            stats,
            source_files,
            chunk_length_range,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&str>,
    ) -> SearchOutcome {
        search(self.store, query, top_k, source_filter).await
    }
}

/// Similarity search without a provider, for commands that only read the store.
pub async fn search<S: ChunkStore + ?Sized>(
    store: &S,
    query: &str,
    top_k: usize,
    source_filter: Option<&str>,
) -> SearchOutcome {
    let filter = QueryFilter::from_source(source_filter);
    let result = store.query(query, top_k, filter.as_ref()).await;
    SearchOutcome::from_store(query, source_filter, result)
}

fn chunk_length_range(matches: &[StoreMatch]) -> Option<(usize, usize)> {
    let lengths = matches.iter().map(|hit| hit.text.chars().count());
    let min = lengths.clone().min()?;
    let max = lengths.max()?;
    Some((min, max))
}
