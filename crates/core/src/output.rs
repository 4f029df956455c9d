//! Markdown reports under the output directory.
//!
//! Layout: `summaries/`, `overviews/`, `sections/` and `searches/` hold one
//! file per saved result, and `index.md` at the root links all of them. The
//! index is rebuilt after every successful write.

use crate::error::OutputError;
use crate::models::{
    OverviewResult, SearchOutcome, SectionedSummary, SummaryResult, SummaryType,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const MAX_STEM_CHARS: usize = 100;
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FOOTER: &str = "---\n*Generated by pdf-digest*\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Summaries,
    Overviews,
    Sections,
    Searches,
}

impl ReportCategory {
    pub const ALL: [ReportCategory; 4] = [
        ReportCategory::Summaries,
        ReportCategory::Overviews,
        ReportCategory::Sections,
        ReportCategory::Searches,
    ];

    pub fn directory(&self) -> &'static str {
        match self {
            ReportCategory::Summaries => "summaries",
            ReportCategory::Overviews => "overviews",
            ReportCategory::Sections => "sections",
            ReportCategory::Searches => "searches",
        }
    }

    fn index_heading(&self) -> &'static str {
        match self {
            ReportCategory::Summaries => "Summaries",
            ReportCategory::Overviews => "Document Overviews",
            ReportCategory::Sections => "Sectioned Summaries",
            ReportCategory::Searches => "Search Results",
        }
    }
}

/// A result ready to be saved, tagged with what it is.
#[derive(Debug, Clone, Copy)]
pub enum Report<'a> {
    Summary(&'a SummaryResult),
    Overview(&'a OverviewResult),
    Sections(&'a SectionedSummary),
    Search(&'a SearchOutcome),
}

impl Report<'_> {
    pub fn category(&self) -> ReportCategory {
        match self {
            Report::Summary(_) => ReportCategory::Summaries,
            Report::Overview(_) => ReportCategory::Overviews,
            Report::Sections(_) => ReportCategory::Sections,
            Report::Search(_) => ReportCategory::Searches,
        }
    }

    /// Leading part of the file name.
    pub fn kind(&self) -> &str {
        match self {
            Report::Summary(result) => &result.summary_type,
            Report::Overview(_) => "overview",
            Report::Sections(_) => "sections",
            Report::Search(_) => "search",
        }
    }

    fn default_stem(&self, source_filter: Option<&str>) -> String {
        match (source_filter, self) {
            (Some(source), _) => source.to_string(),
            (None, Report::Search(outcome)) => outcome.query.clone(),
            (None, _) => self.kind().to_string(),
        }
    }

    fn render(&self, source_filter: Option<&str>, now: &DateTime<Local>) -> Result<String, OutputError> {
        let generated = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let source = source_filter.unwrap_or("Multiple files");
        match self {
            Report::Summary(result) => render_summary(result, source, &generated),
            Report::Overview(result) => render_overview(result, source, &generated),
            Report::Sections(result) => render_sections(result, source, &generated),
            Report::Search(outcome) => render_search(outcome, &generated),
        }
    }
}

/// Replaces path-hostile characters, joins whitespace runs with `_` and caps the length.
pub fn sanitize_filename(raw: &str) -> String {
    let replaced = raw.replace(FORBIDDEN_CHARS, "_");
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_STEM_CHARS)
        .collect()
}

fn json_block<T: Serialize>(value: &T) -> Result<String, OutputError> {
    Ok(format!("```json\n{}\n```\n", serde_json::to_string_pretty(value)?))
}

fn title_case(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_summary(result: &SummaryResult, source: &str, generated: &str) -> Result<String, OutputError> {
    let heading = result
        .summary_type
        .parse::<SummaryType>()
        .map(|summary_type| summary_type.heading().to_string())
        .unwrap_or_else(|_| format!("{} Summary", title_case(&result.summary_type)));

    Ok(format!(
        "# {heading}\n\n\
         ## Document Information\n\
         - **Source File**: {source}\n\
         - **Generated**: {generated}\n\
         - **Summary Type**: {summary_type}\n\
         - **Model Used**: {model}\n\
         - **Provider**: {provider}\n\
         - **Chunks Used**: {chunks_used}\n\
         - **Query**: {query}\n\n\
         ## Summary\n\n\
         {body}\n\n\
         ## Metadata\n\n\
         {metadata}\n\
         {FOOTER}",
        summary_type = result.summary_type,
        model = result.model,
        provider = result.provider,
        chunks_used = result.chunks_used,
        query = result.query,
        body = summary_or_message(result),
        metadata = json_block(result)?,
    ))
}

fn summary_or_message(result: &SummaryResult) -> String {
    if result.success {
        result.summary.clone()
    } else {
        format!(
            "**Failed**: {}",
            result.message.as_deref().unwrap_or("no summary available")
        )
    }
}

fn render_overview(result: &OverviewResult, source: &str, generated: &str) -> Result<String, OutputError> {
    let total_chunks = result
        .stats
        .as_ref()
        .map(|stats| stats.total_chunks.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let range = result
        .chunk_length_range
        .map(|(min, max)| format!("{min}-{max} characters"))
        .unwrap_or_else(|| "N/A".to_string());

    Ok(format!(
        "# Document Overview\n\n\
         ## Document Information\n\
         - **Source File**: {source}\n\
         - **Generated**: {generated}\n\
         - **Total Chunks**: {total_chunks}\n\
         - **Source Files**: {source_files}\n\
         - **Chunk Size Range**: {range}\n\
         - **Model Used**: {model}\n\
         - **Provider**: {provider}\n\n\
         ## Overview\n\n\
         {body}\n\n\
         ## Metadata\n\n\
         {metadata}\n\
         {FOOTER}",
        source_files = result.source_files.join(", "),
        model = result.summary.model,
        provider = result.summary.provider,
        body = summary_or_message(&result.summary),
        metadata = json_block(result)?,
    ))
}

fn render_sections(result: &SectionedSummary, source: &str, generated: &str) -> Result<String, OutputError> {
    let sections = result
        .sections
        .iter()
        .map(|section| {
            format!(
                "### {}\n\n**Query Used**: {}\n\n{}\n\n---\n\n",
                title_case(&section.name),
                section.query,
                summary_or_message(&section.result)
            )
        })
        .collect::<String>();

    Ok(format!(
        "# Sectioned Summary\n\n\
         ## Document Information\n\
         - **Source File**: {source}\n\
         - **Generated**: {generated}\n\
         - **Total Sections**: {total}\n\
         - **Sections Generated**: {succeeded}\n\n\
         ## Sections\n\n\
         {sections}\
         ## Metadata\n\n\
         {metadata}\n\
         {FOOTER}",
        total = result.sections.len(),
        succeeded = result.succeeded(),
        metadata = json_block(result)?,
    ))
}

fn render_search(outcome: &SearchOutcome, generated: &str) -> Result<String, OutputError> {
    let results = outcome
        .matches
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "### Result {}\n\n\
                 - **Source**: {}\n\
                 - **Chunk**: {}/{}\n\
                 - **Similarity Score**: {:.3}\n\
                 - **Content**:\n\n\
                 {}\n\n\
                 ---\n\n",
                position + 1,
                hit.metadata.source,
                hit.metadata.chunk_index,
                hit.metadata.total_chunks,
                hit.score,
                hit.text.trim()
            )
        })
        .collect::<String>();

    Ok(format!(
        "# Search Results\n\n\
         ## Search Information\n\
         - **Query**: {query}\n\
         - **Source File**: {source}\n\
         - **Generated**: {generated}\n\
         - **Results Found**: {found}\n\n\
         ## Results\n\n\
         {results}\
         ## Search Metadata\n\n\
         {metadata}\n\
         {FOOTER}",
        query = outcome.query,
        source = outcome.source_filter.as_deref().unwrap_or("All files"),
        found = outcome.matches.len(),
        metadata = json_block(outcome)?,
    ))
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OutputStats {
    pub summaries: usize,
    pub overviews: usize,
    pub sections: usize,
    pub searches: usize,
    pub total_files: usize,
    pub output_directory: String,
}

pub struct ReportWriter {
    root: PathBuf,
}

impl ReportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn write_report(
        &self,
        report: Report<'_>,
        source_filter: Option<&str>,
        custom_name: Option<&str>,
    ) -> Result<PathBuf, OutputError> {
        self.write_report_at(report, source_filter, custom_name, Local::now())
    }

    /// Writes `report` as `{kind}_{YYYYMMDD_HHMMSS}_{stem}.md` and refreshes the index.
    pub fn write_report_at(
        &self,
        report: Report<'_>,
        source_filter: Option<&str>,
        custom_name: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<PathBuf, OutputError> {
        let directory = self.root.join(report.category().directory());
        fs::create_dir_all(&directory).map_err(|error| OutputError::io(&directory, error))?;

        let kind = sanitize_filename(report.kind());
        let kind = if kind.is_empty() {
            report.category().directory().to_string()
        } else {
            kind
        };
        let requested = custom_name
            .map(str::to_string)
            .unwrap_or_else(|| report.default_stem(source_filter));
        let stem = match sanitize_filename(&requested) {
            stem if stem.is_empty() => kind.clone(),
            stem => stem,
        };

        let base = format!("{kind}_{}_{stem}", now.format("%Y%m%d_%H%M%S"));
        let path = unused_path(&directory, &base);
        let content = report.render(source_filter, &now)?;
        fs::write(&path, content).map_err(|error| OutputError::io(&path, error))?;
        tracing::info!(path = %path.display(), "report saved");

        self.rebuild_index()?;
        Ok(path)
    }

    fn list_reports(&self, category: ReportCategory) -> Result<Vec<(SystemTime, String)>, OutputError> {
        let directory = self.root.join(category.directory());
        if !directory.is_dir() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        let entries = fs::read_dir(&directory).map_err(|error| OutputError::io(&directory, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| OutputError::io(&directory, error))?;
            let path = entry.path();
            let is_markdown = path
                .extension()
                .map_or(false, |extension| extension.eq_ignore_ascii_case("md"));
            if !is_markdown || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            reports.push((modified, entry.file_name().to_string_lossy().to_string()));
        }

        reports.sort_by(|left, right| right.0.cmp(&left.0).then_with(|| left.1.cmp(&right.1)));
        Ok(reports)
    }

    /// Rewrites `index.md` with every report, newest first within each category.
    pub fn rebuild_index(&self) -> Result<PathBuf, OutputError> {
        fs::create_dir_all(&self.root).map_err(|error| OutputError::io(&self.root, error))?;

        let mut out = format!(
            "# Output Index\n\nGenerated on: {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for category in ReportCategory::ALL {
            out.push_str(&format!("## {}\n\n", category.index_heading()));
            let reports = self.list_reports(category)?;
            if reports.is_empty() {
                out.push_str("_None yet._\n");
            }
            for (_, name) in reports {
                out.push_str(&format!("- [{name}]({}/{name})\n", category.directory()));
            }
            out.push('\n');
        }
        out.push_str(FOOTER);

        let path = self.root.join("index.md");
        fs::write(&path, out).map_err(|error| OutputError::io(&path, error))?;
        tracing::debug!(path = %path.display(), "index rebuilt");
        Ok(path)
    }

    pub fn stats(&self) -> Result<OutputStats, OutputError> {
        let count = |category| self.list_reports(category).map(|reports| reports.len());
        let summaries = count(ReportCategory::Summaries)?;
        let overviews = count(ReportCategory::Overviews)?;
        let sections = count(ReportCategory::Sections)?;
        let searches = count(ReportCategory::Searches)?;
        Ok(OutputStats {
            summaries,
            overviews,
            sections,
            searches,
            total_files: summaries + overviews + sections + searches,
            output_directory: self.root.display().to_string(),
        })
    }
}

/// `base.md`, or `base_2.md`, `base_3.md`... when that name is taken.
fn unused_path(directory: &Path, base: &str) -> PathBuf {
    let first = directory.join(format!("{base}.md"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|suffix| directory.join(format!("{base}_{suffix}.md")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{ChunkMetadata, SectionSummary, StoreMatch};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn at(hour: u32) -> Result<DateTime<Local>, Box<dyn std::error::Error>> {
        Local
            .with_ymd_and_hms(2024, 3, 9, hour, 15, 30)
            .single()
            .ok_or_else(|| "ambiguous local time".into())
    }

    fn summary(success: bool) -> SummaryResult {
        SummaryResult {
            success,
            query: "main topics".to_string(),
            summary_type: "executive".to_string(),
            summary: if success { "Short and sharp.".to_string() } else { String::new() },
            chunk_ids: vec!["plan.pdf_0_abcdef12".to_string()],
            chunks_used: 1,
            total_chunks_available: Some(4),
            source_filter: Some("plan.pdf".to_string()),
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 2_000,
            temperature: 0.7,
            generated_at: "2024-03-09T10:15:30+00:00".to_string(),
            message: (!success).then(|| "No relevant chunks found".to_string()),
            error_kind: (!success).then_some(ErrorKind::NoContext),
        }
    }

    #[test]
    fn sanitized_names_are_safe_and_bounded() {
        let raw = format!("a<b>c:d\"e/f\\g|h?i*j   lots of   space {}", "z".repeat(200));
        let clean = sanitize_filename(&raw);

        assert!(clean.chars().count() <= MAX_STEM_CHARS);
        assert!(!clean.contains(FORBIDDEN_CHARS));
        assert!(!clean.contains(char::is_whitespace));
        assert!(clean.starts_with("a_b_c_d_e_f_g_h_i_j_lots_of_space_"));
        assert_eq!(sanitize_filename("  \t "), "");
    }

    #[test]
    fn summary_report_lands_in_summaries_with_timestamped_name(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        let result = summary(true);

        let path = writer.write_report_at(Report::Summary(&result), Some("plan.pdf"), None, at(10)?)?;

        assert_eq!(
            path,
            dir.path().join("summaries").join("executive_20240309_101530_plan.pdf.md")
        );
        let content = fs::read_to_string(&path)?;
        assert!(content.starts_with("# Executive Summary"));
        assert!(content.contains("- **Source File**: plan.pdf"));
        assert!(content.contains("- **Model Used**: gpt-3.5-turbo"));
        assert!(content.contains("Short and sharp."));
        assert!(content.contains("```json\n{"));
        assert!(content.contains("- **Query**: main topics\n\n## Summary\n\nShort and sharp.\n\n## Metadata\n\n```json\n{"));
        assert!(content.ends_with("```\n\n---\n*Generated by pdf-digest*\n"));
        assert!(dir.path().join("index.md").exists());
        Ok(())
    }

    #[test]
    fn blank_custom_name_falls_back_to_kind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        let sections = SectionedSummary {
            source_filter: None,
            sections: vec![SectionSummary {
                name: "key_data".to_string(),
                query: "numbers".to_string(),
                result: summary(false),
            }],
        };

        let path = writer.write_report_at(Report::Sections(&sections), None, Some("???"), at(9)?)?;
        let blank = writer.write_report_at(Report::Sections(&sections), None, Some("   "), at(9)?)?;

        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("sections_20240309_091530____.md")
        );
        assert_eq!(
            blank.file_name().and_then(|name| name.to_str()),
            Some("sections_20240309_091530_sections.md")
        );
        let content = fs::read_to_string(&blank)?;
        assert!(content.contains("### Key Data"));
        assert!(content.contains("**Failed**: No relevant chunks found"));
        Ok(())
    }

    #[test]
    fn same_second_writes_do_not_overwrite() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        let result = summary(true);

        let first = writer.write_report_at(Report::Summary(&result), None, Some("q"), at(8)?)?;
        let second = writer.write_report_at(Report::Summary(&result), None, Some("q"), at(8)?)?;

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("executive_20240309_081530_q_2.md"));
        assert_eq!(writer.stats()?.summaries, 2);
        Ok(())
    }

    #[test]
    fn search_report_defaults_to_query_stem() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        let outcome = SearchOutcome {
            success: true,
            query: "solar storage".to_string(),
            source_filter: None,
            matches: vec![StoreMatch {
                chunk_id: "plan.pdf_1_00000000".to_string(),
                text: "Battery storage grows.".to_string(),
                metadata: ChunkMetadata {
                    source: "plan.pdf".to_string(),
                    source_path: "/docs/plan.pdf".to_string(),
                    chunk_index: 1,
                    total_chunks: 3,
                    file_size: 10,
                    extra: Default::default(),
                },
                score: 0.8123,
            }],
            message: None,
            error_kind: None,
        };

        let path = writer.write_report_at(Report::Search(&outcome), None, None, at(11)?)?;

        assert!(path.ends_with("searches/search_20240309_111530_solar_storage.md"));
        let content = fs::read_to_string(&path)?;
        assert!(content.contains("- **Chunk**: 1/3"));
        assert!(content.contains("- **Similarity Score**: 0.812"));
        assert!(content.contains("Battery storage grows."));
        Ok(())
    }

    #[test]
    fn index_lists_newest_first_per_category() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        let result = summary(true);

        let older = writer.write_report_at(Report::Summary(&result), None, Some("older"), at(7)?)?;
        let newer = writer.write_report_at(Report::Summary(&result), None, Some("newer"), at(12)?)?;
        let base = SystemTime::now();
        fs::File::options()
            .write(true)
            .open(&older)?
            .set_modified(base - Duration::from_secs(3_600))?;
        fs::File::options().write(true).open(&newer)?.set_modified(base)?;

        let index = fs::read_to_string(writer.rebuild_index()?)?;

        let newer_at = index.find("summaries/executive_20240309_121530_newer.md");
        let older_at = index.find("summaries/executive_20240309_071530_older.md");
        assert!(newer_at.is_some() && older_at.is_some());
        assert!(newer_at < older_at);
        assert!(index.contains("## Search Results"));
        Ok(())
    }

    #[test]
    fn stats_count_each_category() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let writer = ReportWriter::new(dir.path());
        assert_eq!(writer.stats()?.total_files, 0);

        let result = summary(true);
        writer.write_report_at(Report::Summary(&result), None, None, at(6)?)?;
        let sections = SectionedSummary {
            source_filter: None,
            sections: Vec::new(),
        };
        writer.write_report_at(Report::Sections(&sections), None, None, at(6)?)?;

        let stats = writer.stats()?;
        assert_eq!(stats.summaries, 1);
        assert_eq!(stats.sections, 1);
        assert_eq!(stats.total_files, 2);
        Ok(())
    }

    #[test]
    fn unwritable_root_is_an_output_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file")?;
        let writer = ReportWriter::new(&blocker);
        let result = summary(true);

        let error = writer.write_report(Report::Summary(&result), None, None);

        assert!(matches!(error, Err(OutputError::Io { .. })));
        Ok(())
    }
}
