use crate::models::{StoreMatch, SummaryType};

/// Rough chars-per-token ratio used to turn a token window into a text budget.
pub const CHARS_PER_TOKEN: usize = 4;

const CONTEXT_SLOT: &str = "{context}";

const COMPREHENSIVE_TEMPLATE: &str = "\
Please provide a comprehensive summary of the following document content. \
Focus on the main topics, key findings, important details, and overall structure.

Document Content:
{context}

Please structure your summary with:
1. Main topics and themes
2. Key findings and insights
3. Important details and data points
4. Structure and organization
5. Conclusions or recommendations

Summary:";

const EXECUTIVE_TEMPLATE: &str = "\
Please provide an executive summary of the following document content. \
Keep it concise and focused on the most critical information for decision-makers.

Document Content:
{context}

Please include:
- Purpose and scope
- Key findings and their implications
- Critical insights
- Recommendations or next steps

Executive Summary:";

const KEY_POINTS_TEMPLATE: &str = "\
Please extract the key points from the following document content. \
Present them as a clear, organized list.

Document Content:
{context}

Please format as:
\u{2022} [Key Point 1]
\u{2022} [Key Point 2]
\u{2022} [Key Point 3]
...

Key Points:";

pub fn template(summary_type: SummaryType) -> &'static str {
    match summary_type {
        SummaryType::Comprehensive => COMPREHENSIVE_TEMPLATE,
        SummaryType::Executive => EXECUTIVE_TEMPLATE,
        SummaryType::KeyPoints => KEY_POINTS_TEMPLATE,
    }
}

/// Character budget left for chunk text once the template and the answer are accounted for.
pub fn context_budget(summary_type: SummaryType, context_window_tokens: u32, max_tokens: u32) -> usize {
    let prompt_tokens = context_window_tokens.saturating_sub(max_tokens) as usize;
    let template_chars = template(summary_type).chars().count() - CONTEXT_SLOT.len();
    (prompt_tokens * CHARS_PER_TOKEN).saturating_sub(template_chars)
}

fn chunk_block(position: usize, hit: &StoreMatch) -> String {
    format!(
        "[Chunk {position} | source: {} | index: {}]\n{}",
        hit.metadata.source,
        hit.metadata.chunk_index,
        hit.text.trim()
    )
}

/// Context text plus the matches that made it in, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    pub chunk_ids: Vec<String>,
}

/// Packs ranked matches into at most `budget` characters.
///
/// Matches are taken best first and packing stops at the first one that
/// would overflow, so the chosen set is always a prefix of the ranking.
pub fn assemble_context(matches: &[StoreMatch], budget: usize) -> AssembledContext {
    let separator = "\n\n";
    let mut text = String::new();
    let mut used = 0usize;
    let mut chunk_ids = Vec::new();

    for hit in matches {
        let block = chunk_block(chunk_ids.len() + 1, hit);
        let cost = block.chars().count() + if chunk_ids.is_empty() { 0 } else { separator.len() };
        if used + cost > budget {
            tracing::debug!(
                kept = chunk_ids.len(),
                dropped = matches.len() - chunk_ids.len(),
                budget,
                "context budget reached"
            );
            break;
        }
        if !chunk_ids.is_empty() {
            text.push_str(separator);
        }
        text.push_str(&block);
        used += cost;
        chunk_ids.push(hit.chunk_id.clone());
    }

    AssembledContext { text, chunk_ids }
}

pub fn render_prompt(summary_type: SummaryType, context: &str) -> String {
    template(summary_type).replacen(CONTEXT_SLOT, context, 1)
}
