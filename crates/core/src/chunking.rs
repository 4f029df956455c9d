use crate::error::IngestError;
use sha2::{Digest, Sha256};

/// Break points tried in order when a window has to end before the text does.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Cleans extractor output without touching paragraph structure.
pub fn tidy_page_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `text` into windows of at most `chunk_size` characters.
///
/// Each window ends on the strongest separator found in its back half (and
/// always past its overlap region), and the next window starts exactly
/// `chunk_overlap` characters before that end, so dropping the first
/// `chunk_overlap` characters of every chunk after the first and
/// concatenating gives back `text`.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    if total == 0 {
        return Ok(chunks);
    }

    let mut start = 0usize;
    loop {
        let hard_end = (start + config.chunk_size).min(total);
        let end = if hard_end == total {
            total
        } else {
            let floor = start + (config.chunk_overlap + 1).max(config.chunk_size / 2);
            soft_end(&chars, floor, hard_end)
        };

        chunks.push(chars[start..end].iter().collect::<String>());
        if end == total {
            break;
        }
        start = end - config.chunk_overlap;
    }

    Ok(chunks)
}

/// Latest position in `floor..=ceiling` that falls right after a separator,
/// or `ceiling` when no separator is found.
fn soft_end(chars: &[char], floor: usize, ceiling: usize) -> usize {
    for separator in SEPARATORS {
        let pattern: Vec<char> = separator.chars().collect();
        let mut candidate = ceiling;
        while candidate >= floor.max(pattern.len()) {
            if chars[candidate - pattern.len()..candidate] == pattern[..] {
                return candidate;
            }
            candidate -= 1;
        }
    }
    ceiling
}

/// Inverse of [`split_text`] for chunks produced with the same overlap.
pub fn merge_overlapping(chunks: &[String], overlap: usize) -> String {
    let mut merged = String::new();
    for (position, chunk) in chunks.iter().enumerate() {
        if position == 0 {
            merged.push_str(chunk);
        } else {
            merged.extend(chunk.chars().skip(overlap));
        }
    }
    merged
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable store key: re-ingesting identical content yields the same id.
pub fn make_chunk_id(source: &str, chunk_index: u64, text: &str) -> String {
    let hash = content_hash(text);
    format!("{source}_{chunk_index}_{}", &hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{join_pages, PageText};

    fn prose(len: usize, line_every: usize) -> String {
        let words = ["alpha", "beta", "gamma", "delta", "epsilon"];
        let mut text = String::new();
        let mut index = 0;
        while text.chars().count() < len {
            if !text.is_empty() {
                text.push(if index % line_every == 0 { '\n' } else { ' ' });
            }
            text.push_str(words[index % words.len()]);
            index += 1;
        }
        text.chars().take(len).collect()
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkingConfig::new(100, 100).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(100, 20).is_ok());
    }

    #[test]
    fn text_of_2500_chars_yields_three_bounded_chunks() -> Result<(), IngestError> {
        let text = prose(2_500, usize::MAX);
        let chunks = split_text(&text, ChunkingConfig::default())?;

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 1_000));

        let tail: String = {
            let first: Vec<char> = chunks[0].chars().collect();
            first[first.len() - 200..].iter().collect()
        };
        let head: String = chunks[1].chars().take(200).collect();
        assert_eq!(tail, head);
        Ok(())
    }

    #[test]
    fn page_joined_text_is_not_cut_right_after_the_overlap() -> Result<(), IngestError> {
        let pages = (1..=3)
            .map(|number| PageText {
                number,
                text: prose(700, usize::MAX),
            })
            .collect::<Vec<_>>();
        let text = join_pages(&pages);
        let chunks = split_text(&text, ChunkingConfig::default())?;

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 1_000));
        assert!(chunks[0].ends_with("\n\n"));

        let first: Vec<char> = chunks[0].chars().collect();
        let tail: String = first[first.len() - 200..].iter().collect();
        let head: String = chunks[1].chars().take(200).collect();
        assert_eq!(tail, head);
        assert_eq!(merge_overlapping(&chunks, 200), text);
        Ok(())
    }

    #[test]
    fn marker_lines_near_the_window_start_are_skipped() -> Result<(), IngestError> {
        let pages = (1..=3)
            .map(|number| PageText {
                number,
                text: prose(800, usize::MAX),
            })
            .collect::<Vec<_>>();
        let chunks = split_text(&join_pages(&pages), ChunkingConfig::default())?;

        assert!(chunks.len() <= 4, "{} chunks", chunks.len());
        assert!(chunks
            .iter()
            .take(chunks.len() - 1)
            .all(|chunk| chunk.chars().count() > 500));
        Ok(())
    }

    #[test]
    fn merging_collapsed_overlaps_reconstructs_text() -> Result<(), IngestError> {
        let text = prose(5_321, 37);
        let config = ChunkingConfig::new(700, 150)?;
        let chunks = split_text(&text, config)?;

        assert!(chunks.len() > 7);
        assert_eq!(merge_overlapping(&chunks, config.chunk_overlap), text);
        Ok(())
    }

    #[test]
    fn windows_prefer_paragraph_breaks() -> Result<(), IngestError> {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, ChunkingConfig::new(100, 10)?)?;

        assert!(chunks[0].ends_with("\n\n"));
        assert_eq!(merge_overlapping(&chunks, 10), text);
        Ok(())
    }

    #[test]
    fn unbroken_runs_are_hard_cut() -> Result<(), IngestError> {
        let text = "x".repeat(250);
        let chunks = split_text(&text, ChunkingConfig::new(100, 20)?)?;

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.len() <= 100));
        Ok(())
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() -> Result<(), IngestError> {
        let text = "größe ".repeat(60);
        let chunks = split_text(&text, ChunkingConfig::new(50, 10)?)?;

        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 50));
        assert_eq!(merge_overlapping(&chunks, 10), text);
        Ok(())
    }

    #[test]
    fn short_text_is_a_single_chunk() -> Result<(), IngestError> {
        let chunks = split_text("tiny", ChunkingConfig::default())?;
        assert_eq!(chunks, vec!["tiny".to_string()]);
        assert!(split_text("", ChunkingConfig::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn tidy_keeps_paragraphs_and_drops_trailing_space() {
        let tidy = tidy_page_text("one  \r\n\r\ntwo\u{a0}three\t");
        assert_eq!(tidy, "one\n\ntwo three");
    }

    #[test]
    fn chunk_ids_are_content_addressed() {
        let first = make_chunk_id("report.pdf", 2, "same text");
        let second = make_chunk_id("report.pdf", 2, "same text");
        let changed = make_chunk_id("report.pdf", 2, "other text");

        assert_eq!(first, second);
        assert_ne!(first, changed);
        assert!(first.starts_with("report.pdf_2_"));
        assert_eq!(first.len(), "report.pdf_2_".len() + 8);
    }
}
