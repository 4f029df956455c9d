use crate::chunking::tidy_page_text;
use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Returns the pages that carry text, in page order.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "skipping unreadable page"
                    );
                    continue;
                }
            };

            let text = tidy_page_text(&text);
            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

/// Joins page texts with page markers. Empty when no page has text.
pub fn join_pages(pages: &[PageText]) -> String {
    let mut joined = String::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        joined.push_str(&format!("\n--- Page {} ---\n{}\n", page.number, page.text));
    }
    joined
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    /// Writes a PDF with one page per entry; each page shows its string in Courier.
    pub fn write_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_pdf;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extracts_text_per_page_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two-pages.pdf");
        write_pdf(&path, &["Hello first page", "Second page here"])?;

        let pages = extract_page_texts(&path)?;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Hello"));
        assert!(pages[1].text.contains("Second"));
        Ok(())
    }

    #[test]
    fn garbage_bytes_fail_to_parse() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn join_pages_marks_each_page_and_skips_blank_ones() {
        let pages = vec![
            PageText {
                number: 1,
                text: "Intro".to_string(),
            },
            PageText {
                number: 2,
                text: "   ".to_string(),
            },
            PageText {
                number: 3,
                text: "Outro".to_string(),
            },
        ];

        let joined = join_pages(&pages);
        assert_eq!(joined, "\n--- Page 1 ---\nIntro\n\n--- Page 3 ---\nOutro\n");
        assert!(join_pages(&[]).is_empty());
    }
}
