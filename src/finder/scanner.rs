use lopdf::Document;
use tracing::debug;

use crate::dropbox::StorageBackend;
use crate::error::FinderError;
use crate::utils::pdf::{extract_page_text, is_pdf, load_for_text};

/// Index of the first page whose text contains `keyword`, comparing
/// lowercased text. Pages after the first hit are never pulled from the
/// iterator, and the first page error aborts the scan.
pub fn first_matching_page<I, E>(pages: I, keyword: &str) -> Result<Option<usize>, E>
where
    I: IntoIterator<Item = Result<String, E>>,
{
    let needle = keyword.to_lowercase();
    for (index, page) in pages.into_iter().enumerate() {
        if page?.to_lowercase().contains(&needle) {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Page texts of one document, produced one page at a time by `layout`.
/// A page `layout` fails on is read with lopdf's raw text extraction
/// instead, which loses the spacing between separately placed words but
/// needs no page geometry.
struct PageTexts<'a, F> {
    document: &'a Document,
    page_numbers: Vec<u32>,
    next: usize,
    layout: F,
}

impl<'a, F> PageTexts<'a, F>
where
    F: FnMut(&Document, u32) -> anyhow::Result<String>,
{
    fn new(document: &'a Document, layout: F) -> Self {
        Self {
            document,
            page_numbers: document.get_pages().keys().copied().collect(),
            next: 0,
            layout,
        }
    }

    fn page_number(&self, index: usize) -> Option<u32> {
        self.page_numbers.get(index).copied()
    }
}

impl<F> Iterator for PageTexts<'_, F>
where
    F: FnMut(&Document, u32) -> anyhow::Result<String>,
{
    type Item = Result<String, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_number = self.page_number(self.next)?;
        self.next += 1;

        match (self.layout)(self.document, page_number) {
            Ok(text) => Some(Ok(text)),
            Err(primary) => {
                debug!("{:#}, reading raw page text instead", primary);
                Some(
                    self.document
                        .extract_text(&[page_number])
                        .map_err(|fallback| format!("{:#}; {}", primary, fallback)),
                )
            }
        }
    }
}

/// Runs the keyword search over an already parsed document and returns the
/// 1-based number of the first matching page.
fn scan_document<F>(document: &Document, keyword: &str, layout: F) -> Result<Option<u32>, String>
where
    F: FnMut(&Document, u32) -> anyhow::Result<String>,
{
    let mut pages = PageTexts::new(document, layout);
    let hit = first_matching_page(pages.by_ref(), keyword)?;
    Ok(hit.and_then(|index| pages.page_number(index)))
}

/// Searches an in-memory PDF for `keyword`. Returns the 1-based number of the
/// first matching page.
pub fn scan_pdf_bytes(path: &str, bytes: &[u8], keyword: &str) -> Result<Option<u32>, FinderError> {
    if !is_pdf(bytes) {
        return Err(FinderError::NotPdf {
            path: path.to_string(),
        });
    }

    let pdf_error = |reason: String| FinderError::Pdf {
        path: path.to_string(),
        reason,
    };

    let document = load_for_text(bytes).map_err(|e| pdf_error(format!("{:#}", e)))?;
    scan_document(&document, keyword, extract_page_text).map_err(pdf_error)
}

/// Downloads one file and scans it off the async runtime.
pub async fn scan_file(
    backend: &dyn StorageBackend,
    path: &str,
    keyword: &str,
) -> Result<Option<u32>, FinderError> {
    let bytes = backend.download(path).await?;
    debug!("Downloaded {} ({} bytes)", path, bytes.len());

    let path = path.to_string();
    let keyword = keyword.to_string();
    tokio::task::spawn_blocking(move || scan_pdf_bytes(&path, &bytes, &keyword)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_content, pdf_with_pages, MemoryBackend, PageContent};
    use anyhow::anyhow;
    use std::cell::{Cell, RefCell};

    #[test]
    fn matching_is_case_insensitive() {
        let pages = vec![Ok::<_, ()>("Intro".to_string()), Ok("The QUARTERLY report".to_string())];
        assert_eq!(first_matching_page(pages, "quarterly"), Ok(Some(1)));
    }

    #[test]
    fn no_match_returns_none() {
        let pages = vec![Ok::<_, ()>("alpha".to_string()), Ok("beta".to_string())];
        assert_eq!(first_matching_page(pages, "gamma"), Ok(None));
    }

    #[test]
    fn stops_pulling_pages_after_first_hit() {
        let pulled = Cell::new(0);
        let pages = (0..10).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok::<_, ()>(if i == 2 { "needle here".to_string() } else { "hay".to_string() })
        });

        assert_eq!(first_matching_page(pages, "Needle"), Ok(Some(2)));
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn page_error_before_a_hit_fails_the_scan() {
        let pages = vec![Err("broken page"), Ok("needle".to_string())];
        assert_eq!(first_matching_page(pages, "needle"), Err("broken page"));
    }

    #[test]
    fn finds_keyword_in_generated_pdf() {
        let bytes = pdf_with_pages(&["Cover page", "Invoice total 42", "Appendix"]);
        let hit = scan_pdf_bytes("/docs/a.pdf", &bytes, "INVOICE").unwrap();
        assert_eq!(hit, Some(2));

        let miss = scan_pdf_bytes("/docs/a.pdf", &bytes, "receipt").unwrap();
        assert_eq!(miss, None);
    }

    #[test]
    fn finds_phrase_split_across_text_runs() {
        let bytes = pdf_with_content(&[
            PageContent::text("Summary"),
            PageContent::text_runs(&["annual", "report"]),
        ]);
        let hit = scan_pdf_bytes("/docs/r.pdf", &bytes, "Annual Report").unwrap();
        assert_eq!(hit, Some(2));
    }

    #[test]
    fn page_without_media_box_is_read_as_raw_text() {
        let bytes = pdf_with_content(&[
            PageContent::text("hay"),
            PageContent::text("needle").without_media_box(),
            PageContent::text("more hay"),
        ]);
        assert_eq!(scan_pdf_bytes("/docs/n.pdf", &bytes, "NEEDLE").unwrap(), Some(2));
        assert_eq!(scan_pdf_bytes("/docs/n.pdf", &bytes, "more hay").unwrap(), Some(3));
    }

    #[test]
    fn raw_text_fills_in_only_for_the_failing_page() {
        let document = load_for_text(&pdf_with_pages(&["alpha", "beta", "gamma"])).unwrap();
        let laid_out = RefCell::new(Vec::new());
        let layout = |doc: &Document, page: u32| {
            if page == 2 {
                return Err(anyhow!("layout failed on page {}", page));
            }
            laid_out.borrow_mut().push(page);
            extract_page_text(doc, page)
        };

        assert_eq!(scan_document(&document, "beta", layout), Ok(Some(2)));
        assert_eq!(scan_document(&document, "gamma", layout), Ok(Some(3)));
        assert_eq!(*laid_out.borrow(), vec![1, 1, 3]);
    }

    #[test]
    fn every_page_failing_layout_still_reports_the_right_page() {
        let document = load_for_text(&pdf_with_pages(&["one", "two", "three"])).unwrap();
        let hit = scan_document(&document, "three", |_: &Document, page: u32| {
            Err(anyhow!("layout failed on page {}", page))
        });
        assert_eq!(hit, Ok(Some(3)));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = scan_pdf_bytes("/docs/fake.pdf", b"just text", "x").unwrap_err();
        assert_eq!(err.code(), "ERR_NOT_PDF");
    }

    #[test]
    fn corrupt_pdf_is_a_typed_error() {
        let err = scan_pdf_bytes("/docs/bad.pdf", b"%PDF-1.4\ngarbage", "x").unwrap_err();
        assert_eq!(err.code(), "ERR_PDF_PARSE");
        assert_eq!(err.path(), Some("/docs/bad.pdf"));
    }

    #[tokio::test]
    async fn scan_file_downloads_then_scans() {
        let backend = MemoryBackend::new().with_file("a.pdf", pdf_with_pages(&["hello world"]));
        let hit = scan_file(&backend, "/docs/a.pdf", "World").await.unwrap();
        assert_eq!(hit, Some(1));
        assert_eq!(backend.download_count(), 1);
    }

    #[tokio::test]
    async fn scan_file_surfaces_download_errors() {
        let backend = MemoryBackend::new().with_broken_file("gone.pdf");
        let err = scan_file(&backend, "/docs/gone.pdf", "x").await.unwrap_err();
        assert_eq!(err.code(), "ERR_DOWNLOAD");
    }
}
