//! Fixtures shared by unit tests: an in-memory storage backend and a tiny
//! PDF generator.

use async_trait::async_trait;
use lopdf::{dictionary, Object, Stream};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dropbox::{DropboxApiError, FileEntry, StorageBackend};
use crate::error::FinderError;
use crate::finder::pipeline::{ItemFailure, PdfMatch, SearchEvent, SearchReporter};
use crate::tools::BackendFactory;

/// Content of one generated page.
pub struct PageContent {
    stream: String,
    media_box: bool,
}

impl PageContent {
    /// One line of Helvetica text.
    pub fn text(text: &str) -> Self {
        Self::text_runs(&[text])
    }

    /// Each run is shown by its own `Tj`, placed 40pt right of the previous
    /// one, so no space character separates them in the content stream.
    pub fn text_runs(runs: &[&str]) -> Self {
        let mut stream = String::from("BT /F1 12 Tf 72 720 Td");
        for (i, run) in runs.iter().enumerate() {
            if i > 0 {
                stream.push_str(" 40 0 Td");
            }
            let escaped = run
                .replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)");
            stream.push_str(&format!(" ({}) Tj", escaped));
        }
        stream.push_str(" ET");
        Self {
            stream,
            media_box: true,
        }
    }

    /// Leaves the page without a MediaBox, which text layout engines need.
    pub fn without_media_box(mut self) -> Self {
        self.media_box = false;
        self
    }
}

/// Builds a PDF with one page per entry of `pages`, each showing that text
/// in Helvetica.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let pages: Vec<PageContent> = pages.iter().map(|text| PageContent::text(text)).collect();
    pdf_with_content(&pages)
}

pub fn pdf_with_content(pages: &[PageContent]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    });

    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());

    for page in pages {
        let content = Stream::new(dictionary! {}, page.stream.clone().into_bytes());
        let content_id = doc.add_object(content);

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        };
        if page.media_box {
            page_dict.set(
                "MediaBox",
                vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
            );
        }
        let page_id = doc.add_object(page_dict);
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Page texts of a PDF, in page order, as `lopdf` extracts them.
pub fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .keys()
        .map(|n| doc.extract_text(&[*n]).unwrap())
        .collect()
}

/// Storage backend that serves a fixed listing and file contents from memory.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Vec<FileEntry>,
    files: HashMap<String, Vec<u8>>,
    broken_downloads: HashSet<String>,
    listing_fails: bool,
    download_delay: Option<Duration>,
    downloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listed file with the given contents. The lowercase path is
    /// `/docs/<name lowercased>`.
    pub fn with_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        let path = format!("/docs/{}", name.to_lowercase());
        self.entries.push(FileEntry::file(name, path.clone()));
        self.files.insert(path, bytes);
        self
    }

    pub fn with_folder(mut self, name: &str) -> Self {
        self.entries
            .push(FileEntry::folder(name, format!("/docs/{}", name.to_lowercase())));
        self
    }

    /// Listed, but every download of it fails.
    pub fn with_broken_file(mut self, name: &str) -> Self {
        let path = format!("/docs/{}", name.to_lowercase());
        self.entries.push(FileEntry::file(name, path.clone()));
        self.broken_downloads.insert(path);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Backend factory that hands out `backend` whatever the token.
pub fn serve_from(backend: MemoryBackend) -> BackendFactory {
    let backend: Arc<dyn StorageBackend> = Arc::new(backend);
    Arc::new(move |_: &str| -> Result<Arc<dyn StorageBackend>, FinderError> {
        Ok(backend.clone())
    })
}

fn not_found() -> DropboxApiError {
    DropboxApiError::Api {
        status: 409,
        summary: "path/not_found/".to_string(),
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_folder(&self, path: &str) -> Result<Vec<FileEntry>, FinderError> {
        if self.listing_fails {
            return Err(FinderError::FolderAccess {
                path: path.to_string(),
                source: DropboxApiError::Api {
                    status: 401,
                    summary: "invalid_access_token/".to_string(),
                },
            });
        }
        Ok(self.entries.clone())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FinderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.broken_downloads.contains(path) {
            Err(not_found())
        } else {
            self.files.get(path).cloned().ok_or_else(not_found)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map_err(|source| FinderError::Download {
            path: path.to_string(),
            source,
        })
    }
}

/// Reporter for callers that only want the final outcome.
pub struct SilentReporter;

impl SearchReporter for SilentReporter {
    fn report(&self, _event: SearchEvent) {}
}

/// Reporter that keeps every event, in order.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<SearchEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn matches(&self) -> Vec<PdfMatch> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SearchEvent::Match(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<ItemFailure> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SearchEvent::ItemFailed(f) => Some(f),
                _ => None,
            })
            .collect()
    }
}

impl SearchReporter for RecordingReporter {
    fn report(&self, event: SearchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
