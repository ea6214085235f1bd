// PDF helpers shared by the keyword scanner and the bundler.

use anyhow::anyhow;
use lopdf::Document;
use pdf_extract::PlainTextOutput;
use std::panic::AssertUnwindSafe;

/// Parses a PDF held in memory for text extraction. Documents locked with an
/// empty user password are unlocked; any other password is an error.
pub fn load_for_text(bytes: &[u8]) -> anyhow::Result<Document> {
    let mut document =
        Document::load_mem(bytes).map_err(|e| anyhow!("failed to parse PDF structure: {}", e))?;
    if document.is_encrypted() {
        document
            .decrypt("")
            .map_err(|e| anyhow!("PDF is protected by a password: {}", e))?;
    }
    Ok(document)
}

/// Plain text of one page (1-based), laid out by `pdf-extract` so words
/// placed by separate text runs keep the space between them. pdf-extract
/// panics on some malformed pages; that is turned into an error.
pub fn extract_page_text(document: &Document, page_number: u32) -> anyhow::Result<String> {
    let rendered = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut text = String::new();
        {
            let mut output = PlainTextOutput::new(&mut text);
            pdf_extract::output_doc_page(document, &mut output, page_number)?;
        }
        Ok::<_, pdf_extract::OutputError>(text)
    }))
    .map_err(|_| anyhow!("pdf-extract panicked on page {}", page_number))?;

    rendered.map_err(|e| anyhow!("failed to extract text from page {}: {}", page_number, e))
}

/// Returns true if the head of a file carries the `%PDF-` header.
/// Readers accept the header anywhere in the first 1024 bytes, so do we.
pub fn is_pdf(head: &[u8]) -> bool {
    const MAGIC: &[u8] = b"%PDF-";
    let limit = head.len().min(1024);
    head[..limit].windows(MAGIC.len()).any(|w| w == MAGIC)
}

/// Last path component of a storage path, used as the local and archive name.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
