use tracing::{debug, info};

use crate::dropbox::{EntryKind, FileEntry, FolderPath, StorageBackend};
use crate::error::FinderError;

/// A listed entry is scanned only if it is a regular file whose name ends in
/// `.pdf`. The suffix match is case-sensitive, so `report.PDF` is skipped.
pub fn is_pdf_candidate(entry: &FileEntry) -> bool {
    entry.kind == EntryKind::File && entry.name.ends_with(".pdf")
}

/// Lists the folder once and keeps the PDF candidates in listing order.
pub async fn list_pdf_files(
    backend: &dyn StorageBackend,
    folder: &FolderPath,
) -> Result<Vec<FileEntry>, FinderError> {
    let entries = backend.list_folder(folder.as_str()).await?;
    let total = entries.len();

    let candidates: Vec<FileEntry> = entries.into_iter().filter(is_pdf_candidate).collect();

    debug!(
        "Folder {} has {} entries, {} PDF candidates",
        folder,
        total,
        candidates.len()
    );
    info!("Found {} PDF files in {}", candidates.len(), folder);

    Ok(candidates)
}
