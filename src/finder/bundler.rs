use lopdf::{dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::pipeline::{ItemFailure, SearchEvent, SearchReporter, Stage};
use super::FailurePolicy;
use crate::dropbox::StorageBackend;
use crate::error::FinderError;
use crate::utils::pdf::base_name;

/// Shape of the downloadable artifact built from the matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleMode {
    Merge,
    Zip,
}

impl BundleMode {
    pub fn file_name(self) -> &'static str {
        match self {
            BundleMode::Merge => "merged_pdfs.pdf",
            BundleMode::Zip => "filtered_pdfs.zip",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            BundleMode::Merge => "application/pdf",
            BundleMode::Zip => "application/zip",
        }
    }

    /// Shown when bundling was asked for but nothing matched.
    pub fn empty_message(self) -> &'static str {
        match self {
            BundleMode::Merge => "No matching PDFs found to merge.",
            BundleMode::Zip => "No matching PDFs found to create a ZIP file.",
        }
    }
}

impl FromStr for BundleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" | "pdf" => Ok(BundleMode::Merge),
            "zip" => Ok(BundleMode::Zip),
            other => Err(format!("unknown bundle mode '{}' (expected merge or zip)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleArtifact {
    pub mode: BundleMode,
    pub path: PathBuf,
    pub file_name: &'static str,
    pub mime_type: &'static str,
    /// Storage paths that made it into the artifact, in order.
    pub included: Vec<String>,
    pub skipped: Vec<ItemFailure>,
    pub size_bytes: u64,
    /// Total pages of a merged PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

pub struct Bundler<'a> {
    backend: &'a dyn StorageBackend,
    output_dir: &'a Path,
    policy: FailurePolicy,
}

impl<'a> Bundler<'a> {
    pub fn new(backend: &'a dyn StorageBackend, output_dir: &'a Path, policy: FailurePolicy) -> Self {
        Self {
            backend,
            output_dir,
            policy,
        }
    }

    /// Downloads every path into a scratch directory and builds the artifact
    /// under its fixed name in the output directory. The scratch directory is
    /// removed on every exit path, and the artifact only appears once complete.
    pub async fn build(
        &self,
        mode: BundleMode,
        paths: &[String],
        reporter: &dyn SearchReporter,
    ) -> Result<BundleArtifact, FinderError> {
        let scratch = tempfile::Builder::new()
            .prefix("dropbox-pdf-finder-")
            .tempdir()?;

        let mut included = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();
        let mut local_files = Vec::with_capacity(paths.len());
        let mut documents = Vec::new();

        for path in paths {
            match self.fetch(mode, path, scratch.path()).await {
                Ok((local, document)) => {
                    included.push(path.clone());
                    local_files.push((base_name(path).to_string(), local));
                    documents.extend(document);
                }
                Err(err) => match self.policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::SkipAndContinue => {
                        warn!("Leaving {} out of the bundle: {}", path, err);
                        let failure = ItemFailure::new(Stage::Bundle, path, &err);
                        reporter.report(SearchEvent::ItemFailed(failure.clone()));
                        skipped.push(failure);
                    }
                },
            }
        }

        if included.is_empty() {
            return Err(FinderError::Bundle(
                "none of the matching files could be added".to_string(),
            ));
        }

        tokio::fs::create_dir_all(self.output_dir).await?;
        let final_path = self.output_dir.join(mode.file_name());
        let output_dir = self.output_dir.to_path_buf();
        let target = final_path.clone();

        let page_count = tokio::task::spawn_blocking(move || -> Result<Option<usize>, FinderError> {
            let mut staged = tempfile::NamedTempFile::new_in(&output_dir)?;
            let page_count = match mode {
                BundleMode::Merge => {
                    let mut merged = merge_documents(documents)?;
                    let pages = merged.get_pages().len();
                    merged.save_to(staged.as_file_mut())?;
                    Some(pages)
                }
                BundleMode::Zip => {
                    write_zip(staged.as_file_mut(), &local_files)?;
                    None
                }
            };
            staged.as_file_mut().flush()?;
            staged.persist(&target).map_err(|e| FinderError::Io(e.error))?;
            Ok(page_count)
        })
        .await??;

        let size_bytes = tokio::fs::metadata(&final_path).await?.len();
        info!(
            "Bundle {} written to {} ({} files, {} bytes)",
            mode.file_name(),
            final_path.display(),
            included.len(),
            size_bytes
        );

        Ok(BundleArtifact {
            mode,
            path: final_path,
            file_name: mode.file_name(),
            mime_type: mode.mime_type(),
            included,
            skipped,
            size_bytes,
            page_count,
        })
    }

    /// Downloads one file into `dir` under its base name; for a merge it is
    /// also parsed so a broken file fails here, per item.
    async fn fetch(
        &self,
        mode: BundleMode,
        path: &str,
        dir: &Path,
    ) -> Result<(PathBuf, Option<Document>), FinderError> {
        let bytes = self.backend.download(path).await?;
        let local = dir.join(base_name(path));
        tokio::fs::write(&local, &bytes).await?;

        match mode {
            BundleMode::Zip => Ok((local, None)),
            BundleMode::Merge => {
                let source = local.clone();
                let owner = path.to_string();
                let document = tokio::task::spawn_blocking(move || {
                    Document::load(&source).map_err(|e| FinderError::Pdf {
                        path: owner,
                        reason: e.to_string(),
                    })
                })
                .await??;
                Ok((local, Some(document)))
            }
        }
    }
}

/// Concatenates documents page by page, in order. Each document's page tree
/// is renumbered and hung under a new root so inherited page attributes
/// (resources, media box) keep applying.
pub fn merge_documents(documents: Vec<Document>) -> Result<Document, FinderError> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut subtrees = Vec::with_capacity(documents.len());
    let mut total_pages: i64 = 0;

    for mut doc in documents {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
        let pages_id = doc.get_dictionary(catalog_id)?.get(b"Pages")?.as_reference()?;
        total_pages += doc.get_pages().len() as i64;

        doc.objects.remove(&catalog_id);
        merged.objects.extend(doc.objects);
        subtrees.push(pages_id);
    }

    merged.max_id = next_id - 1;
    let root_id = merged.new_object_id();

    for pages_id in &subtrees {
        merged
            .get_object_mut(*pages_id)?
            .as_dict_mut()?
            .set("Parent", Object::Reference(root_id));
    }

    let kids: Vec<Object> = subtrees.into_iter().map(Object::Reference).collect();
    merged.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total_pages,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(root_id),
    });
    merged.trailer.set("Root", Object::Reference(catalog_id));

    Ok(merged)
}

/// Stores each local file in the archive under the given name, unmodified.
pub fn write_zip<W: Write + Seek>(writer: W, files: &[(String, PathBuf)]) -> Result<W, FinderError> {
    let mut archive = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, local) in files {
        archive.start_file(name.as_str(), options)?;
        let mut source = File::open(local)?;
        io::copy(&mut source, &mut archive)?;
    }

    Ok(archive.finish()?)
}
