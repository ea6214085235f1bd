use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::bundler::{BundleArtifact, BundleMode, Bundler};
use super::lister::list_pdf_files;
use super::pool::ScanPool;
use super::scanner::scan_file;
use super::FailurePolicy;
use crate::config::FinderConfig;
use crate::dropbox::{FileEntry, FolderPath, StorageBackend};
use crate::error::FinderError;

/// One file whose text contains the keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfMatch {
    pub name: String,
    pub path: String,
    pub link: String,
    /// 1-based page of the first hit.
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Listing,
    Scan,
    Bundle,
}

/// A failure that was reported and stepped over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub path: String,
    pub code: &'static str,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, path: &str, err: &FinderError) -> Self {
        Self {
            stage,
            path: path.to_string(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Progress of a run, pushed to the presentation layer as it happens.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Listed { folder: FolderPath, candidates: usize },
    Match(PdfMatch),
    ItemFailed(ItemFailure),
    Notice(String),
}

pub trait SearchReporter: Send + Sync {
    fn report(&self, event: SearchEvent);
}

/// The validated inputs of one run.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub folder: FolderPath,
    pub keyword: String,
    pub bundle: Option<BundleMode>,
}

impl SearchRequest {
    /// Presence check on the three text inputs; formats are not validated.
    pub fn from_inputs(
        folder_url: &str,
        access_token: &str,
        keyword: &str,
        bundle: Option<BundleMode>,
    ) -> Result<Self, FinderError> {
        if folder_url.trim().is_empty() {
            return Err(FinderError::MissingInput("folder URL"));
        }
        if access_token.trim().is_empty() {
            return Err(FinderError::MissingInput("access token"));
        }
        if keyword.trim().is_empty() {
            return Err(FinderError::MissingInput("keyword"));
        }

        Ok(Self {
            folder: FolderPath::from_reference(folder_url),
            keyword: keyword.to_string(),
            bundle,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleOutcome {
    NotRequested,
    NothingToBundle { mode: BundleMode },
    Created { artifact: BundleArtifact },
    Failed { failure: ItemFailure },
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub run_id: Uuid,
    pub folder: String,
    pub candidates: usize,
    pub matches: Vec<PdfMatch>,
    pub failures: Vec<ItemFailure>,
    pub bundle: BundleOutcome,
}

impl SearchOutcome {
    #[cfg(test)]
    pub fn match_paths(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.path.as_str()).collect()
    }
}

/// Runs Lister, Scanner pool and Bundler against one storage backend.
pub struct Finder {
    backend: Arc<dyn StorageBackend>,
    concurrency: usize,
    policy: FailurePolicy,
    link_base: String,
    output_dir: PathBuf,
}

impl Finder {
    pub fn new(backend: Arc<dyn StorageBackend>, config: &FinderConfig) -> Self {
        Self {
            backend,
            concurrency: config.concurrency,
            policy: config.failure_policy,
            link_base: config.endpoints.link_base.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn list_pdfs(&self, folder: &FolderPath) -> Result<Vec<FileEntry>, FinderError> {
        list_pdf_files(self.backend.as_ref(), folder).await
    }

    pub async fn run(
        &self,
        request: &SearchRequest,
        reporter: &dyn SearchReporter,
    ) -> Result<SearchOutcome, FinderError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("search", run_id = %run_id, folder = %request.folder);
        self.run_inner(run_id, request, reporter).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        request: &SearchRequest,
        reporter: &dyn SearchReporter,
    ) -> Result<SearchOutcome, FinderError> {
        info!(
            "Searching {} for '{}' (concurrency {}, policy {:?})",
            request.folder, request.keyword, self.concurrency, self.policy
        );
        let mut failures = Vec::new();

        let candidates = match self.list_pdfs(&request.folder).await {
            Ok(candidates) => candidates,
            Err(err) => match self.policy {
                FailurePolicy::Abort => return Err(err),
                FailurePolicy::SkipAndContinue => {
                    warn!("Treating {} as empty: {}", request.folder, err);
                    let failure = ItemFailure::new(Stage::Listing, request.folder.as_str(), &err);
                    reporter.report(SearchEvent::ItemFailed(failure.clone()));
                    failures.push(failure);
                    Vec::new()
                }
            },
        };
        let candidate_count = candidates.len();
        reporter.report(SearchEvent::Listed {
            folder: request.folder.clone(),
            candidates: candidate_count,
        });

        let matches = self
            .scan_candidates(candidates, &request.keyword, reporter, &mut failures)
            .await?;

        let bundle = match request.bundle {
            None => BundleOutcome::NotRequested,
            Some(mode) if matches.is_empty() => {
                reporter.report(SearchEvent::Notice(mode.empty_message().to_string()));
                BundleOutcome::NothingToBundle { mode }
            }
            Some(mode) => {
                let paths: Vec<String> = matches.iter().map(|m| m.path.clone()).collect();
                let bundler = Bundler::new(self.backend.as_ref(), &self.output_dir, self.policy);
                match bundler.build(mode, &paths, reporter).await {
                    Ok(artifact) => {
                        failures.extend(artifact.skipped.iter().cloned());
                        BundleOutcome::Created { artifact }
                    }
                    Err(err) => match self.policy {
                        FailurePolicy::Abort => return Err(err),
                        FailurePolicy::SkipAndContinue => {
                            warn!("Bundle {} was not created: {}", mode.file_name(), err);
                            let failure = ItemFailure::new(Stage::Bundle, mode.file_name(), &err);
                            reporter.report(SearchEvent::ItemFailed(failure.clone()));
                            failures.push(failure.clone());
                            BundleOutcome::Failed { failure }
                        }
                    },
                }
            }
        };

        info!(
            "Search finished: {} of {} PDFs matched, {} failures",
            matches.len(),
            candidate_count,
            failures.len()
        );

        Ok(SearchOutcome {
            run_id,
            folder: request.folder.to_string(),
            candidates: candidate_count,
            matches,
            failures,
            bundle,
        })
    }

    async fn scan_candidates(
        &self,
        candidates: Vec<FileEntry>,
        keyword: &str,
        reporter: &dyn SearchReporter,
        failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<PdfMatch>, FinderError> {
        let pool = ScanPool::new(self.concurrency);
        let backend = self.backend.clone();
        debug!("Scanning {} candidates, {} at a time", candidates.len(), pool.limit());

        let results = pool.run_ordered(candidates, |entry: FileEntry| {
            let backend = backend.clone();
            let keyword = keyword.to_string();
            async move {
                let result = scan_file(backend.as_ref(), &entry.path_lower, &keyword).await;
                (entry, result)
            }
        });
        let mut results = pin!(results);

        let mut matches = Vec::new();
        while let Some((_, (entry, result))) = results.next().await {
            match result {
                Ok(Some(page)) => {
                    let found = PdfMatch {
                        link: entry.web_link(&self.link_base),
                        name: entry.name,
                        path: entry.path_lower,
                        page,
                    };
                    info!("Match: {} (page {})", found.path, page);
                    reporter.report(SearchEvent::Match(found.clone()));
                    matches.push(found);
                }
                Ok(None) => {}
                Err(err) => match self.policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::SkipAndContinue => {
                        warn!("Skipping {}: {}", entry.path_lower, err);
                        let failure = ItemFailure::new(Stage::Scan, &entry.path_lower, &err);
                        reporter.report(SearchEvent::ItemFailed(failure.clone()));
                        failures.push(failure);
                    }
                },
            }
        }

        Ok(matches)
    }
}
