//! One-shot `search` mode: runs a single search and prints each link as soon
//! as it is found.

use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::config::FinderConfig;
use crate::dropbox::{DropboxClient, StorageBackend};
use crate::finder::{
    BundleMode, BundleOutcome, Finder, SearchEvent, SearchOutcome, SearchReporter, SearchRequest,
};

pub struct SearchArgs {
    pub folder_url: String,
    pub keyword: String,
    pub bundle: Option<BundleMode>,
    pub json: bool,
}

/// Writes matches to `out` and problems to `err` as events arrive.
pub struct LineReporter<W: Write + Send> {
    out: Mutex<W>,
    echo_matches: bool,
}

impl<W: Write + Send> LineReporter<W> {
    pub fn new(out: W, echo_matches: bool) -> Self {
        Self {
            out: Mutex::new(out),
            echo_matches,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> SearchReporter for LineReporter<W> {
    fn report(&self, event: SearchEvent) {
        let line = match event {
            SearchEvent::Match(found) if self.echo_matches => {
                format!("📄 {}  {}  (page {})", found.name, found.link, found.page)
            }
            SearchEvent::ItemFailed(failure) => {
                eprintln!("Error: {}", failure.message);
                return;
            }
            SearchEvent::Notice(message) => {
                eprintln!("{}", message);
                return;
            }
            _ => return,
        };

        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn summary(outcome: &SearchOutcome) -> String {
    let mut lines = vec![format!(
        "{} of {} PDF files in {} matched.",
        outcome.matches.len(),
        outcome.candidates,
        outcome.folder
    )];

    match &outcome.bundle {
        BundleOutcome::Created { artifact } => lines.push(format!(
            "Saved {} ({}, {} bytes) to {}",
            artifact.file_name,
            artifact.mime_type,
            artifact.size_bytes,
            artifact.path.display()
        )),
        BundleOutcome::Failed { failure } => {
            lines.push(format!("Bundle was not created: {}", failure.message))
        }
        BundleOutcome::NotRequested | BundleOutcome::NothingToBundle { .. } => {}
    }

    if !outcome.failures.is_empty() {
        lines.push(format!("{} files were skipped.", outcome.failures.len()));
    }

    lines.join("\n")
}

pub async fn run_search(config: &FinderConfig, args: SearchArgs) -> Result<()> {
    let token = config.access_token.clone().unwrap_or_default();
    let request = SearchRequest::from_inputs(&args.folder_url, &token, &args.keyword, args.bundle)?;

    let client = DropboxClient::new(
        token.as_str(),
        config.endpoints.clone(),
        config.request_timeout,
    )?;
    let backend: Arc<dyn StorageBackend> = Arc::new(client);

    let outcome = search_with(backend, config, &request, args.json).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("\n{}", summary(&outcome));
    }

    if matches!(outcome.bundle, BundleOutcome::Failed { .. }) {
        return Err(anyhow!("bundle was not created"));
    }
    Ok(())
}

async fn search_with(
    backend: Arc<dyn StorageBackend>,
    config: &FinderConfig,
    request: &SearchRequest,
    json: bool,
) -> Result<SearchOutcome> {
    let reporter = LineReporter::new(std::io::stdout(), !json);
    Finder::new(backend, config)
        .run(request, &reporter)
        .await
        .map_err(|e| {
            error!("Search failed: {}", e);
            e.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::FailurePolicy;
    use crate::test_support::{pdf_with_pages, MemoryBackend};

    #[test]
    fn match_lines_are_written_as_they_arrive() {
        let reporter = LineReporter::new(Vec::new(), true);
        reporter.report(SearchEvent::Match(crate::finder::PdfMatch {
            name: "A.pdf".to_string(),
            path: "/docs/a.pdf".to_string(),
            link: "https://www.dropbox.com/home/docs/a.pdf".to_string(),
            page: 3,
        }));
        reporter.report(SearchEvent::Notice("ignored on stdout".to_string()));

        let written = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            written,
            "📄 A.pdf  https://www.dropbox.com/home/docs/a.pdf  (page 3)\n"
        );
    }

    #[test]
    fn json_mode_keeps_stdout_quiet() {
        let reporter = LineReporter::new(Vec::new(), false);
        reporter.report(SearchEvent::Match(crate::finder::PdfMatch {
            name: "A.pdf".to_string(),
            path: "/docs/a.pdf".to_string(),
            link: "l".to_string(),
            page: 1,
        }));
        assert!(reporter.into_inner().is_empty());
    }

    #[tokio::test]
    async fn summary_names_the_bundle_location() {
        let backend = MemoryBackend::new()
            .with_file("a.pdf", pdf_with_pages(&["needle"]))
            .with_file("b.pdf", pdf_with_pages(&["hay"]));
        let dir = tempfile::tempdir().unwrap();
        let config = FinderConfig {
            output_dir: dir.path().to_path_buf(),
            failure_policy: FailurePolicy::SkipAndContinue,
            ..FinderConfig::default()
        };
        let request =
            SearchRequest::from_inputs("/docs", "t", "needle", Some(BundleMode::Merge)).unwrap();

        let outcome = search_with(Arc::new(backend), &config, &request, true)
            .await
            .unwrap();
        let text = summary(&outcome);

        assert!(text.starts_with("1 of 2 PDF files in /docs matched."));
        assert!(text.contains("Saved merged_pdfs.pdf (application/pdf"));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let config = FinderConfig::default();
        let err = run_search(
            &config,
            SearchArgs {
                folder_url: "/docs".to_string(),
                keyword: "x".to_string(),
                bundle: None,
                json: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Please provide Dropbox folder URL, access token, and keyword."));
    }
}
