use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use super::{parse_arguments, ToolContext};
use crate::finder::{
    BundleMode, BundleOutcome, Finder, PdfMatch, SearchEvent, SearchOutcome, SearchReporter,
    SearchRequest,
};
use crate::mcp::types::{CallToolResult, LogLevel, McpNotification, ToolAnnotations, ToolDefinition};
use crate::utils::error_payload::finder_error_payload;

pub const TOOL_NAME: &str = "pdf-keyword-search";

pub static PDF_SEARCH_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: TOOL_NAME.to_string(),
    description: "Search every PDF in a Dropbox folder for a keyword (case-insensitive) and \
        return a link to each matching file. Matches are streamed as log notifications while \
        the search runs. Optionally bundles the matches into one merged PDF or a ZIP archive."
        .to_string(),
    input_schema: json!({
        "type": "object",
        "properties": {
            "folderUrl": {
                "type": "string",
                "description": "Dropbox folder URL (https://www.dropbox.com/home/...) or folder path"
            },
            "keyword": {
                "type": "string",
                "description": "Text to look for; matched case-insensitively"
            },
            "accessToken": {
                "type": "string",
                "description": "Dropbox access token (optional when the server has one configured)"
            },
            "bundle": {
                "type": "string",
                "enum": ["none", "merge", "zip"],
                "description": "Bundle the matching PDFs: merge into merged_pdfs.pdf or archive into filtered_pdfs.zip (default: none)",
                "default": "none"
            },
            "concurrency": {
                "type": "integer",
                "minimum": 1,
                "description": "How many PDFs to scan at the same time"
            }
        },
        "required": ["folderUrl", "keyword"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("PDF Keyword Search".to_string()),
        read_only_hint: Some(false),
        open_world_hint: Some(true),
    }),
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PdfSearchParams {
    #[serde(default)]
    folder_url: String,
    #[serde(default)]
    keyword: String,
    access_token: Option<String>,
    bundle: Option<String>,
    concurrency: Option<usize>,
}

/// Forwards search progress to the client as `notifications/message`.
pub struct NotificationReporter {
    sender: UnboundedSender<McpNotification>,
}

impl NotificationReporter {
    pub fn new(sender: UnboundedSender<McpNotification>) -> Self {
        Self { sender }
    }
}

impl SearchReporter for NotificationReporter {
    fn report(&self, event: SearchEvent) {
        let (level, data) = describe_event(&event);
        // The receiver is gone once the call has been answered.
        let _ = self
            .sender
            .send(McpNotification::log_message(level, TOOL_NAME, data));
    }
}

fn describe_event(event: &SearchEvent) -> (LogLevel, Value) {
    match event {
        SearchEvent::Listed { folder, candidates } => (
            LogLevel::Info,
            json!({
                "event": "listed",
                "folder": folder.to_string(),
                "candidates": candidates,
                "text": format!("Found {} PDF files in {}", candidates, folder),
            }),
        ),
        SearchEvent::Match(found) => (
            LogLevel::Notice,
            json!({
                "event": "match",
                "name": found.name,
                "link": found.link,
                "page": found.page,
                "text": match_line(found),
            }),
        ),
        SearchEvent::ItemFailed(failure) => (
            LogLevel::Warning,
            json!({
                "event": "failure",
                "stage": failure.stage,
                "path": failure.path,
                "code": failure.code,
                "text": failure.message,
            }),
        ),
        SearchEvent::Notice(message) => (
            LogLevel::Info,
            json!({ "event": "notice", "text": message }),
        ),
    }
}

fn match_line(found: &PdfMatch) -> String {
    format!("[📄 {}]({})", found.name, found.link)
}

fn parse_bundle(raw: Option<&str>) -> Result<Option<BundleMode>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(mode) if mode.eq_ignore_ascii_case("none") => Ok(None),
        Some(mode) => mode.parse::<BundleMode>().map(Some),
    }
}

/// Markdown answer for a finished run.
pub fn render_outcome(outcome: &SearchOutcome, keyword: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "## PDFs containing \"{}\" in {}\n",
        keyword, outcome.folder
    );
    let _ = writeln!(
        out,
        "Scanned {} PDF files, {} matched.\n",
        outcome.candidates,
        outcome.matches.len()
    );

    for found in &outcome.matches {
        let _ = writeln!(out, "- {} (page {})", match_line(found), found.page);
    }

    match &outcome.bundle {
        BundleOutcome::NotRequested => {}
        BundleOutcome::NothingToBundle { mode } => {
            let _ = writeln!(out, "\n{}", mode.empty_message());
        }
        BundleOutcome::Created { artifact } => {
            let _ = writeln!(out, "\n### Download\n");
            let _ = writeln!(
                out,
                "**{}** ({}, {} bytes{})",
                artifact.file_name,
                artifact.mime_type,
                artifact.size_bytes,
                artifact
                    .page_count
                    .map(|n| format!(", {} pages", n))
                    .unwrap_or_default()
            );
            let _ = writeln!(out, "\nSaved to `{}`", artifact.path.display());
        }
        BundleOutcome::Failed { failure } => {
            let _ = writeln!(out, "\nBundle was not created: {}", failure.message);
        }
    }

    if !outcome.failures.is_empty() {
        let _ = writeln!(out, "\n### Skipped\n");
        for failure in &outcome.failures {
            let _ = writeln!(out, "- `{}`: {}", failure.path, failure.message);
        }
    }

    out.trim_end().to_string()
}

pub struct PdfSearchTool<'a> {
    context: &'a ToolContext,
}

impl<'a> PdfSearchTool<'a> {
    pub fn new(context: &'a ToolContext) -> Self {
        Self { context }
    }

    pub async fn execute(
        &self,
        arguments: Option<Value>,
        reporter: &dyn SearchReporter,
    ) -> CallToolResult {
        let params: PdfSearchParams = match parse_arguments(TOOL_NAME, arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let bundle = match parse_bundle(params.bundle.as_deref()) {
            Ok(bundle) => bundle,
            Err(e) => return CallToolResult::error(format!("Invalid parameters: {}", e)),
        };
        if params.concurrency == Some(0) {
            return CallToolResult::error("Invalid parameters: concurrency must be at least 1");
        }

        let token = self.context.token(params.access_token.as_deref());
        let request =
            match SearchRequest::from_inputs(&params.folder_url, &token, &params.keyword, bundle) {
                Ok(request) => request,
                Err(e) => return CallToolResult::error(finder_error_payload(&e)),
            };

        let backend = match self.context.backend(&token) {
            Ok(backend) => backend,
            Err(e) => return CallToolResult::error(finder_error_payload(&e)),
        };
        let mut finder = Finder::new(backend, self.context.config());
        if let Some(concurrency) = params.concurrency {
            finder = finder.with_concurrency(concurrency);
        }

        info!(
            "PDF keyword search in {} (bundle: {:?})",
            request.folder, request.bundle
        );

        match finder.run(&request, reporter).await {
            Ok(outcome) => CallToolResult::success(render_outcome(&outcome, &request.keyword)),
            Err(e) => {
                error!("PDF keyword search failed: {}", e);
                CallToolResult::error(finder_error_payload(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinderConfig;
    use crate::finder::FailurePolicy;
    use crate::test_support::{pdf_with_pages, serve_from, MemoryBackend, SilentReporter};
    use tokio::sync::mpsc;

    fn context(backend: MemoryBackend, dir: &std::path::Path) -> ToolContext {
        let config = FinderConfig {
            output_dir: dir.to_path_buf(),
            access_token: Some("configured".to_string()),
            ..FinderConfig::default()
        };
        ToolContext::with_backend_factory(config, serve_from(backend))
    }

    #[test]
    fn bundle_argument_parsing() {
        assert_eq!(parse_bundle(None), Ok(None));
        assert_eq!(parse_bundle(Some("none")), Ok(None));
        assert_eq!(parse_bundle(Some(" ")), Ok(None));
        assert_eq!(parse_bundle(Some("ZIP")), Ok(Some(BundleMode::Zip)));
        assert!(parse_bundle(Some("tarball")).is_err());
    }

    #[tokio::test]
    async fn blank_keyword_fails_the_presence_check() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(MemoryBackend::new(), dir.path());
        let tool = PdfSearchTool::new(&ctx);

        let result = tool
            .execute(
                Some(json!({ "folderUrl": "/docs", "keyword": "  " })),
                &SilentReporter,
            )
            .await;

        assert_eq!(result.is_error, Some(true));
        assert!(result
            .text()
            .starts_with("Please provide Dropbox folder URL, access token, and keyword."));
        assert!(result.text().contains("ERR_MISSING_INPUT"));
    }

    #[tokio::test]
    async fn rejects_unknown_bundle_mode() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(MemoryBackend::new(), dir.path());
        let result = PdfSearchTool::new(&ctx)
            .execute(
                Some(json!({ "folderUrl": "/docs", "keyword": "x", "bundle": "rar" })),
                &SilentReporter,
            )
            .await;
        assert!(result.text().contains("unknown bundle mode"));
    }

    #[tokio::test]
    async fn streams_matches_and_lists_links() {
        let backend = MemoryBackend::new()
            .with_file("Report.pdf", pdf_with_pages(&["intro", "The Budget for 2024"]))
            .with_file("notes.pdf", pdf_with_pages(&["nothing here"]));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(backend, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = NotificationReporter::new(tx);

        let result = PdfSearchTool::new(&ctx)
            .execute(
                Some(json!({
                    "folderUrl": "https://www.dropbox.com/home/docs",
                    "keyword": "budget"
                })),
                &reporter,
            )
            .await;

        assert_eq!(result.is_error, None);
        let text = result.text();
        assert!(text.contains("[📄 Report.pdf](https://www.dropbox.com/home/docs/report.pdf) (page 2)"));
        assert!(!text.contains("notes.pdf"));

        let mut events = Vec::new();
        while let Ok(note) = rx.try_recv() {
            events.push(note.params.unwrap()["data"]["event"].as_str().unwrap().to_string());
        }
        assert_eq!(events, vec!["listed", "match"]);
    }

    #[tokio::test]
    async fn zip_bundle_is_reported_with_its_location() {
        let backend = MemoryBackend::new().with_file("a.pdf", pdf_with_pages(&["needle"]));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(backend, dir.path());

        let result = PdfSearchTool::new(&ctx)
            .execute(
                Some(json!({ "folderUrl": "/docs", "keyword": "NEEDLE", "bundle": "zip" })),
                &SilentReporter,
            )
            .await;

        let text = result.text();
        assert!(text.contains("**filtered_pdfs.zip** (application/zip"));
        assert!(dir.path().join("filtered_pdfs.zip").exists());
    }

    #[tokio::test]
    async fn merge_with_no_matches_says_so() {
        let backend = MemoryBackend::new().with_file("a.pdf", pdf_with_pages(&["hay"]));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(backend, dir.path());

        let result = PdfSearchTool::new(&ctx)
            .execute(
                Some(json!({ "folderUrl": "/docs", "keyword": "needle", "bundle": "merge" })),
                &SilentReporter,
            )
            .await;

        assert!(result.text().contains("No matching PDFs found to merge."));
        assert!(!dir.path().join("merged_pdfs.pdf").exists());
    }

    #[tokio::test]
    async fn abort_policy_turns_a_failure_into_an_error_result() {
        let backend = MemoryBackend::new()
            .with_broken_file("gone.pdf")
            .with_file("a.pdf", pdf_with_pages(&["needle"]));
        let dir = tempfile::tempdir().unwrap();
        let config = FinderConfig {
            output_dir: dir.path().to_path_buf(),
            failure_policy: FailurePolicy::Abort,
            ..FinderConfig::default()
        };
        let ctx = ToolContext::with_backend_factory(config, serve_from(backend));

        let result = PdfSearchTool::new(&ctx)
            .execute(
                Some(json!({ "folderUrl": "/docs", "keyword": "needle", "accessToken": "t" })),
                &SilentReporter,
            )
            .await;

        assert_eq!(result.is_error, Some(true));
        assert!(result.text().contains("ERR_DOWNLOAD"));
    }
}
