use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use tracing::{error, info};

use super::{parse_arguments, ToolContext};
use crate::dropbox::FolderPath;
use crate::error::FinderError;
use crate::finder::Finder;
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::error_payload::finder_error_payload;

pub const TOOL_NAME: &str = "list-folder-pdfs";

pub static LIST_PDFS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: TOOL_NAME.to_string(),
    description: "List the PDF files directly inside a Dropbox folder, with a link to each."
        .to_string(),
    input_schema: json!({
        "type": "object",
        "properties": {
            "folderUrl": {
                "type": "string",
                "description": "Dropbox folder URL (https://www.dropbox.com/home/...) or folder path"
            },
            "accessToken": {
                "type": "string",
                "description": "Dropbox access token (optional when the server has one configured)"
            }
        },
        "required": ["folderUrl"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("List Folder PDFs".to_string()),
        read_only_hint: Some(true),
        open_world_hint: Some(true),
    }),
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPdfsParams {
    #[serde(default)]
    folder_url: String,
    access_token: Option<String>,
}

pub struct ListPdfsTool<'a> {
    context: &'a ToolContext,
}

impl<'a> ListPdfsTool<'a> {
    pub fn new(context: &'a ToolContext) -> Self {
        Self { context }
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params: ListPdfsParams = match parse_arguments(TOOL_NAME, arguments) {
            Ok(params) => params,
            Err(result) => return result,
        };

        let token = self.context.token(params.access_token.as_deref());
        if params.folder_url.trim().is_empty() {
            return CallToolResult::error(finder_error_payload(&FinderError::MissingInput(
                "folder URL",
            )));
        }
        if token.trim().is_empty() {
            return CallToolResult::error(finder_error_payload(&FinderError::MissingInput(
                "access token",
            )));
        }

        let folder = FolderPath::from_reference(&params.folder_url);
        let backend = match self.context.backend(&token) {
            Ok(backend) => backend,
            Err(e) => return CallToolResult::error(finder_error_payload(&e)),
        };
        let finder = Finder::new(backend, self.context.config());
        let link_base = &self.context.config().endpoints.link_base;

        info!("Listing PDFs in {}", folder);

        match finder.list_pdfs(&folder).await {
            Ok(entries) => {
                let mut out = String::new();
                let _ = writeln!(out, "## {} PDF files in {}\n", entries.len(), folder);
                for entry in &entries {
                    let _ = writeln!(out, "- [📄 {}]({})", entry.name, entry.web_link(link_base));
                }
                CallToolResult::success(out.trim_end())
            }
            Err(e) => {
                error!("Listing {} failed: {}", folder, e);
                CallToolResult::error(finder_error_payload(&e))
            }
        }
    }
}
