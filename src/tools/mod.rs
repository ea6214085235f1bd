pub mod list_pdfs_tool;
pub mod pdf_search_tool;

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::error;

use crate::config::FinderConfig;
use crate::dropbox::{DropboxClient, StorageBackend};
use crate::error::FinderError;
use crate::mcp::types::CallToolResult;

/// Opens the storage backend a tool call works against, given the access
/// token resolved for that call.
pub type BackendFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn StorageBackend>, FinderError> + Send + Sync>;

/// State shared by every tool call: the resolved configuration and the way
/// to reach storage.
pub struct ToolContext {
    config: FinderConfig,
    connect: BackendFactory,
}

impl ToolContext {
    /// Tools reach Dropbox through the configured endpoints and timeout.
    pub fn new(config: FinderConfig) -> Self {
        let endpoints = config.endpoints.clone();
        let timeout = config.request_timeout;
        let connect: BackendFactory = Arc::new(
            move |token: &str| -> Result<Arc<dyn StorageBackend>, FinderError> {
                let client = DropboxClient::new(token, endpoints.clone(), timeout)?;
                Ok(Arc::new(client))
            },
        );
        Self::with_backend_factory(config, connect)
    }

    pub fn with_backend_factory(config: FinderConfig, connect: BackendFactory) -> Self {
        Self { config, connect }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Token from the call arguments, else the one the server started with.
    /// Blank tokens count as absent; an empty result fails the presence check.
    pub fn token(&self, supplied: Option<&str>) -> String {
        supplied
            .filter(|t| !t.trim().is_empty())
            .or(self.config.access_token.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    pub fn backend(&self, token: &str) -> Result<Arc<dyn StorageBackend>, FinderError> {
        (self.connect)(token)
    }
}

/// Decodes tool arguments, turning a missing or malformed object into the
/// error result the client sees.
pub fn parse_arguments<T: DeserializeOwned>(
    tool: &str,
    arguments: Option<serde_json::Value>,
) -> Result<T, CallToolResult> {
    match arguments {
        Some(args) => serde_json::from_value::<T>(args).map_err(|e| {
            error!("Invalid {} parameters: {}", tool, e);
            CallToolResult::error(format!("Invalid parameters: {}", e))
        }),
        None => Err(CallToolResult::error("Missing required parameters")),
    }
}
