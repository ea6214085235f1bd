use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::transport::StdioTransport;
use super::types::*;
use crate::tools::{
    list_pdfs_tool::{ListPdfsTool, LIST_PDFS_TOOL_DEFINITION},
    pdf_search_tool::{NotificationReporter, PdfSearchTool, PDF_SEARCH_TOOL_DEFINITION},
    ToolContext,
};

pub struct McpServer {
    transport: StdioTransport,
    context: ToolContext,
    initialized: bool,
}

impl McpServer {
    pub fn new(context: ToolContext) -> Self {
        Self {
            transport: StdioTransport::new(),
            context,
            initialized: false,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("MCP server started and listening on stdio");

        loop {
            match self.transport.read_message().await? {
                Some(McpMessage::Request(request)) => {
                    let response = self.handle_request(request).await;
                    self.transport.write_response(response).await?;
                }
                Some(McpMessage::Notification(notification)) => {
                    self.handle_notification(notification);
                }
                None => {
                    info!("Client disconnected");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_request(&mut self, request: McpRequest) -> McpResponse {
        let id = Self::ensure_valid_id(request.id.clone());

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "ping" => McpResponse::success(id, serde_json::json!({})),
            _ => McpResponse::failure(id, METHOD_NOT_FOUND, "Method not found"),
        }
    }

    fn handle_notification(&mut self, notification: McpNotification) {
        debug!("Received notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialization completed");
                self.initialized = true;
            }
            "notifications/cancelled" => {
                debug!("Request cancelled notification received");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    fn ensure_valid_id(id: Option<serde_json::Value>) -> serde_json::Value {
        match id {
            Some(serde_json::Value::Null) | None => serde_json::Value::String("0".to_string()),
            Some(value) => value,
        }
    }

    fn handle_initialize(
        &self,
        id: serde_json::Value,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };

        match serde_json::from_value::<InitializeParams>(params) {
            Ok(init) => {
                debug!(
                    "Client {} {} (protocol {})",
                    init.client_info.name, init.client_info.version, init.protocol_version
                );
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_info: ServerInfo {
                        name: "Dropbox PDF Keyword Finder".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        description: Some(
                            "Finds the PDFs in a Dropbox folder that contain a keyword".to_string(),
                        ),
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                        logging: Some(serde_json::json!({})),
                    },
                };
                McpResponse::success(id, result)
            }
            Err(e) => McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    fn handle_list_tools(&self, id: serde_json::Value) -> McpResponse {
        let result = ListToolsResult {
            tools: vec![
                PDF_SEARCH_TOOL_DEFINITION.clone(),
                LIST_PDFS_TOOL_DEFINITION.clone(),
            ],
        };
        McpResponse::success(id, result)
    }

    /// Runs the tool while relaying its progress notifications to the client,
    /// so matches show up before the call returns.
    async fn handle_call_tool(
        &mut self,
        id: serde_json::Value,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };
        let call_params = match serde_json::from_value::<CallToolParams>(params) {
            Ok(call_params) => call_params,
            Err(e) => {
                return McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
        };

        if !self.initialized {
            debug!("tools/call arrived before notifications/initialized");
        }

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let context = &self.context;
        let transport = &mut self.transport;

        let call = Self::execute_tool(context, call_params, sender);
        tokio::pin!(call);

        let result = loop {
            tokio::select! {
                result = &mut call => break result,
                Some(notification) = receiver.recv() => {
                    if let Err(e) = transport.write_notification(notification).await {
                        warn!("Failed to send progress notification: {}", e);
                    }
                }
            }
        };

        while let Ok(notification) = receiver.try_recv() {
            if let Err(e) = transport.write_notification(notification).await {
                warn!("Failed to send progress notification: {}", e);
            }
        }

        McpResponse::success(id, result)
    }

    async fn execute_tool(
        context: &ToolContext,
        params: CallToolParams,
        notifications: mpsc::UnboundedSender<McpNotification>,
    ) -> CallToolResult {
        match params.name.as_str() {
            "pdf-keyword-search" => {
                let reporter = NotificationReporter::new(notifications);
                let tool = PdfSearchTool::new(context);
                tool.execute(params.arguments, &reporter).await
            }
            "list-folder-pdfs" => {
                let tool = ListPdfsTool::new(context);
                tool.execute(params.arguments).await
            }
            _ => CallToolResult::error(format!("Tool not found: {}", params.name)),
        }
    }
}
