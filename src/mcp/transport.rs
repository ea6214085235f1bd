use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error};

use super::types::{McpMessage, McpNotification, McpRequest, McpResponse};

/// Newline-delimited JSON-RPC over stdin/stdout.
pub struct StdioTransport {
    reader: FramedRead<BufReader<tokio::io::Stdin>, LinesCodec>,
    writer: FramedWrite<tokio::io::Stdout, LinesCodec>,
}

impl StdioTransport {
    pub fn new() -> Self {
        let reader = FramedRead::new(BufReader::new(tokio::io::stdin()), LinesCodec::new());
        let writer = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());

        Self { reader, writer }
    }

    /// Next message from the client; `None` once stdin is closed. Blank
    /// lines are skipped.
    pub async fn read_message(&mut self) -> Result<Option<McpMessage>> {
        loop {
            match self.reader.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("Received: {}", line);
                    return parse_message(&line).map(Some);
                }
                Some(Err(e)) => {
                    error!("Error reading from stdin: {}", e);
                    return Err(anyhow!("Transport error: {}", e));
                }
                None => {
                    debug!("EOF reached");
                    return Ok(None);
                }
            }
        }
    }

    pub async fn write_response(&mut self, response: McpResponse) -> Result<()> {
        self.write_json(&response).await
    }

    pub async fn write_notification(&mut self, notification: McpNotification) -> Result<()> {
        self.write_json(&notification).await
    }

    async fn write_json<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        debug!("Sending: {}", json);
        self.writer.send(json).await?;
        Ok(())
    }
}

/// Classifies one JSON-RPC line: objects with an `id` are requests, the rest
/// are notifications.
pub fn parse_message(line: &str) -> Result<McpMessage> {
    let value = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
        error!("Failed to parse JSON: {}", e);
        anyhow!("Invalid JSON: {}", e)
    })?;

    let is_request = match value.as_object() {
        Some(obj) => obj.contains_key("id"),
        None => {
            error!("Invalid JSON-RPC message structure");
            return Err(anyhow!("Invalid JSON-RPC message structure"));
        }
    };

    if is_request {
        serde_json::from_value::<McpRequest>(value)
            .map(McpMessage::Request)
            .map_err(|e| anyhow!("Invalid JSON-RPC request: {}", e))
    } else {
        serde_json::from_value::<McpNotification>(value)
            .map(McpMessage::Notification)
            .map_err(|e| anyhow!("Invalid JSON-RPC notification: {}", e))
    }
}
