use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::StorageBackend;
use super::types::{ApiErrorBody, DropboxApiError, FileEntry, ListFolderResponse};
use crate::config::DropboxEndpoints;
use crate::error::FinderError;

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Dropbox HTTP API client authenticated with a bearer access token.
pub struct DropboxClient {
    client: Client,
    token: String,
    endpoints: DropboxEndpoints,
}

impl DropboxClient {
    pub fn new(
        token: impl Into<String>,
        endpoints: DropboxEndpoints,
        timeout: Duration,
    ) -> Result<Self, FinderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FinderError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: token.into(),
            endpoints,
        })
    }

    async fn rpc<B, R>(&self, route: &str, body: &B) -> Result<R, DropboxApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoints.api_base.trim_end_matches('/'), route);
        debug!("Dropbox RPC call: {}", route);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        let response = check_status(route, response).await?;

        let text = response.text().await?;
        Ok(serde_json::from_str::<R>(&text)?)
    }

    /// Lists a folder, following `has_more` cursors until the listing is complete.
    pub async fn list_folder_entries(&self, path: &str) -> Result<Vec<FileEntry>, DropboxApiError> {
        let mut page: ListFolderResponse = self
            .rpc("files/list_folder", &json!({ "path": path }))
            .await?;
        let mut entries = std::mem::take(&mut page.entries);

        while page.has_more {
            debug!(
                "Folder listing for '{}' continues ({} entries so far)",
                path,
                entries.len()
            );
            page = self
                .rpc("files/list_folder/continue", &json!({ "cursor": page.cursor }))
                .await?;
            entries.append(&mut page.entries);
        }

        Ok(entries)
    }

    pub async fn download_bytes(&self, path: &str) -> Result<Vec<u8>, DropboxApiError> {
        let url = format!(
            "{}/files/download",
            self.endpoints.content_base.trim_end_matches('/')
        );
        debug!("Dropbox download: {}", path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(API_ARG_HEADER, header_safe_json(&json!({ "path": path })))
            .send()
            .await?;
        let response = check_status("files/download", response).await?;

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl StorageBackend for DropboxClient {
    async fn list_folder(&self, path: &str) -> Result<Vec<FileEntry>, FinderError> {
        self.list_folder_entries(path)
            .await
            .map_err(|source| FinderError::FolderAccess {
                path: path.to_string(),
                source,
            })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FinderError> {
        self.download_bytes(path)
            .await
            .map_err(|source| FinderError::Download {
                path: path.to_string(),
                source,
            })
    }
}

async fn check_status(route: &str, response: Response) -> Result<Response, DropboxApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.error_summary)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });

    warn!("Dropbox {} failed with HTTP {}: {}", route, status.as_u16(), summary);
    Err(DropboxApiError::Api {
        status: status.as_u16(),
        summary,
    })
}

/// Serializes JSON for an HTTP header. Dropbox rejects raw non-ASCII bytes in
/// `Dropbox-API-Arg`, so everything outside printable ASCII becomes `\uXXXX`.
pub fn header_safe_json(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    let mut units = [0u16; 2];

    for ch in raw.chars() {
        if ch.is_ascii() && ch != '\u{7f}' {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }

    out
}
