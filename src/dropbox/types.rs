use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropboxApiError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {summary}")]
    Api { status: u16, summary: String },

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Value of the `.tag` field on a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
    Deleted,
    #[serde(other)]
    Other,
}

/// Metadata of one entry returned by `files/list_folder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = ".tag")]
    pub kind: EntryKind,
    pub name: String,
    #[serde(default)]
    pub path_lower: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_display: Option<String>,
}

impl FileEntry {
    pub fn file(name: impl Into<String>, path_lower: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.into(),
            path_lower: path_lower.into(),
            path_display: None,
        }
    }

    pub fn folder(name: impl Into<String>, path_lower: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Folder,
            ..Self::file(name, path_lower)
        }
    }

    /// Browser link to the file: the link base followed by the lowercase path.
    pub fn web_link(&self, link_base: &str) -> String {
        format!("{}{}", link_base.trim_end_matches('/'), self.path_lower)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListFolderResponse {
    pub entries: Vec<FileEntry>,
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error_summary: Option<String>,
}
