use thiserror::Error;

use crate::dropbox::DropboxApiError;

/// Every failure a search run can hit, tagged with the step it came from.
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Please provide Dropbox folder URL, access token, and keyword. Missing: {0}")]
    MissingInput(&'static str),

    #[error("Error accessing Dropbox folder '{path}': {source}")]
    FolderAccess {
        path: String,
        #[source]
        source: DropboxApiError,
    },

    #[error("Error downloading {path}: {source}")]
    Download {
        path: String,
        #[source]
        source: DropboxApiError,
    },

    #[error("File {path} is not a PDF document")]
    NotPdf { path: String },

    #[error("Error searching PDF {path}: {reason}")]
    Pdf { path: String, reason: String },

    #[error("Failed to build bundle: {0}")]
    Bundle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FinderError {
    /// Stable machine-readable code used in tool error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            FinderError::MissingInput(_) => "ERR_MISSING_INPUT",
            FinderError::FolderAccess { .. } => "ERR_FOLDER_ACCESS",
            FinderError::Download { .. } => "ERR_DOWNLOAD",
            FinderError::NotPdf { .. } => "ERR_NOT_PDF",
            FinderError::Pdf { .. } => "ERR_PDF_PARSE",
            FinderError::Bundle(_) => "ERR_BUNDLE",
            FinderError::Io(_) => "ERR_IO",
            FinderError::Task(_) => "ERR_TASK",
            FinderError::Config(_) => "ERR_CONFIG",
        }
    }

    /// Path of the file or folder the failure belongs to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            FinderError::FolderAccess { path, .. }
            | FinderError::Download { path, .. }
            | FinderError::NotPdf { path }
            | FinderError::Pdf { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for FinderError {
    fn from(err: tokio::task::JoinError) -> Self {
        FinderError::Task(err.to_string())
    }
}

impl From<zip::result::ZipError> for FinderError {
    fn from(err: zip::result::ZipError) -> Self {
        FinderError::Bundle(format!("zip: {}", err))
    }
}

impl From<lopdf::Error> for FinderError {
    fn from(err: lopdf::Error) -> Self {
        FinderError::Bundle(format!("pdf: {}", err))
    }
}
