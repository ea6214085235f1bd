use async_trait::async_trait;

use super::types::FileEntry;
use crate::error::FinderError;

/// The two storage calls the finder needs. Implemented by the Dropbox HTTP
/// client and by an in-memory store in tests.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Every entry of the folder, in listing order. Errors are
    /// `FinderError::FolderAccess`.
    async fn list_folder(&self, path: &str) -> Result<Vec<FileEntry>, FinderError>;

    /// Raw bytes of one file. Errors are `FinderError::Download`.
    async fn download(&self, path: &str) -> Result<Vec<u8>, FinderError>;
}
