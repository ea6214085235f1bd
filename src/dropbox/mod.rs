pub mod backend;
pub mod client;
pub mod folder_ref;
pub mod types;

pub use backend::StorageBackend;
pub use client::DropboxClient;
pub use folder_ref::FolderPath;
pub use types::{DropboxApiError, EntryKind, FileEntry};
