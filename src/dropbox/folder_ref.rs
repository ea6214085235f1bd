use std::fmt;
use url::Url;

/// Folder path in the form the Dropbox API expects: `""` for the root,
/// otherwise a `/`-rooted path (or an `id:` / `ns:` reference).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPath(String);

impl FolderPath {
    /// Normalizes a user-supplied folder reference. Accepts browser URLs
    /// (`/home/...` and `/sh/...` forms) as well as plain paths. There is no
    /// validation: a wrong reference yields a wrong path, which the backend
    /// then rejects.
    pub fn from_reference(input: &str) -> Self {
        let input = input.trim();

        if input.starts_with("id:") || input.starts_with("ns:") {
            return FolderPath(input.to_string());
        }

        let raw_path = match Url::parse(input) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => input.split(['?', '#']).next().unwrap_or("").to_string(),
        };

        let decoded = urlencoding::decode(&raw_path)
            .map(|p| p.into_owned())
            .unwrap_or(raw_path);

        let stripped = if let Some(rest) = decoded.strip_prefix("/sh/") {
            rest
        } else {
            match decoded.strip_prefix("/home") {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
                _ => decoded.as_str(),
            }
        };

        let trimmed = stripped.trim_end_matches('/');
        if trimmed.is_empty() {
            FolderPath(String::new())
        } else if trimmed.starts_with('/') {
            FolderPath(trimmed.to_string())
        } else {
            FolderPath(format!("/{}", trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}
