use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FinderError;
use crate::finder::FailurePolicy;

pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2";
pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
pub const DEFAULT_LINK_BASE: &str = "https://www.dropbox.com/home";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Endpoints of the Dropbox HTTP API. Overridable so tests can point the
/// client at a local mock server.
#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub api_base: String,
    pub content_base: String,
    pub link_base: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
            link_base: DEFAULT_LINK_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub endpoints: DropboxEndpoints,
    pub request_timeout: Duration,
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub output_dir: PathBuf,
    /// Token used when a request does not carry its own.
    pub access_token: Option<String>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            endpoints: DropboxEndpoints::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::SkipAndContinue,
            output_dir: PathBuf::from("."),
            access_token: None,
        }
    }
}

/// Values given on the command line; `None` falls through to the environment
/// and then to the built-in default.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub access_token: Option<String>,
    pub concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub fail_fast: bool,
}

impl FinderConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, FinderError> {
        Self::resolve_with(overrides, |key| env::var(key).ok())
    }

    fn resolve_with<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self, FinderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = FinderConfig::default();

        config.access_token = overrides
            .access_token
            .or_else(|| lookup("DROPBOX_ACCESS_TOKEN"))
            .filter(|t| !t.trim().is_empty());

        let concurrency = match overrides.concurrency {
            Some(n) => n,
            None => match lookup("DROPBOX_FINDER_CONCURRENCY") {
                Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                    FinderError::Config(format!(
                        "DROPBOX_FINDER_CONCURRENCY must be a positive integer ({}): {}",
                        raw, e
                    ))
                })?,
                None => DEFAULT_CONCURRENCY,
            },
        };
        if concurrency == 0 {
            return Err(FinderError::Config(
                "scan concurrency must be at least 1".to_string(),
            ));
        }
        config.concurrency = concurrency;

        if let Some(dir) = overrides
            .output_dir
            .or_else(|| lookup("DROPBOX_FINDER_OUTPUT_DIR").map(PathBuf::from))
        {
            config.output_dir = dir;
        }

        if let Some(secs) = overrides.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }

        if overrides.fail_fast {
            config.failure_policy = FailurePolicy::Abort;
        }

        Ok(config)
    }
}
