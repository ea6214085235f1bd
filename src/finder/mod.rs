//! The search pipeline: list a folder, scan each PDF for the keyword,
//! optionally bundle the matches.

pub mod bundler;
pub mod lister;
pub mod pipeline;
pub mod pool;
pub mod scanner;

use serde::Serialize;

pub use bundler::BundleMode;
pub use pipeline::{
    BundleOutcome, Finder, PdfMatch, SearchEvent, SearchOutcome, SearchReporter, SearchRequest,
};

/// What a run does when one step fails. Applies to the folder listing, to
/// every scanned file and to every file added to a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure and carry on without the item. A failed listing
    /// counts as an empty folder.
    SkipAndContinue,
    /// Stop the run with the first failure.
    Abort,
}
