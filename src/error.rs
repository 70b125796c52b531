use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to fetch {url} after {attempts} attempts: {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("cannot resolve link {href}: {message}")]
    InvalidUrl { href: String, message: String },

    #[error("unsafe or empty filename: {0:?}")]
    InvalidFilename(String),

    #[error("landing page {url} unavailable: {reason}")]
    LandingPageUnavailable { url: String, reason: String },

    #[error("no groups found at {0}")]
    NoGroupsFound(String),

    #[error("failed to read CSV {path}: {message}")]
    CsvRead { path: PathBuf, message: String },

    #[error("CSV {path} is missing required columns: {columns}")]
    CsvMissingColumns { path: PathBuf, columns: String },

    #[error("invalid CSV row at line {line}: {message}")]
    InvalidRow { line: u64, message: String },

    #[error("failed to save {filename}: {message}")]
    DownloadWrite { filename: String, message: String },

    #[error("failed to write metadata to {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    /// Errors that invalidate the whole input source rather than one unit of work.
    pub fn is_enumeration_failure(&self) -> bool {
        matches!(
            self,
            HarvestError::LandingPageUnavailable { .. }
                | HarvestError::NoGroupsFound(_)
                | HarvestError::CsvRead { .. }
                | HarvestError::CsvMissingColumns { .. }
        )
    }
}
