use std::path::PathBuf;

use thiserror::Error;

/// A single outbound request failed: transport trouble or a non-2xx answer.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The raw document did not have the structure an extractor expects.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no element matches `{marker}`")]
    MarkerMissing { marker: String },
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
    #[error("row {row} has {found} cells, header has {expected}")]
    ColumnMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("header names column `{name}` twice")]
    DuplicateHeader { name: String },
    #[error("expected a {expected} document, got {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {expected} at `{path}`")]
    UnexpectedShape { path: String, expected: &'static str },
    #[error("field `{field}` missing from record {row}")]
    MissingField { row: usize, field: String },
    #[error("cannot resolve link `{url}`: {reason}")]
    BadUrl { url: String, reason: String },
}

/// Records of one batch disagree on their field-name sets.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {row} has fields {found:?}, expected {expected:?}")]
pub struct SchemaMismatchError {
    pub row: usize,
    pub expected: Vec<String>,
    pub found: Vec<String>,
}

/// An artifact could not be persisted.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write delimited file {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("cannot serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("delimiter {0:?} is not a single ASCII character")]
    Delimiter(char),
}

/// Everything that can go wrong while processing one target of a batch.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error(transparent)]
    Schema(#[from] SchemaMismatchError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("{0}")]
    Invalid(String),
}

/// The telemetry backend refused a call or answered with something unusable.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no API key configured (set PEPPER_BACKEND__API_KEY)")]
    MissingApiKey,
    #[error("backend answered with non-JSON body: {body}")]
    NotJson { body: String },
    #[error("expected {expected} from backend, got {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: String,
    },
}
