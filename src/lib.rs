//! Collectors feeding the campus robot: timetables, cafeteria menus, route
//! metadata and videos, plus synthetic telemetry and a weekly usage report.
//!
//! Every collector is the same pipeline: fetch a document, extract flat
//! records, normalize them into a [`record::Table`], persist an artifact.

pub mod artifact;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod settings;
pub mod sources;

pub use error::{ExtractionError, FetchError, SchemaMismatchError, StageError, WriteError};
pub use fetch::{CannedFetcher, Fetch, HttpFetcher, RawDocument, Request};
pub use pipeline::{Aggregate, FetchTarget, PipelineRunner, RunStats};
pub use record::{normalize, Record, Table};
