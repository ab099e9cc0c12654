//! Adapters turning a raw document into flat records.
//!
//! Each adapter knows one document layout. When upstream markup changes, only
//! the matching adapter needs replacing; the pipeline only sees
//! [`RecordExtractor`].

pub mod html_table;
pub mod json_list;

pub use html_table::{Alignment, HtmlTableExtractor};
pub use json_list::JsonListExtractor;

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;
use crate::fetch::{ContentKind, RawDocument};
use crate::record::Record;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\x{a0}]+").unwrap());

pub trait RecordExtractor {
    /// Document kind this adapter understands.
    fn kind(&self) -> ContentKind;

    fn extract(&self, doc: &RawDocument) -> Result<Vec<Record>, ExtractionError>;
}

/// Reject documents of the wrong kind before parsing them.
pub(crate) fn expect_kind(doc: &RawDocument, expected: ContentKind) -> Result<(), ExtractionError> {
    if doc.kind == expected {
        Ok(())
    } else {
        Err(ExtractionError::WrongKind {
            expected: expected.name(),
            found: doc.kind.name(),
        })
    }
}

/// Whitespace runs (including non-breaking spaces) collapsed to one space, trimmed.
pub fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}
