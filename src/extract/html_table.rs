use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use super::{collapse_ws, expect_kind, RecordExtractor};
use crate::error::ExtractionError;
use crate::fetch::{ContentKind, RawDocument};
use crate::record::Record;

/// What to do with a data row whose cell count differs from the header's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Fail with [`ExtractionError::ColumnMismatch`].
    #[default]
    Strict,
    /// Pad short rows with empty strings and drop surplus cells.
    Lenient,
}

/// First table matching `marker`; first row is the header, every further row one record.
#[derive(Debug, Clone)]
pub struct HtmlTableExtractor {
    marker: String,
    alignment: Alignment,
}

impl HtmlTableExtractor {
    pub fn new(marker: impl Into<String>) -> Self {
        HtmlTableExtractor {
            marker: marker.into(),
            alignment: Alignment::Strict,
        }
    }

    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    fn cells(row: &ElementRef, cell_sel: &Selector) -> Vec<String> {
        row.select(cell_sel)
            .map(|cell| collapse_ws(&cell.text().collect::<String>()))
            .collect()
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

impl RecordExtractor for HtmlTableExtractor {
    fn kind(&self) -> ContentKind {
        ContentKind::Html
    }

    fn extract(&self, doc: &RawDocument) -> Result<Vec<Record>, ExtractionError> {
        expect_kind(doc, ContentKind::Html)?;
        let table_sel = selector(&self.marker)?;
        let row_sel = selector("tr")?;
        let cell_sel = selector("td, th")?;

        let html = Html::parse_document(&doc.text());
        let table = html
            .select(&table_sel)
            .next()
            .ok_or_else(|| ExtractionError::MarkerMissing {
                marker: self.marker.clone(),
            })?;

        let mut rows = table
            .select(&row_sel)
            .map(|row| Self::cells(&row, &cell_sel))
            // spacer rows carry no cells at all
            .filter(|cells| !cells.is_empty());

        let Some(header) = rows.next() else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        for name in &header {
            if !seen.insert(name.as_str()) {
                return Err(ExtractionError::DuplicateHeader { name: name.clone() });
            }
        }

        let mut records: Vec<Record> = Vec::new();
        for (i, mut cells) in rows.enumerate() {
            if cells.len() != header.len() {
                match self.alignment {
                    Alignment::Strict => {
                        return Err(ExtractionError::ColumnMismatch {
                            row: i + 1,
                            expected: header.len(),
                            found: cells.len(),
                        })
                    }
                    Alignment::Lenient => cells.resize(header.len(), String::new()),
                }
            }
            records.push(header.iter().cloned().zip(cells).collect());
        }
        Ok(records)
    }
}
