//! Cafeteria menu: weekly dishes as columnar JSON plus the printable PDF plan.

use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};
use tracing::{info, warn};

use crate::artifact::ArtifactWriter;
use crate::error::ExtractionError;
use crate::extract::html_table::selector;
use crate::extract::{collapse_ws, expect_kind, RecordExtractor};
use crate::fetch::{ContentKind, Fetch, RawDocument, Request};
use crate::record::{normalize, Record};
use crate::settings::Settings;

pub const WEEKDAYS: [&str; 5] = ["Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag"];
const OFFERS_PER_DAY: usize = 2;
const PRINT_LINK: &str = "a[href$='/print']";
const DESCRIPTION_CELL: &str = "[class$='description']";

// allergen lists written inline instead of in <sup>, e.g. "(1,3,a1)"
static ALLERGEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((?:[0-9]{1,2}|[a-z][0-9]?)(?:\s*,\s*(?:[0-9]{1,2}|[a-z][0-9]?))*\)").unwrap());

/// Reads the menu blocks of the cafeteria page: one `<tbody>` per offer,
/// offers alternating per weekday. Yields `{day, offer1, offer2}` per weekday.
#[derive(Debug, Clone, Default)]
pub struct MenuExtractor;

impl MenuExtractor {
    fn dish(block: ElementRef) -> Result<String, ExtractionError> {
        let desc_sel = selector(DESCRIPTION_CELL)?;
        block
            .select(&desc_sel)
            .next()
            .map(text_without_sup)
            .ok_or_else(|| ExtractionError::MarkerMissing {
                marker: DESCRIPTION_CELL.to_string(),
            })
    }
}

/// Cell text minus `<sup>` allergen markers, whitespace collapsed.
fn text_without_sup(cell: ElementRef) -> String {
    let mut out = String::new();
    for node in cell.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_sup = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|e| e.name() == "sup");
        if !in_sup {
            out.push_str(text);
        }
    }
    collapse_ws(&ALLERGEN_RE.replace_all(&out, ""))
}

impl RecordExtractor for MenuExtractor {
    fn kind(&self) -> ContentKind {
        ContentKind::Html
    }

    fn extract(&self, doc: &RawDocument) -> Result<Vec<Record>, ExtractionError> {
        expect_kind(doc, ContentKind::Html)?;
        let tbody_sel = selector("tbody")?;
        let html = Html::parse_document(&doc.text());
        let blocks: Vec<ElementRef> = html.select(&tbody_sel).collect();

        let needed = WEEKDAYS.len() * OFFERS_PER_DAY;
        if blocks.len() < needed {
            warn!(found = blocks.len(), needed, "menu incomplete");
            return Err(ExtractionError::MarkerMissing {
                marker: format!("{needed} x tbody"),
            });
        }

        WEEKDAYS
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let first = Self::dish(blocks[i * OFFERS_PER_DAY])?;
                let second = Self::dish(blocks[i * OFFERS_PER_DAY + 1])?;
                Ok(Record::new()
                    .with("day", *day)
                    .with("offer1", first)
                    .with("offer2", second))
            })
            .collect()
    }
}

/// Absolute URL of the printable plan, if the page links one.
pub fn pdf_link(page: &str, page_url: &str) -> Result<Option<String>, ExtractionError> {
    let link_sel = selector(PRINT_LINK)?;
    let html = Html::parse_document(page);
    let href = html
        .select(&link_sel)
        .next()
        .and_then(|a| a.value().attr("href"));
    href.map(|h| absolutize(h, page_url)).transpose()
}

fn absolutize(href: &str, page_url: &str) -> Result<String, ExtractionError> {
    let bad = |url: &str, reason: String| ExtractionError::BadUrl {
        url: url.to_string(),
        reason,
    };
    let base = Url::parse(page_url).map_err(|e| bad(page_url, e.to_string()))?;
    let joined = base.join(href).map_err(|e| bad(href, e.to_string()))?;
    Ok(joined.to_string())
}

pub fn run(settings: &Settings, fetcher: &dyn Fetch, skip_pdf: bool) -> Result<()> {
    let cfg = &settings.mensa;
    let writer = ArtifactWriter::json(&settings.output.dir);

    // one page, one artifact: every failure is fatal
    let page = fetcher
        .fetch(&Request::get(&cfg.page_url, ContentKind::Html))
        .context("Failed to fetch cafeteria page")?;
    let records = match MenuExtractor.extract(&page) {
        Err(ExtractionError::MarkerMissing { .. }) => bail!("Cafeteria page has no menu this week"),
        other => other?,
    };
    let table = normalize(&records)?;
    let path = writer.path_for(&cfg.menu_name);
    writer.write_table(&table, &path)?;
    println!("Menu saved to {}", path.display());

    if skip_pdf {
        return Ok(());
    }

    let Some(url) = pdf_link(&page.text(), &cfg.page_url)? else {
        warn!("No printable plan linked");
        return Ok(());
    };
    info!(%url, "Downloading plan");
    let pdf = fetcher
        .fetch(&Request::get(&url, ContentKind::Binary))
        .context("Failed to download plan")?;
    let pdf_path = writer.dir().join(&cfg.pdf_name);
    writer.write_bytes(&pdf.body, &pdf_path)?;
    println!("Plan saved to {}", pdf_path.display());
    Ok(())
}
