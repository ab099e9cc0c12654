//! Weekly usage report: summary tables over the last days of telemetry,
//! written as delimited files next to each other.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::artifact::ArtifactWriter;
use crate::error::{ExtractionError, StageError};
use crate::extract::JsonListExtractor;
use crate::record::{normalize, Record, Table};
use crate::settings::Settings;
use crate::sources::backend::BackendClient;

pub const NOT_UNDERSTOOD_TABLE: &str = "pepper_did_not_understand_table";
pub const EMOTION_TABLE: &str = "pepper_emotion_table";
pub const USE_CASE_TABLE: &str = "pepper_use_case_table";

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// `weekly_report_2022-01-04_-_2022-01-11`
pub fn report_dir_name(end: NaiveDate, days: u32) -> String {
    let start = end - Duration::days(i64::from(days));
    format!(
        "weekly_report_{}_-_{}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

pub fn fetch_rows(client: &BackendClient<'_>, table: &str, days: u32) -> Result<Table> {
    let rows = client
        .sql_query(&format!(
            "SELECT * FROM {table} WHERE ts > NOW() - INTERVAL {days} day"
        ))
        .with_context(|| format!("Could not fetch {table} from backend"))?;
    let records = JsonListExtractor::root().records_from_value(&rows)?;
    let table_rows = normalize(&records)?;
    info!(table, rows = table_rows.row_count(), "fetched");
    Ok(table_rows)
}

pub fn weekday_of(ts: &str) -> Result<&'static str, StageError> {
    let parsed = NaiveDateTime::parse_from_str(ts, TS_FORMAT)
        .map_err(|e| StageError::Invalid(format!("bad timestamp {ts:?}: {e}")))?;
    Ok(WEEKDAYS[parsed.weekday().num_days_from_monday() as usize])
}

fn column<'t>(table: &'t Table, name: &str) -> Result<&'t [String], ExtractionError> {
    table.column(name).ok_or_else(|| ExtractionError::MissingField {
        row: 0,
        field: name.to_string(),
    })
}

/// Same table plus a `weekday` column derived from `ts_column`.
pub fn with_weekday(table: &Table, ts_column: &str) -> Result<Table, StageError> {
    let stamps = column(table, ts_column)?;
    let records = table
        .to_records()
        .into_iter()
        .zip(stamps)
        .map(|(record, ts)| Ok(record.with("weekday", weekday_of(ts)?)))
        .collect::<Result<Vec<Record>, StageError>>()?;
    Ok(normalize(&records)?)
}

/// Weekdays in calendar order, everything else alphabetically after them.
fn rank(value: &str) -> (usize, &str) {
    let pos = WEEKDAYS
        .iter()
        .position(|d| *d == value)
        .unwrap_or(WEEKDAYS.len());
    (pos, value)
}

/// `value, count`, most frequent first.
pub fn value_counts(table: &Table, name: &str) -> Result<Table, StageError> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for v in column(table, name)? {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    counts.sort_by(|ka, a, kb, b| b.cmp(a).then_with(|| ka.cmp(kb)));
    let records: Vec<Record> = counts
        .into_iter()
        .map(|(v, n)| Record::new().with(name, v).with("count", n.to_string()))
        .collect();
    Ok(normalize(&records)?)
}

/// Counts of `columns` values per `index` value; absent pairs count 0.
pub fn crosstab(table: &Table, index: &str, columns: &str) -> Result<Table, StageError> {
    let idx = column(table, index)?;
    let cols = column(table, columns)?;

    let mut cells: IndexMap<&str, IndexMap<&str, usize>> = IndexMap::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (i, c) in idx.iter().zip(cols) {
        *cells.entry(i.as_str()).or_default().entry(c.as_str()).or_default() += 1;
        seen.insert(c.as_str());
    }
    cells.sort_by(|ka, _, kb, _| rank(ka).cmp(&rank(kb)));

    let records: Vec<Record> = cells
        .iter()
        .map(|(i, row)| {
            seen.iter().fold(Record::new().with(index, *i), |r, c| {
                r.with(*c, row.get(c).copied().unwrap_or(0).to_string())
            })
        })
        .collect();
    Ok(normalize(&records)?)
}

/// Mean of the numeric `value` column per `index` value, two decimals.
pub fn mean_by(table: &Table, index: &str, value: &str) -> Result<Table, StageError> {
    let idx = column(table, index)?;
    let vals = column(table, value)?;

    let mut sums: IndexMap<&str, (f64, usize)> = IndexMap::new();
    for (i, v) in idx.iter().zip(vals) {
        let n: f64 = v
            .trim()
            .parse()
            .map_err(|_| StageError::Invalid(format!("{value} is not a number: {v:?}")))?;
        let slot = sums.entry(i.as_str()).or_default();
        slot.0 += n;
        slot.1 += 1;
    }
    sums.sort_by(|ka, _, kb, _| rank(ka).cmp(&rank(kb)));

    let records: Vec<Record> = sums
        .iter()
        .map(|(i, (sum, n))| {
            Record::new()
                .with(index, *i)
                .with(value, format!("{:.2}", sum / *n as f64))
        })
        .collect();
    Ok(normalize(&records)?)
}

/// Named summary tables over the emotion and use-case rows.
pub fn summarize(emotions: &Table, use_cases: &Table) -> Result<Vec<(&'static str, Table)>, StageError> {
    let mut out = Vec::new();
    if !use_cases.is_empty() {
        let use_cases = with_weekday(use_cases, "ts")?;
        out.push(("use_case_counts", value_counts(&use_cases, "use_case")?));
        out.push(("use_case_by_weekday", crosstab(&use_cases, "weekday", "use_case")?));
    }
    if !emotions.is_empty() {
        let emotions = with_weekday(emotions, "ts")?;
        out.push(("gender_counts", value_counts(&emotions, "gender")?));
        out.push(("basic_emotion_counts", value_counts(&emotions, "basic_emotion")?));
        out.push(("basic_emotion_by_gender", crosstab(&emotions, "gender", "basic_emotion")?));
        out.push(("pleasure_state_by_gender", crosstab(&emotions, "gender", "pleasure_state")?));
        out.push(("basic_emotion_by_weekday", crosstab(&emotions, "weekday", "basic_emotion")?));
        out.push(("gender_by_weekday", crosstab(&emotions, "weekday", "gender")?));
        out.push(("dialog_time_by_weekday", mean_by(&emotions, "weekday", "dialog_time")?));
    }
    Ok(out)
}

pub fn run(settings: &Settings, client: &BackendClient<'_>, days: u32) -> Result<(PathBuf, usize)> {
    client
        .test_connection()
        .context("Backend not reachable, check the connection and the API key")?;

    let not_understood = fetch_rows(client, NOT_UNDERSTOOD_TABLE, days)?;
    let emotions = fetch_rows(client, EMOTION_TABLE, days)?;
    let use_cases = fetch_rows(client, USE_CASE_TABLE, days)?;

    let today = chrono::Local::now().date_naive();
    let dir = settings.output.dir.join(report_dir_name(today, days));
    let writer = ArtifactWriter::delimited(&dir, settings.output.delimiter)?;

    let mut tables = summarize(&emotions, &use_cases)?;
    if !not_understood.is_empty() {
        tables.push(("not_understood", not_understood));
    }
    if tables.is_empty() {
        warn!(days, "no telemetry in range, nothing written");
    }
    for (name, table) in &tables {
        writer.write_table(table, &writer.path_for(name))?;
    }
    Ok((dir, tables.len()))
}
