use std::path::PathBuf;

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactWriter;
use crate::error::{ExtractionError, StageError};
use crate::extract::RecordExtractor;
use crate::fetch::{Fetch, Request};
use crate::record::{normalize, Table};

/// One unit of work. The identity names the artifact and the log lines.
pub trait FetchTarget {
    fn identity(&self) -> String;
}

#[derive(Debug)]
pub enum Outcome {
    Written(PathBuf),
    Merged,
    NoData,
    Failed(StageError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub written: usize,
    pub merged: usize,
    pub no_data: usize,
    pub failed: usize,
}

impl RunStats {
    fn count(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Written(_) => self.written += 1,
            Outcome::Merged => self.merged += 1,
            Outcome::NoData => self.no_data += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// room -> (mode -> entry). Keys keep insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Aggregate<V> {
    entries: IndexMap<String, IndexMap<String, V>>,
}

impl<V> Default for Aggregate<V> {
    fn default() -> Self {
        Aggregate {
            entries: IndexMap::new(),
        }
    }
}

impl<V> Aggregate<V> {
    pub fn merge(&mut self, key: impl Into<String>, sub_key: impl Into<String>, value: V) {
        self.entries
            .entry(key.into())
            .or_default()
            .insert(sub_key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&IndexMap<String, V>> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives fetch -> extract -> normalize over a batch of targets.
///
/// Targets are processed in input order and independently: a failure is
/// logged and counted against that target only.
pub struct PipelineRunner<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    progress: bool,
}

impl<'a, F: Fetch + ?Sized> PipelineRunner<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        PipelineRunner {
            fetcher,
            progress: false,
        }
    }

    pub fn with_progress(mut self, on: bool) -> Self {
        self.progress = on;
        self
    }

    /// One target end to end. `Ok(None)` when the document lacks the expected
    /// structure or holds no rows. A request whose kind the extractor cannot
    /// read is refused before anything is sent.
    pub fn fetch_table(
        &self,
        request: &Request,
        extractor: &dyn RecordExtractor,
    ) -> Result<Option<Table>, StageError> {
        if extractor.kind() != request.kind {
            return Err(ExtractionError::WrongKind {
                expected: extractor.kind().name(),
                found: request.kind.name(),
            }
            .into());
        }
        let doc = self.fetcher.fetch(request)?;
        let records = match extractor.extract(&doc) {
            Ok(records) => records,
            Err(ExtractionError::MarkerMissing { marker }) => {
                debug!(url = %request.url, %marker, "no matching structure");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let table = normalize(&records)?;
        Ok((!table.is_empty()).then_some(table))
    }

    /// One artifact per target that yields data.
    pub fn run_tables<T, P>(
        &self,
        targets: &[T],
        plan: P,
        extractor: &dyn RecordExtractor,
        writer: &ArtifactWriter,
    ) -> RunStats
    where
        T: FetchTarget,
        P: Fn(&T) -> Request,
    {
        let pb = self.progress_bar(targets.len());
        let mut stats = RunStats::default();

        for target in targets {
            let identity = target.identity();
            let outcome = match self.fetch_table(&plan(target), extractor) {
                Ok(Some(table)) => {
                    let path = writer.path_for(&identity);
                    match writer.write_table(&table, &path) {
                        Ok(()) => Outcome::Written(path),
                        Err(e) => Outcome::Failed(e.into()),
                    }
                }
                Ok(None) => Outcome::NoData,
                Err(e) => Outcome::Failed(e),
            };
            log_outcome(&identity, &outcome);
            stats.count(&outcome);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            total = stats.total,
            written = stats.written,
            no_data = stats.no_data,
            failed = stats.failed,
            "batch finished"
        );
        stats
    }

    /// Raw bodies saved as-is, one file per target; nothing is extracted.
    pub fn run_downloads<T, P, N>(
        &self,
        targets: &[T],
        plan: P,
        file_name: N,
        writer: &ArtifactWriter,
    ) -> RunStats
    where
        T: FetchTarget,
        P: Fn(&T) -> Request,
        N: Fn(&T) -> String,
    {
        let pb = self.progress_bar(targets.len());
        let mut stats = RunStats::default();

        for target in targets {
            let identity = target.identity();
            let path = writer.dir().join(file_name(target));
            let outcome = match self.fetcher.fetch(&plan(target)) {
                Ok(doc) if doc.body.is_empty() => Outcome::NoData,
                Ok(doc) => match writer.write_bytes(&doc.body, &path) {
                    Ok(()) => Outcome::Written(path),
                    Err(e) => Outcome::Failed(e.into()),
                },
                Err(e) => Outcome::Failed(e.into()),
            };
            log_outcome(&identity, &outcome);
            stats.count(&outcome);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            total = stats.total,
            written = stats.written,
            failed = stats.failed,
            "downloads finished"
        );
        stats
    }

    /// Fold every target's table into one aggregate; nothing is written here.
    ///
    /// `fold` maps a target's table to `(key, sub_key, value)`. A target that
    /// fails contributes nothing and leaves the entries of other targets intact.
    pub fn run_aggregate<T, V, P, G>(
        &self,
        targets: &[T],
        plan: P,
        extractor: &dyn RecordExtractor,
        fold: G,
    ) -> (Aggregate<V>, RunStats)
    where
        T: FetchTarget,
        P: Fn(&T) -> Request,
        G: Fn(&T, &Table) -> Result<(String, String, V), StageError>,
    {
        let pb = self.progress_bar(targets.len());
        let mut aggregate = Aggregate::default();
        let mut stats = RunStats::default();

        for target in targets {
            let identity = target.identity();
            let folded = self
                .fetch_table(&plan(target), extractor)
                .and_then(|table| table.map(|t| fold(target, &t)).transpose());
            let outcome = match folded {
                Ok(Some((key, sub_key, value))) => {
                    aggregate.merge(key, sub_key, value);
                    Outcome::Merged
                }
                Ok(None) => Outcome::NoData,
                Err(e) => Outcome::Failed(e),
            };
            log_outcome(&identity, &outcome);
            stats.count(&outcome);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            total = stats.total,
            merged = stats.merged,
            failed = stats.failed,
            entries = aggregate.len(),
            "aggregate finished"
        );
        (aggregate, stats)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    }
}

fn log_outcome(identity: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Merged => debug!(target_id = %identity, "merged"),
        Outcome::Written(path) => debug!(target_id = %identity, path = %path.display(), "written"),
        Outcome::NoData => debug!(target_id = %identity, "no data, skipped"),
        Outcome::Failed(e) => warn!(target_id = %identity, reason = %e, "target skipped"),
    }
}
