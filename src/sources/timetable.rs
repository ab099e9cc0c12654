//! Course timetables: one delimited file per course set and calendar week.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use scraper::Html;
use tracing::{debug, info};

use crate::artifact::ArtifactWriter;
use crate::error::ExtractionError;
use crate::extract::html_table::selector;
use crate::extract::HtmlTableExtractor;
use crate::fetch::{ContentKind, Fetch, Request};
use crate::pipeline::{FetchTarget, PipelineRunner, RunStats};
use crate::settings::{Course, Settings, TimetableSettings};

pub const TABLE_MARKER: &str = "table.spreadsheet";

/// One student set (`WI_B3`) in one calendar week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableTarget {
    pub code: String,
    pub semester: u32,
    pub week: u32,
    /// Upstream identifier of the set, from the course selector.
    pub set_id: String,
}

impl TimetableTarget {
    pub fn set_name(&self) -> String {
        set_name(&self.code, self.semester)
    }
}

impl FetchTarget for TimetableTarget {
    fn identity(&self) -> String {
        format!("{}_{}", self.set_name(), self.week)
    }
}

pub fn set_name(code: &str, semester: u32) -> String {
    format!("{}_B{}", code, semester)
}

/// Option label -> option value of the `identifier` selector.
pub type SetDirectory = IndexMap<String, String>;

pub fn directory_request(cfg: &TimetableSettings) -> Request {
    Request::get(&cfg.base_url, ContentKind::Html)
        .query("action", "showfb")
        .query("fb", &cfg.faculty)
}

pub fn parse_directory(html: &str) -> Result<SetDirectory, ExtractionError> {
    const MARKER: &str = "select[name='identifier']";
    let select_sel = selector(MARKER)?;
    let option_sel = selector("option")?;

    let doc = Html::parse_document(html);
    let select = doc
        .select(&select_sel)
        .next()
        .ok_or_else(|| ExtractionError::MarkerMissing {
            marker: MARKER.to_string(),
        })?;

    Ok(select
        .select(&option_sel)
        .filter_map(|opt| {
            let value = opt.value().attr("value")?;
            let label = opt.text().collect::<String>().trim().to_string();
            Some((label, value.to_string()))
        })
        .collect())
}

pub fn fetch_directory(fetcher: &dyn Fetch, cfg: &TimetableSettings) -> Result<SetDirectory> {
    let doc = fetcher
        .fetch(&directory_request(cfg))
        .context("Failed to fetch course selector")?;
    let directory = parse_directory(&doc.text()).context("Course selector page has no set list")?;
    info!("Course selector lists {} sets", directory.len());
    Ok(directory)
}

/// Every configured course x semester that the selector knows about.
pub fn targets(
    courses: &[Course],
    semesters: &[u32],
    week: u32,
    directory: &SetDirectory,
) -> Vec<TimetableTarget> {
    let mut out = Vec::new();
    for course in courses {
        for &semester in semesters {
            let name = set_name(&course.code, semester);
            let Some(set_id) = directory.get(&name) else {
                debug!(set = %name, "not offered, skipped");
                continue;
            };
            out.push(TimetableTarget {
                code: course.code.clone(),
                semester,
                week,
                set_id: set_id.clone(),
            });
        }
    }
    out
}

pub fn plan_request(cfg: &TimetableSettings, target: &TimetableTarget) -> Request {
    Request::post(&cfg.base_url, ContentKind::Html)
        .query("action", "showplan")
        .query("weeks", target.week.to_string())
        .query("fb", &cfg.faculty)
        .query("idtype", "")
        .query("listtype", "Text-Listen")
        .query("template", "Set")
        .query("objectclass", "Studenten-Sets")
        .query("identifier", &target.set_id)
        .query("days", &cfg.days)
        .query("tabstart", "41")
}

/// Which sets to fetch: all configured courses, or one course/semester pair.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub course: Option<String>,
    pub semester: Option<u32>,
}

pub fn run(
    settings: &Settings,
    fetcher: &dyn Fetch,
    week: u32,
    selection: &Selection,
    progress: bool,
) -> Result<RunStats> {
    let cfg = &settings.timetable;
    let writer = ArtifactWriter::delimited(&settings.output.dir, settings.output.delimiter)?;
    let extractor = HtmlTableExtractor::new(TABLE_MARKER);
    let directory = fetch_directory(fetcher, cfg)?;
    let runner = PipelineRunner::new(fetcher).with_progress(progress);

    match (&selection.course, selection.semester) {
        (Some(course), Some(semester)) => {
            let course = cfg
                .course(course)
                .with_context(|| format!("Unknown course {course:?}"))?;
            let name = set_name(&course.code, semester);
            let set_id = directory
                .get(&name)
                .with_context(|| format!("Set {name} is not offered"))?;
            let target = TimetableTarget {
                code: course.code.clone(),
                semester,
                week,
                set_id: set_id.clone(),
            };
            // single target: every failure is fatal
            let table = runner
                .fetch_table(&plan_request(cfg, &target), &extractor)?
                .with_context(|| format!("No timetable for {name} in week {week}"))?;
            let path = writer.path_for(&target.identity());
            writer.write_table(&table, &path)?;
            println!("Saved {}", path.display());
            Ok(RunStats {
                total: 1,
                written: 1,
                ..RunStats::default()
            })
        }
        (None, None) => {
            let targets = targets(&cfg.courses, &cfg.semesters, week, &directory);
            println!("Fetching {} timetables for week {}...", targets.len(), week);
            let stats = runner.run_tables(&targets, |t| plan_request(cfg, t), &extractor, &writer);
            Ok(stats)
        }
        _ => bail!("--course and --semester must be given together"),
    }
}
