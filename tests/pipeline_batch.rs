use std::fs;

use pepper_collect::fetch::CannedFetcher;
use pepper_collect::pipeline::FetchTarget;
use pepper_collect::settings::{Course, Settings};
use pepper_collect::sources::timetable::{self, Selection, TimetableTarget};

const SELECTOR_PAGE: &str = r##"<select name="identifier">
    <option value="#SPLUSA">WI_B1</option>
    <option value="#SPLUSB">WI_B2</option>
    <option value="#SPLUSC">INF_B1</option>
    <option value="#SPLUSD">INF_B2</option>
</select>"##;

const PLAN: &str = r#"<html><body>
<table class="spreadsheet">
  <tr><th>Tag</th><th>Beginn</th><th>Ende</th><th>Raum</th></tr>
  <tr><td>Mo</td><td>08:00</td><td>09:30</td><td>S 101</td></tr>
  <tr><td>Di</td><td>10:00</td><td>11:30</td><td>T 202</td></tr>
</table></body></html>"#;

const HEADER_ONLY: &str = r#"<html><body>
<table class="spreadsheet">
  <tr><th>Tag</th><th>Beginn</th><th>Ende</th><th>Raum</th></tr>
</table></body></html>"#;

fn settings(dir: &std::path::Path) -> Settings {
    let mut s = Settings::default();
    s.output.dir = dir.to_path_buf();
    s.timetable.semesters = vec![1, 2];
    s.timetable.courses = vec![
        Course {
            name: "Wirtschaftsinformatik".into(),
            code: "WI".into(),
        },
        Course {
            name: "Informatik".into(),
            code: "INF".into(),
        },
    ];
    s
}

fn target(code: &str, semester: u32, set_id: &str) -> TimetableTarget {
    TimetableTarget {
        code: code.into(),
        semester,
        week: 42,
        set_id: set_id.into(),
    }
}

fn plan_key(s: &Settings, t: &TimetableTarget) -> String {
    timetable::plan_request(&s.timetable, t).describe()
}

#[test]
fn failing_target_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let fetcher = CannedFetcher::new()
        .respond(timetable::directory_request(&s.timetable).describe(), SELECTOR_PAGE)
        .respond(plan_key(&s, &target("WI", 1, "#SPLUSA")), PLAN)
        .fail(plan_key(&s, &target("WI", 2, "#SPLUSB")), 500)
        .respond(plan_key(&s, &target("INF", 1, "#SPLUSC")), "<html><p>Kein Plan</p></html>")
        .respond(plan_key(&s, &target("INF", 2, "#SPLUSD")), PLAN);

    let stats = timetable::run(&s, &fetcher, 42, &Selection::default(), false).unwrap();

    assert_eq!(stats.total, 4);
    assert_eq!(stats.written, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.no_data, 1);

    let mut files: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["INF_B2_42.csv", "WI_B1_42.csv"]);

    let csv = fs::read_to_string(dir.path().join("WI_B1_42.csv")).unwrap();
    assert_eq!(
        csv,
        "Tag;Beginn;Ende;Raum\nMo;08:00;09:30;S 101\nDi;10:00;11:30;T 202\n"
    );
}

#[test]
fn header_only_table_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    s.timetable.semesters = vec![1];
    let fetcher = CannedFetcher::new()
        .respond(timetable::directory_request(&s.timetable).describe(), SELECTOR_PAGE)
        .respond(plan_key(&s, &target("WI", 1, "#SPLUSA")), PLAN)
        .respond(plan_key(&s, &target("INF", 1, "#SPLUSC")), HEADER_ONLY);

    let stats = timetable::run(&s, &fetcher, 42, &Selection::default(), false).unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.no_data, 1);
    assert_eq!(stats.failed, 0);
    assert!(dir.path().join("WI_B1_42.csv").exists());
    assert!(!dir.path().join("INF_B1_42.csv").exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn single_target_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let fetcher = CannedFetcher::new()
        .respond(timetable::directory_request(&s.timetable).describe(), SELECTOR_PAGE)
        .fail(plan_key(&s, &target("WI", 2, "#SPLUSB")), 503);

    let selection = Selection {
        course: Some("Wirtschaftsinformatik".into()),
        semester: Some(2),
    };
    assert!(timetable::run(&s, &fetcher, 42, &selection, false).is_err());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn single_target_writes_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let t = target("INF", 1, "#SPLUSC");
    let fetcher = CannedFetcher::new()
        .respond(timetable::directory_request(&s.timetable).describe(), SELECTOR_PAGE)
        .respond(plan_key(&s, &t), PLAN);

    let selection = Selection {
        course: Some("inf".into()),
        semester: Some(1),
    };
    let stats = timetable::run(&s, &fetcher, 42, &selection, false).unwrap();
    assert_eq!(stats.written, 1);
    assert!(dir.path().join(format!("{}.csv", t.identity())).exists());
}

#[test]
fn unreachable_selector_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let s = settings(dir.path());
    let fetcher = CannedFetcher::new();
    assert!(timetable::run(&s, &fetcher, 42, &Selection::default(), false).is_err());
}
