//! Room-to-room routes from the 3D navigation service: one metadata JSON
//! aggregated over all rooms, plus the route videos.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::artifact::ArtifactWriter;
use crate::error::{ExtractionError, StageError};
use crate::extract::JsonListExtractor;
use crate::fetch::{ContentKind, Fetch, Request};
use crate::pipeline::{Aggregate, FetchTarget, PipelineRunner, RunStats};
use crate::record::Table;
use crate::settings::{RouteSettings, Settings};

/// Accessibility mode of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ordinary,
    Accessible,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Ordinary, Mode::Accessible];

    pub fn code(self) -> &'static str {
        match self {
            Mode::Ordinary => "M0000",
            Mode::Accessible => "M0001",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One destination listed by the navigation menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPoint {
    pub point: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub start: String,
    pub room: RoomPoint,
    pub mode: Mode,
}

impl FetchTarget for RouteTarget {
    fn identity(&self) -> String {
        format!("{}-{}-{}", self.start, self.room.point, self.mode)
    }
}

impl RouteTarget {
    pub fn video_file(&self) -> String {
        format!("{}.mp4", self.identity())
    }
}

/// One aggregate entry, values kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteLeg {
    pub video_path: String,
    pub location: String,
    pub distance: String,
    pub time: String,
}

pub fn menu_request(cfg: &RouteSettings) -> Request {
    Request::get(&cfg.menu_url, ContentKind::Json)
        .query("project", &cfg.project)
        .query("language", &cfg.language)
        .query("set", &cfg.set)
        .query("force-display", "false")
}

pub fn parse_rooms(body: &[u8]) -> Result<Vec<RoomPoint>, ExtractionError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let records = JsonListExtractor::at("/data/list").records_from_value(&value)?;
    records
        .iter()
        .enumerate()
        .map(|(row, r)| {
            let field = |name: &str| {
                r.get(name)
                    .map(str::to_string)
                    .ok_or_else(|| ExtractionError::MissingField {
                        row,
                        field: name.to_string(),
                    })
            };
            Ok(RoomPoint {
                point: field("point")?,
                name: field("name")?,
                location: r.get("location").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub fn fetch_rooms(fetcher: &dyn Fetch, cfg: &RouteSettings) -> Result<Vec<RoomPoint>> {
    let doc = fetcher
        .fetch(&menu_request(cfg))
        .context("Failed to fetch navigation menu")?;
    let rooms = parse_rooms(&doc.body).context("Navigation menu has no room list")?;
    info!("Navigation menu lists {} rooms", rooms.len());
    Ok(rooms)
}

/// Every room in both modes, room-major.
pub fn targets(start: &str, rooms: &[RoomPoint]) -> Vec<RouteTarget> {
    rooms
        .iter()
        .flat_map(|room| {
            Mode::ALL.into_iter().map(move |mode| RouteTarget {
                start: start.to_string(),
                room: room.clone(),
                mode,
            })
        })
        .collect()
}

pub fn route_request(cfg: &RouteSettings, target: &RouteTarget) -> Request {
    Request::get(&cfg.route_url, ContentKind::Json)
        .query("project", &cfg.project)
        .query("start", &target.start)
        .query("end", &target.room.point)
        .query("mode", target.mode.code())
        .query("redirect", "duration")
        .query("format", "none")
}

pub fn video_request(cfg: &RouteSettings, target: &RouteTarget) -> Request {
    let url = format!(
        "{}/{}/{}/{}",
        cfg.video_url.trim_end_matches('/'),
        cfg.project,
        cfg.video_format,
        target.video_file()
    );
    Request::get(url, ContentKind::Binary)
}

/// `"T 101"` -> `"T101"`.
pub fn clean_room_name(name: &str) -> String {
    name.replace("T ", "T")
}

pub fn clean_location(location: &str) -> String {
    location.replace(['[', ']', '\''], "")
}

fn number(table: &Table, column: &str) -> Result<f64, StageError> {
    let raw = table
        .column(column)
        .and_then(|c| c.first())
        .ok_or_else(|| ExtractionError::MissingField {
            row: 0,
            field: column.to_string(),
        })?;
    raw.trim()
        .parse()
        .map_err(|_| StageError::Invalid(format!("{column} is not a number: {raw:?}")))
}

/// `{distance, duration}` of one route -> `(room, mode, leg)`.
/// Distance in whole metres and time in whole minutes, both rounded up.
pub fn fold_leg(target: &RouteTarget, table: &Table) -> Result<(String, String, RouteLeg), StageError> {
    let distance = number(table, "distance")?.ceil();
    let minutes = (number(table, "duration")? / 60.0).ceil();
    let leg = RouteLeg {
        video_path: target.video_file(),
        location: clean_location(&target.room.location),
        distance: format!("{distance}"),
        time: format!("{minutes}"),
    };
    Ok((clean_room_name(&target.room.name), target.mode.code().to_string(), leg))
}

pub fn collect_metadata(
    fetcher: &dyn Fetch,
    cfg: &RouteSettings,
    rooms: &[RoomPoint],
    progress: bool,
) -> (Aggregate<RouteLeg>, RunStats) {
    let targets = targets(&cfg.start_point, rooms);
    let extractor = JsonListExtractor::single_object();
    PipelineRunner::new(fetcher).with_progress(progress).run_aggregate(
        &targets,
        |t| route_request(cfg, t),
        &extractor,
        fold_leg,
    )
}

/// Fetch all routes and write the aggregate once. Returns where it went.
pub fn run_metadata(
    settings: &Settings,
    fetcher: &dyn Fetch,
    out: Option<&Path>,
    progress: bool,
) -> Result<(PathBuf, RunStats)> {
    let cfg = &settings.route;
    let rooms = fetch_rooms(fetcher, cfg)?;
    println!("Fetching routes to {} rooms...", rooms.len());
    let (aggregate, stats) = collect_metadata(fetcher, cfg, &rooms, progress);

    let writer = ArtifactWriter::json(&settings.output.dir);
    let path = match out {
        Some(p) => p.to_path_buf(),
        None => writer.path_for(&cfg.metadata_name),
    };
    writer
        .write_json(&aggregate, &path)
        .context("Failed to write route metadata")?;
    Ok((path, stats))
}

pub fn run_videos(
    settings: &Settings,
    fetcher: &dyn Fetch,
    dir: Option<&Path>,
    progress: bool,
) -> Result<RunStats> {
    let cfg = &settings.route;
    let rooms = fetch_rooms(fetcher, cfg)?;
    let targets = targets(&cfg.start_point, &rooms);
    let writer = ArtifactWriter::json(dir.unwrap_or(&settings.output.dir));
    println!("Downloading {} videos...", targets.len());
    Ok(PipelineRunner::new(fetcher).with_progress(progress).run_downloads(
        &targets,
        |t| video_request(cfg, t),
        RouteTarget::video_file,
        &writer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::CannedFetcher;
    use crate::record::{normalize, Record};

    const MENU: &str = r#"{"data":{"list":[
        {"point":"L01P1056","name":"C006","location":["Haus C - Untergeschoss"]},
        {"point":"L02P0042","name":"T 101","location":"['Haus T']"}
    ]}}"#;

    fn room(point: &str, name: &str) -> RoomPoint {
        RoomPoint {
            point: point.into(),
            name: name.into(),
            location: "Haus C".into(),
        }
    }

    fn route_url(cfg: &RouteSettings, end: &str, mode: Mode) -> String {
        let t = RouteTarget {
            start: cfg.start_point.clone(),
            room: room(end, ""),
            mode,
        };
        route_request(cfg, &t).describe()
    }

    #[test]
    fn parses_room_list() {
        let rooms = parse_rooms(MENU.as_bytes()).unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].point, "L01P1056");
        assert_eq!(rooms[0].location, "Haus C - Untergeschoss");
        assert_eq!(rooms[1].name, "T 101");
    }

    #[test]
    fn room_without_point_is_missing_field() {
        let err = parse_rooms(br#"{"data":{"list":[{"name":"C006"}]}}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField { row: 0, .. }));
    }

    #[test]
    fn targets_cover_both_modes() {
        let t = targets("L00P1133", &[room("L01P1056", "C006")]);
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].identity(), "L00P1133-L01P1056-M0000");
        assert_eq!(t[1].video_file(), "L00P1133-L01P1056-M0001.mp4");
    }

    #[test]
    fn cleans_names_and_locations() {
        assert_eq!(clean_room_name("T 101"), "T101");
        assert_eq!(clean_room_name("C006"), "C006");
        assert_eq!(clean_location("['Haus T - EG']"), "Haus T - EG");
    }

    #[test]
    fn fold_rounds_up() {
        let target = RouteTarget {
            start: "L00P1133".into(),
            room: room("L01P1056", "C006"),
            mode: Mode::Ordinary,
        };
        let table = normalize(&[Record::new()
            .with("distance", "238.4")
            .with("duration", "151")])
        .unwrap();
        let (key, sub, leg) = fold_leg(&target, &table).unwrap();
        assert_eq!(key, "C006");
        assert_eq!(sub, "M0000");
        assert_eq!(leg.distance, "239");
        assert_eq!(leg.time, "3");
        assert_eq!(leg.video_path, "L00P1133-L01P1056-M0000.mp4");
    }

    #[test]
    fn fold_rejects_non_numbers() {
        let target = RouteTarget {
            start: "S".into(),
            room: room("E", "R"),
            mode: Mode::Accessible,
        };
        let table = normalize(&[Record::new().with("distance", "far").with("duration", "1")]).unwrap();
        assert!(matches!(fold_leg(&target, &table), Err(StageError::Invalid(_))));
    }

    #[test]
    fn failed_mode_keeps_other_entries() {
        let cfg = RouteSettings::default();
        let rooms = parse_rooms(MENU.as_bytes()).unwrap();
        let fetcher = CannedFetcher::new()
            .respond(route_url(&cfg, "L01P1056", Mode::Ordinary), r#"{"distance":238.4,"duration":151}"#)
            .respond(route_url(&cfg, "L01P1056", Mode::Accessible), r#"{"distance":401.2,"duration":452}"#)
            .fail(route_url(&cfg, "L02P0042", Mode::Ordinary), 500)
            .respond(route_url(&cfg, "L02P0042", Mode::Accessible), r#"{"distance":12,"duration":60}"#);

        let (agg, stats) = collect_metadata(&fetcher, &cfg, &rooms, false);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.merged, 3);

        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["C006"]["M0001"]["distance"], "402");
        assert_eq!(json["C006"]["M0001"]["time"], "8");
        assert_eq!(json["T101"]["M0001"]["location"], "Haus T");
        assert!(json["T101"].get("M0000").is_none());
    }

    #[test]
    fn video_url_follows_cdn_layout() {
        let cfg = RouteSettings::default();
        let t = targets("L00P1133", &[room("L01P1056", "C006")]);
        assert_eq!(
            video_request(&cfg, &t[0]).url,
            "https://cdnguide3dcom.blob.core.windows.net/videos/100011/544x306/L00P1133-L01P1056-M0000.mp4"
        );
    }
}
