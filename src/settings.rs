//! Run configuration, built once at startup and passed down by reference.
//!
//! Layers, later wins: built-in defaults, `pepper.toml` (or `--config <path>`),
//! then `PEPPER_*` environment variables with `__` between nested keys, e.g.
//! `PEPPER_HTTP__TIMEOUT_SECS=5` or `PEPPER_BACKEND__API_KEY=...`.

use std::path::{Path, PathBuf};

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub output: OutputSettings,
    pub timetable: TimetableSettings,
    pub mensa: MensaSettings,
    pub route: RouteSettings,
    pub backend: BackendSettings,
    pub dummy: DummySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: 10,
            user_agent: "hbv-kms-pepper-team".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub delimiter: char,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            dir: PathBuf::from("out"),
            delimiter: ';',
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimetableSettings {
    pub base_url: String,
    pub faculty: String,
    pub semesters: Vec<u32>,
    pub days: String,
    pub courses: Vec<Course>,
}

const COURSES: &[(&str, &str)] = &[
    ("Wirtschaftsinformatik", "WI"),
    ("Informatik", "INF"),
    ("Betriebswirtschaftslehre", "BWL"),
    ("Crouse Tourism Management", "CTM"),
    ("Digitalisierung, Innovation und Informationsmanagement", "DIIM"),
    ("Erasmus", "Erasmus"),
    ("Digitale Medien Produktion", "DMP"),
    ("Gründung, Innovation, Führung", "GIF"),
    ("Integrated Safety and Security Management", "ISSM"),
    ("Logistics Engineering and Management", "LEM"),
    ("Transportwesen und Logistik", "TWL"),
];

impl Default for TimetableSettings {
    fn default() -> Self {
        TimetableSettings {
            base_url: "https://www4.hs-bremerhaven.de/fb2/ws2122.php".to_string(),
            faculty: "#SPLUS938DBF".to_string(),
            semesters: (1..=6).collect(),
            days: "1;2;3;4;5".to_string(),
            courses: COURSES
                .iter()
                .map(|(name, code)| Course {
                    name: name.to_string(),
                    code: code.to_string(),
                })
                .collect(),
        }
    }
}

impl TimetableSettings {
    /// Lookup by display name or short code.
    pub fn course(&self, key: &str) -> Option<&Course> {
        self.courses
            .iter()
            .find(|c| c.name == key || c.code.eq_ignore_ascii_case(key))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MensaSettings {
    pub page_url: String,
    pub pdf_name: String,
    pub menu_name: String,
}

impl Default for MensaSettings {
    fn default() -> Self {
        MensaSettings {
            page_url: "https://www.stw-bremen.de/de/cafeteria/bremerhaven".to_string(),
            pdf_name: "Mensaplan.pdf".to_string(),
            menu_name: "mensadata".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub menu_url: String,
    pub route_url: String,
    pub video_url: String,
    pub project: String,
    pub language: String,
    pub set: String,
    pub start_point: String,
    pub video_format: String,
    pub metadata_name: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        RouteSettings {
            menu_url: "https://services.guide3d.com/menu/cors/index.php".to_string(),
            route_url: "https://services.guide3d.com/route/cors/index.php".to_string(),
            video_url: "https://cdnguide3dcom.blob.core.windows.net/videos".to_string(),
            project: "100011".to_string(),
            language: "de".to_string(),
            set: "set_01".to_string(),
            start_point: "L00P1133".to_string(),
            video_format: "544x306".to_string(),
            metadata_name: "route_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,
    pub sandbox_url: String,
    pub api_key: Option<String>,
    pub collector_path: String,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            url: "https://informatik.hs-bremerhaven.de/docker-hbv-kms-http".to_string(),
            sandbox_url: "http://127.0.0.1:3000/docker-hbv-kms-http".to_string(),
            api_key: None,
            collector_path: "/collector".to_string(),
            timeout_secs: 10,
        }
    }
}

impl BackendSettings {
    pub fn base_url(&self, production: bool) -> &str {
        if production {
            &self.url
        } else {
            &self.sandbox_url
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DummySettings {
    pub workers: usize,
    pub subject: String,
}

impl Default for DummySettings {
    fn default() -> Self {
        DummySettings {
            workers: 8,
            subject: "save_pepper_data".to_string(),
        }
    }
}

/// Default file name looked up in the working directory when no path is given.
pub const DEFAULT_FILE: &str = "pepper";

pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_FILE).required(false),
    };
    Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PEPPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
