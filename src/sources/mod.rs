//! One module per upstream the project collects from. Each exposes a `run`
//! driver used by the command-line front end.

pub mod backend;
pub mod mensa;
pub mod report;
pub mod route;
pub mod telemetry;
pub mod timetable;
