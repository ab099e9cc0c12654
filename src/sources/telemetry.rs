//! Synthetic conversation telemetry sent to the backend collector.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::IndexedRandom;
use rand::Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::BackendError;
use crate::fetch::Fetch;
use crate::settings::Settings;
use crate::sources::backend::BackendClient;

const GENDERS: [&str; 2] = ["male", "female"];
const BASIC_EMOTIONS: [&str; 4] = ["bad", "good", "excited", "bored"];
// "pefect" is what the dashboards key on
const PLEASURE_STATES: [&str; 4] = ["bad", "medium", "good", "pefect"];
const EXCITEMENT_STATES: [&str; 2] = ["excited", "not excited"];
const SMILE_STATES: [&str; 3] = ["false", "medium", "true"];

/// One fake encounter between a visitor and the robot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationData {
    pub distance: f64,
    pub age: u32,
    pub gender: &'static str,
    pub basic_emotion: &'static str,
    pub pleasure_state: &'static str,
    pub excitement_state: &'static str,
    pub smile_state: &'static str,
    pub dialog_time: f64,
}

impl ConversationData {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let gender = if rng.random::<f64>() > 0.0001 {
            pick(rng, &GENDERS)
        } else {
            "other"
        };
        ConversationData {
            distance: round_to(rng.random::<f64>() * 2.0, 4),
            age: rng.random_range(3..80),
            gender,
            basic_emotion: pick(rng, &BASIC_EMOTIONS),
            pleasure_state: pick(rng, &PLEASURE_STATES),
            excitement_state: pick(rng, &EXCITEMENT_STATES),
            smile_state: pick(rng, &SMILE_STATES),
            dialog_time: dialog_time(rng),
        }
    }

    /// Field order as the collector documents it.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("distance", self.distance.to_string()),
            ("age", self.age.to_string()),
            ("gender", self.gender.to_string()),
            ("basic_emotion", self.basic_emotion.to_string()),
            ("pleasure_state", self.pleasure_state.to_string()),
            ("excitement_state", self.excitement_state.to_string()),
            ("smile_state", self.smile_state.to_string()),
            ("dialog_time", self.dialog_time.to_string()),
        ]
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, items: &[&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Normal(3, 3) via Box-Muller at two decimals, redrawn until the rounded
/// value is above one second.
fn dialog_time<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let t = round_to(3.0 + 3.0 * z, 2);
        if t > 1.0 {
            return t;
        }
    }
}

/// One record to the collector. The client sorts the query by key.
pub fn submit(
    client: &BackendClient<'_>,
    collector_path: &str,
    subject: &str,
    data: &ConversationData,
) -> Result<(), BackendError> {
    let params = data.params();
    let fields: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    client.save(collector_path, subject, &fields)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub sent: usize,
    pub failed: usize,
}

/// Sends every record through a pool of `workers` threads, one batch of
/// `workers` records at a time. A failed request is counted, never retried.
pub fn send_all(
    client: &BackendClient<'_>,
    collector_path: &str,
    subject: &str,
    records: &[ConversationData],
    workers: usize,
    progress: bool,
) -> Result<Summary> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to start worker pool")?;

    let pb = if progress {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut summary = Summary::default();
    for batch in records.chunks(workers) {
        let ok = pool.install(|| {
            batch
                .par_iter()
                .map(|data| match submit(client, collector_path, subject, data) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(reason = %e, "record not accepted");
                        false
                    }
                })
                .filter(|ok| *ok)
                .count()
        });
        summary.sent += ok;
        summary.failed += batch.len() - ok;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();
    Ok(summary)
}

pub fn run(settings: &Settings, fetcher: &(dyn Fetch + Sync), count: usize, production: bool) -> Result<Summary> {
    let client = BackendClient::from_settings(fetcher, &settings.backend, production);
    let collector_path = &settings.backend.collector_path;
    info!(
        "Sending {} dummy datasets to {}{}",
        count,
        client.base_url(),
        collector_path
    );

    let mut rng = rand::rng();
    let records: Vec<ConversationData> = (0..count).map(|_| ConversationData::random(&mut rng)).collect();
    send_all(
        &client,
        collector_path,
        &settings.dummy.subject,
        &records,
        settings.dummy.workers,
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::CannedFetcher;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[test]
    fn random_records_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let d = ConversationData::random(&mut rng);
            assert!((0.0..=2.0).contains(&d.distance));
            assert!((3..80).contains(&d.age));
            assert!(d.dialog_time > 1.0);
            assert!(["male", "female", "other"].contains(&d.gender));
            assert!(BASIC_EMOTIONS.contains(&d.basic_emotion));
            assert!(SMILE_STATES.contains(&d.smile_state));
            assert_eq!(round_to(d.dialog_time, 2), d.dialog_time);
        }
    }

    #[test]
    fn dialog_time_rounds_above_one() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            let t = dialog_time(&mut rng);
            assert!(t > 1.0, "{t}");
            assert_eq!(round_to(t, 2), t);
        }
    }

    fn sample() -> ConversationData {
        ConversationData {
            distance: 0.5,
            age: 30,
            gender: "female",
            basic_emotion: "good",
            pleasure_state: "pefect",
            excitement_state: "not excited",
            smile_state: "true",
            dialog_time: 2.25,
        }
    }

    #[test]
    fn submit_goes_through_the_collector() {
        let fetcher = CannedFetcher::new().respond(
            "http://h/collector?age=30&basic_emotion=good&dialog_time=2.25&distance=0.5\
             &excitement_state=not excited&gender=female&pleasure_state=pefect\
             &smile_state=true&subject=save_pepper_data",
            "OK",
        );
        let client = BackendClient::new(&fetcher, "http://h", None, Duration::from_secs(1));
        submit(&client, "/collector", "save_pepper_data", &sample()).unwrap();
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let ok = ConversationData {
            distance: 1.0,
            age: 20,
            gender: "male",
            basic_emotion: "bad",
            pleasure_state: "bad",
            excitement_state: "excited",
            smile_state: "false",
            dialog_time: 3.0,
        };
        let unknown = ConversationData { age: 21, ..ok.clone() };
        let fetcher = CannedFetcher::new().respond(
            "http://h/c?age=20&basic_emotion=bad&dialog_time=3&distance=1&excitement_state=excited\
             &gender=male&pleasure_state=bad&smile_state=false&subject=s",
            "OK",
        );
        let client = BackendClient::new(&fetcher, "http://h", None, Duration::from_secs(1));

        let records = vec![ok.clone(), unknown.clone(), ok, unknown.clone(), unknown];
        let summary = send_all(&client, "/c", "s", &records, 2, false).unwrap();
        assert_eq!(summary, Summary { sent: 2, failed: 3 });
    }
}
