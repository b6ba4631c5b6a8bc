//! Run log: append-only JSONL timeline of every step taken during a run.
//!
//! One object per line, tagged with `step`, a sequence number and a UTC
//! timestamp. Lines are flushed as they are written, so a crashed run still
//! leaves a usable trail.

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use mailtrace_common::{Person, ReflectionDecision, SearchPhase, Verdict};

/// Candidate lists in `extract` events are cut to this many entries.
const MAX_LOGGED_CANDIDATES: usize = 10;

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    sink: Option<LineWriter<File>>,
    seq: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum EventKind {
    Plan {
        seed_urls: Vec<String>,
        phases: Vec<SearchPhase>,
    },
    Search {
        query: String,
        result_count: usize,
    },
    SearchError {
        query: String,
        error: String,
    },
    FetchError {
        url: String,
        error: String,
    },
    Extract {
        url: String,
        candidates: Vec<String>,
    },
    Judge {
        url: String,
        verdict: Verdict,
    },
    Reflect {
        url: String,
        reflection: ReflectionDecision,
    },
    PersonDone {
        index: usize,
        email: String,
        source: String,
        query: String,
        pages_scanned: usize,
        duration_s: f64,
        timed_out: bool,
    },
    RunDone {
        total: usize,
        found: usize,
        failures: usize,
        timed_out: usize,
        pages_scanned: usize,
        elapsed_s: f64,
    },
}

impl EventKind {
    pub fn extract<'a>(url: &str, candidates: impl IntoIterator<Item = &'a String>) -> Self {
        EventKind::Extract {
            url: url.to_string(),
            candidates: candidates
                .into_iter()
                .take(MAX_LOGGED_CANDIDATES)
                .cloned()
                .collect(),
        }
    }
}

impl RunLog {
    /// Open (or create) the JSONL file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open run log {}", path.display()))?;

        let log = Self::with_sink(Some(LineWriter::new(file)));
        info!(run_id = log.run_id.as_str(), path = %path.display(), "Run log opened");
        Ok(log)
    }

    /// A run log that records nothing.
    pub fn disabled() -> Self {
        Self::with_sink(None)
    }

    fn with_sink(sink: Option<LineWriter<File>>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            sink,
            seq: 0,
        }
    }

    /// Record one event. Write failures are logged and otherwise ignored;
    /// losing a log line never fails a run.
    pub fn log(&mut self, person: Option<&Person>, kind: EventKind) {
        let event = RunEvent {
            run_id: self.run_id.clone(),
            seq: self.seq,
            ts: Utc::now(),
            name: person.map(|p| p.name.clone()),
            affiliation: person.map(|p| p.affiliation.clone()),
            kind,
        };
        self.seq += 1;

        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let written = serde_json::to_string(&event)
            .map_err(anyhow::Error::from)
            .and_then(|line| Ok(writeln!(sink, "{line}")?));
        if let Err(e) = written {
            warn!(error = %e, "Failed to write run log event");
        }
    }

    pub fn events_logged(&self) -> u32 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailtrace_common::Classification;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn writes_one_tagged_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let person = Person::new("Jane Doe", "Acme University");

        let mut log = RunLog::open(&path).unwrap();
        log.log(
            Some(&person),
            EventKind::FetchError {
                url: "https://acme.edu/x".into(),
                error: "404".into(),
            },
        );
        log.log(
            Some(&person),
            EventKind::Judge {
                url: "https://acme.edu/jdoe".into(),
                verdict: Verdict {
                    chosen_email: "jane.doe@acme.edu".into(),
                    classification: Classification::Personal,
                    confidence: 0.9,
                    reason: "match".into(),
                },
            },
        );
        drop(log);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["step"], "fetch_error");
        assert_eq!(lines[0]["name"], "Jane Doe");
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines[1]["step"], "judge");
        assert_eq!(lines[1]["verdict"]["classification"], "personal");
        assert!(lines[1]["ts"].is_string());
    }

    #[test]
    fn appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("runs.jsonl");
        for _ in 0..2 {
            let mut log = RunLog::open(&path).unwrap();
            log.log(
                None,
                EventKind::RunDone {
                    total: 1,
                    found: 0,
                    failures: 1,
                    timed_out: 0,
                    pages_scanned: 8,
                    elapsed_s: 1.5,
                },
            );
        }
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].get("name").is_none());
        assert_ne!(lines[0]["run_id"], lines[1]["run_id"]);
    }

    #[test]
    fn plan_event_carries_seeds_and_phases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let mut log = RunLog::open(&path).unwrap();
        log.log(
            Some(&Person::new("Jane Doe", "Acme University")),
            EventKind::Plan {
                seed_urls: vec!["https://acme.edu/people".into()],
                phases: vec![SearchPhase {
                    name: "directory".into(),
                    queries: vec!["acme staff directory".into()],
                }],
            },
        );
        drop(log);

        let lines = read_lines(&path);
        assert_eq!(lines[0]["step"], "plan");
        assert_eq!(lines[0]["seed_urls"][0], "https://acme.edu/people");
        assert_eq!(lines[0]["phases"][0]["name"], "directory");
        assert_eq!(lines[0]["phases"][0]["queries"][0], "acme staff directory");
    }

    #[test]
    fn extract_event_caps_candidates() {
        let candidates: Vec<String> = (0..15).map(|i| format!("u{i}@acme.edu")).collect();
        match EventKind::extract("https://acme.edu", &candidates) {
            EventKind::Extract { candidates, .. } => assert_eq!(candidates.len(), 10),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn disabled_log_still_counts() {
        let mut log = RunLog::disabled();
        log.log(
            None,
            EventKind::SearchError {
                query: "q".into(),
                error: "timeout".into(),
            },
        );
        assert_eq!(log.events_logged(), 1);
    }
}
