//! Ephemeral controller state: a bounded ring of recent events (valve
//! transitions, completed runs, system notes) plus the JSON status
//! snapshot written for external observers to read.

use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

use sprinkler_engine::{RunLog, RunSource, Status, ZoneRunRecord};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<Mutex<ControllerState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct ControllerState {
    pub started_at: Instant,
    zone_names: Vec<String>,
    pub events: VecDeque<ControllerEvent>,
}

#[derive(Clone, Serialize)]
pub struct ControllerEvent {
    pub ts: i64,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Valve,
    Run,
    System,
}

/// What the status file contains.
#[derive(Serialize)]
pub struct StatusReport<'a> {
    pub uptime_secs: u64,
    pub engine: &'a Status,
    pub events: Vec<&'a ControllerEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl ControllerState {
    pub fn new(zone_names: Vec<String>) -> Self {
        Self {
            started_at: Instant::now(),
            zone_names,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable snapshot, newest event first.
    pub fn to_report<'a>(&'a self, engine: &'a Status) -> StatusReport<'a> {
        StatusReport {
            uptime_secs: self.started_at.elapsed().as_secs(),
            engine,
            events: self.events.iter().rev().collect(),
        }
    }

    fn zone_label(&self, zone: u8) -> String {
        if zone == 0 {
            return "pump".to_string();
        }
        self.zone_names
            .get(usize::from(zone) - 1)
            .cloned()
            .unwrap_or_else(|| format!("zone {zone}"))
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ControllerEvent {
            ts: now_unix(),
            kind,
            detail,
        });
    }
}

// ---------------------------------------------------------------------------
// Run-log adapter
// ---------------------------------------------------------------------------

/// Feeds engine run records into the shared state.
pub struct StateLog(pub SharedState);

impl RunLog for StateLog {
    fn zone_run(&mut self, record: &ZoneRunRecord) {
        let Ok(mut st) = self.0.lock() else { return };

        let label = st.zone_label(record.zone);
        let detail = match record.source {
            Some(RunSource::Stored(i)) => format!(
                "{label}: schedule {} ran {}s (seasonal {}%, weather {}%)",
                i + 1,
                record.duration_secs,
                record.adjustments.seasonal,
                record.adjustments.weather
            ),
            Some(RunSource::Quick) => {
                format!("{label}: quick run {}s", record.duration_secs)
            }
            None => format!("{label}: manual run {}s", record.duration_secs),
        };

        info!(
            zone = record.zone,
            duration_secs = record.duration_secs,
            source = ?record.source,
            "zone run complete"
        );
        st.push_event(EventKind::Run, detail);
    }

    fn output_change(&mut self, zone: u8, on: bool) {
        let Ok(mut st) = self.0.lock() else { return };

        let label = st.zone_label(zone);
        let state_str = if on { "enabled" } else { "disabled" };
        info!(zone, on, "output changed");
        st.push_event(EventKind::Valve, format!("{label} {state_str}"));
    }
}

// ---------------------------------------------------------------------------
// Status file
// ---------------------------------------------------------------------------

/// Writes the snapshot to disk, skipping writes when nothing changed.
pub struct StatusWriter {
    path: PathBuf,
    last: Option<String>,
}

impl StatusWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    pub fn write(&mut self, report: &StatusReport<'_>) -> anyhow::Result<()> {
        // Uptime advances every second, so change detection keys on the
        // engine snapshot and the event ring instead of the full report.
        let newest = report.events.first().map(|e| (e.ts, e.detail.as_str()));
        let key = format!(
            "{}|{}|{:?}",
            serde_json::to_string(report.engine)?,
            report.events.len(),
            newest
        );
        if self.last.as_deref() == Some(key.as_str()) {
            return Ok(());
        }
        fs::write(&self.path, serde_json::to_string_pretty(report)?)?;
        self.last = Some(key);
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sprinkler_engine::{DurationAdjustments, RunMode};
    use time::macros::datetime;

    fn state() -> SharedState {
        Arc::new(Mutex::new(ControllerState::new(vec![
            "front".to_string(),
            "back".to_string(),
        ])))
    }

    fn record(zone: u8, source: Option<RunSource>) -> ZoneRunRecord {
        ZoneRunRecord {
            started_at: datetime!(2026-08-03 06:00 UTC),
            zone,
            duration_secs: 600,
            source,
            adjustments: DurationAdjustments::default(),
        }
    }

    fn idle_status() -> Status {
        Status {
            mode: RunMode::Idle,
            zone: None,
            end_time: None,
            mask: 0,
            events: vec![],
        }
    }

    // -- Ring buffer -------------------------------------------------------

    #[test]
    fn ring_buffer_caps_at_limit() {
        let shared = state();
        {
            let mut st = shared.lock().unwrap();
            for i in 0..(MAX_EVENTS + 10) {
                st.record_system(format!("event {i}"));
            }
        }
        let st = shared.lock().unwrap();
        assert_eq!(st.events.len(), MAX_EVENTS);
        // Oldest entries were evicted.
        assert_eq!(st.events.front().unwrap().detail, "event 10");
    }

    // -- Labels ------------------------------------------------------------

    #[test]
    fn zone_labels_use_names_and_pump() {
        let shared = state();
        let st = shared.lock().unwrap();
        assert_eq!(st.zone_label(0), "pump");
        assert_eq!(st.zone_label(1), "front");
        assert_eq!(st.zone_label(2), "back");
        assert_eq!(st.zone_label(7), "zone 7");
    }

    // -- Run-log adapter ---------------------------------------------------

    #[test]
    fn output_change_records_a_valve_event() {
        let shared = state();
        let mut log = StateLog(Arc::clone(&shared));
        log.output_change(1, true);
        log.output_change(1, false);

        let st = shared.lock().unwrap();
        let details: Vec<&str> = st.events.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(details, vec!["front enabled", "front disabled"]);
        assert!(st.events.iter().all(|e| e.kind == EventKind::Valve));
    }

    #[test]
    fn zone_run_details_name_the_source() {
        let shared = state();
        let mut log = StateLog(Arc::clone(&shared));
        log.zone_run(&record(1, Some(RunSource::Stored(0))));
        log.zone_run(&record(2, Some(RunSource::Quick)));
        log.zone_run(&record(2, None));

        let st = shared.lock().unwrap();
        let details: Vec<&str> = st.events.iter().map(|e| e.detail.as_str()).collect();
        assert!(details[0].starts_with("front: schedule 1 ran 600s"));
        assert_eq!(details[1], "back: quick run 600s");
        assert_eq!(details[2], "back: manual run 600s");
    }

    // -- Snapshot ----------------------------------------------------------

    #[test]
    fn report_serializes_with_newest_event_first() {
        let shared = state();
        {
            let mut st = shared.lock().unwrap();
            st.record_system("first".to_string());
            st.record_system("second".to_string());
        }
        let engine = idle_status();
        let st = shared.lock().unwrap();
        let json = serde_json::to_string(&st.to_report(&engine)).unwrap();

        assert!(json.contains("\"uptime_secs\""), "{json}");
        assert!(json.contains("\"mode\":\"idle\""), "{json}");
        let first = json.find("first").unwrap();
        let second = json.find("second").unwrap();
        assert!(second < first);
    }

    #[test]
    fn status_writer_skips_unchanged_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut writer = StatusWriter::new(&path);

        let shared = state();
        let engine = idle_status();

        {
            let st = shared.lock().unwrap();
            writer.write(&st.to_report(&engine)).unwrap();
        }
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"mask\": 0"));

        // Unchanged report: the file is not rewritten even if deleted.
        fs::remove_file(&path).unwrap();
        {
            let st = shared.lock().unwrap();
            writer.write(&st.to_report(&engine)).unwrap();
        }
        assert!(!path.exists());
    }
}
