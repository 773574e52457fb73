//! The single authoritative record of what is running right now.
//!
//! Every transition first reports the segment being replaced to the run
//! log, then installs the new state and restamps the segment start. The
//! exit action of each state is always "log what just ended", so history
//! is complete no matter which transition interrupts which run.
//!
//! ```text
//! Idle ──set_schedule(true)──▶ Schedule ──continue_schedule──▶ Schedule
//!  ▲                              │  (zone hand-off)
//!  ├──────set_schedule(false)─────┘
//!  │
//!  └──set_manual(false)── Manual ◀──set_manual(true)── (any state)
//! ```

use serde::Serialize;
use time::OffsetDateTime;

use crate::adjust::DurationAdjustments;
use crate::ports::RunLog;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Idle,
    Schedule,
    Manual,
}

/// Which program a schedule run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    /// Index into the stored schedule list.
    Stored(u8),
    /// An ad-hoc quick run.
    Quick,
}

/// A completed zone segment, handed to the run log on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRunRecord {
    pub started_at: OffsetDateTime,
    pub zone: u8,
    pub duration_secs: i64,
    /// `None` for manual runs.
    pub source: Option<RunSource>,
    /// The scale factors that were in force for the run.
    pub adjustments: DurationAdjustments,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RunState {
    mode: RunMode,
    source: Option<RunSource>,
    adjustments: DurationAdjustments,
    zone: Option<u8>,
    end_time: Option<u16>,
    started_at: Option<OffsetDateTime>,
}

impl Default for RunState {
    fn default() -> Self {
        RunState {
            mode: RunMode::Idle,
            source: None,
            adjustments: DurationAdjustments::default(),
            zone: None,
            end_time: None,
            started_at: None,
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        RunState::default()
    }

    /// Report the segment currently in progress, if there is one. A
    /// segment only exists once a zone has actually been activated.
    fn log_segment<L: RunLog>(&self, now: OffsetDateTime, log: &mut L) {
        if let (Some(started_at), Some(zone)) = (self.started_at, self.zone) {
            log.zone_run(&ZoneRunRecord {
                started_at,
                zone,
                duration_secs: (now - started_at).whole_seconds().max(0),
                source: self.source,
                adjustments: self.adjustments,
            });
        }
    }

    /// Start a schedule run (no zone active yet) or end one.
    pub fn set_schedule<L: RunLog>(
        &mut self,
        running: bool,
        source: Option<RunSource>,
        adjustments: DurationAdjustments,
        now: OffsetDateTime,
        log: &mut L,
    ) {
        self.log_segment(now, log);
        self.mode = if running { RunMode::Schedule } else { RunMode::Idle };
        self.source = if running { source } else { None };
        self.adjustments = adjustments;
        self.zone = None;
        self.end_time = None;
        self.started_at = Some(now);
    }

    /// Hand the running schedule off to the next zone, keeping the source
    /// and adjustments of the run intact.
    pub fn continue_schedule<L: RunLog>(
        &mut self,
        zone: u8,
        end_time: u16,
        now: OffsetDateTime,
        log: &mut L,
    ) {
        self.log_segment(now, log);
        self.mode = RunMode::Schedule;
        self.zone = Some(zone);
        self.end_time = Some(end_time);
        self.started_at = Some(now);
    }

    /// Start or stop a manual run. Any schedule context is cleared.
    pub fn set_manual<L: RunLog>(
        &mut self,
        on: bool,
        zone: u8,
        now: OffsetDateTime,
        log: &mut L,
    ) {
        self.log_segment(now, log);
        self.mode = if on { RunMode::Manual } else { RunMode::Idle };
        self.source = None;
        self.adjustments = DurationAdjustments::default();
        self.zone = on.then_some(zone);
        self.end_time = None;
        self.started_at = Some(now);
    }

    // -- Queries -----------------------------------------------------------

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn is_schedule(&self) -> bool {
        self.mode == RunMode::Schedule
    }

    pub fn is_manual(&self) -> bool {
        self.mode == RunMode::Manual
    }

    pub fn zone(&self) -> Option<u8> {
        self.zone
    }

    pub fn end_time(&self) -> Option<u16> {
        self.end_time
    }

    pub fn source(&self) -> Option<RunSource> {
        self.source
    }

    pub fn adjustments(&self) -> DurationAdjustments {
        self.adjustments
    }
}

// ===========================================================================
// Tests
// ===========================================================================
