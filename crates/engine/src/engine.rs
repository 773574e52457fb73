//! The scheduling engine proper: builds the day's event timeline from the
//! stored schedules and dispatches due events on every tick.
//!
//! ## Event flow
//!
//! ```text
//! midnight ──▶ reload_events ──▶ [LoadSchedule @ start-time] ──▶ expand
//!                                                                  │
//!                        [StartZone @ t, StartZone @ t+d, AllOff] ◀┘
//!                                       │
//! tick ──▶ process due events ──────────┴──▶ output driver + run state
//! ```
//!
//! The tick is idempotent within a minute and catches up after gaps by
//! processing every overdue event in stored order in a single pass. A
//! run that accumulates past minute 1439 keeps its tail events in the
//! store, but they never come due and the midnight rebuild discards
//! them: timelines are bounded to the day they were built for.

use tracing::{debug, error, info, warn};

use crate::adjust::{adjust_durations, DurationAdjustments};
use crate::error::EngineError;
use crate::event::{Event, EventKind, EventStore};
use crate::output::{OutputDriver, MAX_ZONES};
use crate::ports::{minute_of_day, Clock, RunLog, WeatherAdjust};
use crate::runstate::{RunMode, RunSource, RunState};
use crate::schedule::{QuickSchedule, Schedule};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-zone configuration, read from the settings collaborator.
#[derive(Debug, Clone)]
pub struct ZoneSettings {
    pub name: String,
    pub enabled: bool,
    /// Energize the shared pump whenever this zone is on.
    pub pump: bool,
}

/// Everything the engine reads from the outside world per call. Owned by
/// the persistence/config collaborator; the engine never mutates it.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Global enable for automatic schedules. Manual runs ignore it.
    pub run_schedules: bool,
    pub seasonal_percent: u8,
    /// Zone 1 is `zones[0]`.
    pub zones: Vec<ZoneSettings>,
    pub schedules: Vec<Schedule>,
}

/// Read-only snapshot of the engine for external observers.
#[derive(Debug, Serialize)]
pub struct Status {
    pub mode: RunMode,
    pub zone: Option<u8>,
    pub end_time: Option<u16>,
    pub mask: u16,
    pub events: Vec<Event>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<C: Clock, W: WeatherAdjust, L: RunLog> {
    clock: C,
    weather: W,
    log: L,
    events: EventStore,
    run_state: RunState,
    output: OutputDriver,
    midnight_done: bool,
}

impl<C: Clock, W: WeatherAdjust, L: RunLog> Scheduler<C, W, L> {
    pub fn new(
        clock: C,
        weather: W,
        log: L,
        output: OutputDriver,
        event_capacity: usize,
    ) -> Self {
        Scheduler {
            clock,
            weather,
            log,
            events: EventStore::with_capacity(event_capacity),
            run_state: RunState::new(),
            output,
            midnight_done: false,
        }
    }

    /// First-boot sequence: outputs forced off, a fresh timeline for the
    /// rest of today (start times already behind us stay skipped), and an
    /// initial hardware commit.
    pub fn start(&mut self, settings: &Settings) {
        info!(
            zones = settings.zones.len(),
            schedules = settings.schedules.len(),
            "scheduler started"
        );
        self.reload_events(settings, false);
        self.output.apply(&mut self.log);
    }

    /// One heartbeat. Call at least once per minute; calling faster is
    /// fine (re-scans are cheap and consumed events stay consumed).
    pub fn tick(&mut self, settings: &Settings) {
        let now = self.clock.now();
        if now.hour() == 0 && !self.midnight_done {
            info!("midnight: rebuilding today's timeline");
            self.midnight_done = true;
            self.reload_events(settings, true);
        } else if now.hour() != 0 {
            // Re-arm for the next midnight.
            self.midnight_done = false;
        }

        self.process_events(settings);
        self.output.apply(&mut self.log);
    }

    // -- Timeline building -------------------------------------------------

    /// Rebuild today's timeline from scratch. Each matching (schedule,
    /// start time) pair is registered as a deferred load marker, not
    /// expanded; zone events materialize when the start minute arrives.
    /// With `all` false, start times already in the past are skipped,
    /// used after mid-day settings edits so finished runs don't repeat.
    pub fn reload_events(&mut self, settings: &Settings, all: bool) {
        self.clear_events();
        self.output.turn_off_zones();

        if !settings.run_schedules {
            debug!("schedules globally disabled, timeline left empty");
            return;
        }

        let now = self.clock.now();
        let now_minute = minute_of_day(now);

        for (i, sched) in settings.schedules.iter().enumerate() {
            if !sched.runs_on(now) {
                continue;
            }
            for (j, start) in sched.start_times.iter().enumerate() {
                let Some(start) = *start else { continue };
                if !all && start <= now_minute {
                    continue;
                }
                let event = Event {
                    time: start,
                    kind: EventKind::LoadSchedule {
                        schedule: i as u8,
                        start: j as u8,
                    },
                };
                if let Err(err) = self.events.push(event) {
                    error!(schedule = %sched.name, start, %err, "dropping start time");
                }
            }
        }
    }

    /// Expand one stored schedule into zone events starting now, with
    /// seasonal and (if the schedule opts in) weather adjustment applied.
    pub fn load_schedule_events(
        &mut self,
        settings: &Settings,
        index: usize,
    ) -> Result<(), EngineError> {
        let sched = settings
            .schedules
            .get(index)
            .ok_or(EngineError::ScheduleIndex {
                index,
                count: settings.schedules.len(),
            })?;

        let adj = DurationAdjustments {
            seasonal: settings.seasonal_percent,
            weather: if sched.weather_adjust {
                self.weather.scale_percent()
            } else {
                100
            },
        };
        let durations = adjust_durations(&sched.durations, adj);
        self.expand(settings, &durations, adj, RunSource::Stored(index as u8));
        Ok(())
    }

    /// Expand an ad-hoc run starting now. Quick runs are never adjusted.
    pub fn load_quick_events(&mut self, settings: &Settings, quick: &QuickSchedule) {
        self.expand(
            settings,
            &quick.durations,
            DurationAdjustments::default(),
            RunSource::Quick,
        );
    }

    /// Drop the whole timeline and leave the run state idle.
    pub fn clear_events(&mut self) {
        self.events.clear();
        let now = self.clock.now();
        self.run_state
            .set_schedule(false, None, DurationAdjustments::default(), now, &mut self.log);
    }

    /// Append one `StartZone` event per watered zone and a terminating
    /// `AllOff`. A slot is always held back for the `AllOff`, so a full
    /// store truncates the zone list but never the turn-off.
    fn expand(
        &mut self,
        settings: &Settings,
        durations: &[u8],
        adj: DurationAdjustments,
        source: RunSource,
    ) {
        let now = self.clock.now();
        let mut cursor = minute_of_day(now);

        for (k, zone) in settings.zones.iter().enumerate().take(MAX_ZONES) {
            let minutes = durations.get(k).copied().unwrap_or(0);
            if !zone.enabled || minutes == 0 {
                continue;
            }
            if self.events.remaining() <= 1 {
                error!(
                    zone = k + 1,
                    capacity = self.events.capacity(),
                    "event store full, dropping remaining zones for this run"
                );
                break;
            }
            let off_time = cursor.saturating_add(u16::from(minutes));
            let event = Event {
                time: cursor,
                kind: EventKind::StartZone {
                    zone: (k + 1) as u8,
                    off_time,
                },
            };
            if self.events.push(event).is_err() {
                break;
            }
            cursor = off_time;
        }

        if let Err(err) = self
            .events
            .push(Event { time: cursor, kind: EventKind::AllOff })
        {
            error!(%err, "no room for the terminating all-off event");
        }

        self.run_state
            .set_schedule(true, Some(source), adj, now, &mut self.log);
    }

    // -- Event dispatch ----------------------------------------------------

    /// Process every active event that has come due, in stored order.
    /// Events appended mid-scan (by a schedule expansion) are picked up in
    /// the same pass when they are already due.
    fn process_events(&mut self, settings: &Settings) {
        let now_minute = minute_of_day(self.clock.now());
        let mut i = 0;
        while i < self.events.len() {
            let Some(event) = self.events.get(i) else {
                i += 1;
                continue;
            };
            if event.time > now_minute {
                i += 1;
                continue;
            }

            match event.kind {
                EventKind::StartZone { zone, off_time } => {
                    let pump = settings
                        .zones
                        .get(usize::from(zone).wrapping_sub(1))
                        .map(|z| z.pump)
                        .unwrap_or(false);
                    debug!(zone, off_time, "zone on");
                    self.output.turn_on_zone(zone, pump);
                    let now = self.clock.now();
                    self.run_state
                        .continue_schedule(zone, off_time, now, &mut self.log);
                    self.events.consume(i);
                }
                EventKind::AllOff => {
                    debug!("all zones off");
                    self.output.turn_off_zones();
                    let now = self.clock.now();
                    self.run_state.set_schedule(
                        false,
                        None,
                        DurationAdjustments::default(),
                        now,
                        &mut self.log,
                    );
                    self.events.consume(i);
                }
                EventKind::LoadSchedule { schedule, start } => {
                    if self.run_state.is_schedule() {
                        // Another schedule is mid-run; try again next minute.
                        self.events.defer(i, 1);
                    } else {
                        self.events.consume(i);
                        if let Err(err) =
                            self.load_schedule_events(settings, usize::from(schedule))
                        {
                            warn!(schedule, start, %err, "skipping schedule load");
                        }
                    }
                }
            }
            i += 1;
        }
    }

    // -- Manual runs -------------------------------------------------------

    /// Turn one zone on by hand. Interrupts whatever was running (the
    /// interrupted segment is logged by the run-state transition).
    pub fn start_manual(&mut self, settings: &Settings, zone: u8) {
        let Some(cfg) = settings.zones.get(usize::from(zone).wrapping_sub(1)) else {
            warn!(zone, "manual start for unknown zone ignored");
            return;
        };
        info!(zone, name = %cfg.name, "manual run started");
        self.output.turn_on_zone(zone, cfg.pump);
        let now = self.clock.now();
        self.run_state.set_manual(true, zone, now, &mut self.log);
        self.output.apply(&mut self.log);
    }

    /// End a manual run and turn everything off.
    pub fn stop_manual(&mut self) {
        info!("manual run stopped");
        self.output.turn_off_zones();
        let now = self.clock.now();
        self.run_state.set_manual(false, 0, now, &mut self.log);
        self.output.apply(&mut self.log);
    }

    /// Force every output off and commit immediately. Fail-safe path for
    /// shutdown and error handling.
    pub fn all_off(&mut self) {
        self.output.turn_off_zones();
        self.output.apply(&mut self.log);
    }

    // -- Queries -----------------------------------------------------------

    pub fn is_zone_on(&self, zone: u8) -> bool {
        self.output.is_zone_on(zone)
    }

    pub fn active_zone(&self) -> Option<u8> {
        self.output.active_zone()
    }

    pub fn is_schedule(&self) -> bool {
        self.run_state.is_schedule()
    }

    pub fn is_manual(&self) -> bool {
        self.run_state.is_manual()
    }

    /// The zone the run-state tracker considers active.
    pub fn run_zone(&self) -> Option<u8> {
        self.run_state.zone()
    }

    /// The minute the current zone segment ends, if a schedule is running.
    pub fn end_time(&self) -> Option<u16> {
        self.run_state.end_time()
    }

    /// Pending events, for diagnostics.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.active()
    }

    pub fn status(&self) -> Status {
        Status {
            mode: self.run_state.mode(),
            zone: self.run_state.zone(),
            end_time: self.run_state.end_time(),
            mask: self.output.mask(),
            events: self.events.active().copied().collect(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
