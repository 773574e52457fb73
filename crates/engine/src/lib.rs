//! Minute-resolution irrigation scheduling engine.
//!
//! The engine decides which watering zones (and the shared pump) are
//! energized at any moment, based on stored weekly/interval schedules,
//! seasonal and weather duration scaling, and manual overrides. It is
//! synchronous and I/O-free: the clock, the weather scale, the run log,
//! and the output hardware all enter through traits, so the whole engine
//! runs under plain unit tests.
//!
//! The embedding binary owns the heartbeat: call [`Scheduler::tick`] at
//! least once per minute and the engine does the rest: the midnight
//! timeline rebuild, due-event dispatch, and change-only hardware writes.

pub mod adjust;
pub mod engine;
pub mod error;
pub mod event;
pub mod output;
pub mod ports;
pub mod runstate;
pub mod schedule;

pub use adjust::{adjust_durations, DurationAdjustments, MAX_ADJUSTED_MINUTES};
pub use engine::{Scheduler, Settings, Status, ZoneSettings};
pub use error::EngineError;
pub use event::{Event, EventKind, EventStore, DEFAULT_EVENT_CAPACITY};
pub use output::{HwOp, OutputBackend, OutputDriver, OutputMode, MAX_ZONES};
pub use ports::{minute_of_day, Clock, RunLog, WeatherAdjust};
pub use runstate::{RunMode, RunSource, RunState, ZoneRunRecord};
pub use schedule::{DayMask, QuickSchedule, Schedule, ScheduleMode, MAX_START_TIMES};
