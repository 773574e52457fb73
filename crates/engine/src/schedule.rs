//! Watering program definitions: which days a program runs, when it
//! starts, and how long each zone waters.

use serde::Serialize;
use time::{OffsetDateTime, Weekday};

/// A program may carry up to this many start times per day.
pub const MAX_START_TIMES: usize = 4;

// ---------------------------------------------------------------------------
// Day selection
// ---------------------------------------------------------------------------

/// Seven-bit day-of-week selection, bit 0 = Sunday through bit 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DayMask(u8);

impl DayMask {
    pub const EVERY_DAY: DayMask = DayMask(0x7f);

    pub fn from_bits(bits: u8) -> Self {
        DayMask(bits & 0x7f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, day: Weekday) -> Self {
        DayMask(self.0 | (1 << day.number_days_from_sunday()))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.number_days_from_sunday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// How a schedule decides whether today is a watering day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Run on the selected weekdays.
    Weekly(DayMask),
    /// Run every N days, anchored on the Julian day number of the local
    /// date so the cadence is unaffected by DST shifts.
    Interval(u8),
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// A persisted watering program. Loaded from the settings collaborator and
/// treated as immutable for the duration of one timeline build.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub enabled: bool,
    /// Scale durations by the weather collaborator's percentage.
    pub weather_adjust: bool,
    pub mode: ScheduleMode,
    /// Start times as minutes since midnight; `None` slots are unused.
    pub start_times: [Option<u16>; MAX_START_TIMES],
    /// Requested watering minutes per zone, in zone order. 0 = skip.
    pub durations: Vec<u8>,
}

impl Schedule {
    /// Whether this schedule wants to run on the given day.
    pub fn runs_on(&self, at: OffsetDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        match self.mode {
            ScheduleMode::Weekly(days) => days.contains(at.weekday()),
            ScheduleMode::Interval(0) => false,
            ScheduleMode::Interval(every) => {
                at.date().to_julian_day().rem_euclid(i32::from(every)) == 0
            }
        }
    }
}

/// An ad-hoc "run now" program: zone durations only, no timing fields,
/// never persisted and never weather-adjusted.
#[derive(Debug, Clone, Default)]
pub struct QuickSchedule {
    pub durations: Vec<u8>,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn weekly(days: DayMask) -> Schedule {
        Schedule {
            name: "test".into(),
            enabled: true,
            weather_adjust: false,
            mode: ScheduleMode::Weekly(days),
            start_times: [None; MAX_START_TIMES],
            durations: vec![10],
        }
    }

    // -- DayMask -----------------------------------------------------------

    #[test]
    fn day_mask_bit_zero_is_sunday() {
        let mask = DayMask::default().with(Weekday::Sunday);
        assert_eq!(mask.bits(), 0x01);
    }

    #[test]
    fn day_mask_bit_six_is_saturday() {
        let mask = DayMask::default().with(Weekday::Saturday);
        assert_eq!(mask.bits(), 0x40);
    }

    #[test]
    fn day_mask_contains_only_set_days() {
        let mask = DayMask::default().with(Weekday::Monday).with(Weekday::Friday);
        assert!(mask.contains(Weekday::Monday));
        assert!(mask.contains(Weekday::Friday));
        assert!(!mask.contains(Weekday::Tuesday));
    }

    #[test]
    fn day_mask_from_bits_truncates_to_seven_bits() {
        assert_eq!(DayMask::from_bits(0xff).bits(), 0x7f);
    }

    // -- runs_on: weekly ---------------------------------------------------

    #[test]
    fn weekly_runs_on_selected_day() {
        // 2026-08-03 is a Monday.
        let sched = weekly(DayMask::default().with(Weekday::Monday));
        assert!(sched.runs_on(datetime!(2026-08-03 08:00 UTC)));
    }

    #[test]
    fn weekly_skips_unselected_day() {
        let sched = weekly(DayMask::default().with(Weekday::Monday));
        assert!(!sched.runs_on(datetime!(2026-08-04 08:00 UTC)));
    }

    #[test]
    fn disabled_schedule_never_runs() {
        let mut sched = weekly(DayMask::EVERY_DAY);
        sched.enabled = false;
        assert!(!sched.runs_on(datetime!(2026-08-03 08:00 UTC)));
    }

    // -- runs_on: interval -------------------------------------------------

    #[test]
    fn interval_one_runs_every_day() {
        let mut sched = weekly(DayMask::default());
        sched.mode = ScheduleMode::Interval(1);
        assert!(sched.runs_on(datetime!(2026-08-03 08:00 UTC)));
        assert!(sched.runs_on(datetime!(2026-08-04 08:00 UTC)));
    }

    #[test]
    fn interval_two_runs_every_other_day() {
        let mut sched = weekly(DayMask::default());
        sched.mode = ScheduleMode::Interval(2);
        let monday = sched.runs_on(datetime!(2026-08-03 08:00 UTC));
        let tuesday = sched.runs_on(datetime!(2026-08-04 08:00 UTC));
        let wednesday = sched.runs_on(datetime!(2026-08-05 08:00 UTC));
        assert_ne!(monday, tuesday);
        assert_eq!(monday, wednesday);
    }

    #[test]
    fn interval_zero_never_runs() {
        let mut sched = weekly(DayMask::default());
        sched.mode = ScheduleMode::Interval(0);
        assert!(!sched.runs_on(datetime!(2026-08-03 08:00 UTC)));
    }
}
