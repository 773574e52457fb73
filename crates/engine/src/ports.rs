//! Collaborator traits. The engine never talks to a clock, a weather
//! service, or a log store directly; the controller binary injects
//! implementations of these at construction time, and tests inject fakes.

use time::OffsetDateTime;

use crate::runstate::ZoneRunRecord;

/// Source of the current wall-clock time. The engine reads it at every
/// tick; keeping time synchronized (NTP or otherwise) is the
/// implementation's problem.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

/// Weather-based watering scale factor, in percent (100 = no change).
/// Consulted only for schedules that opt in to weather adjustment.
pub trait WeatherAdjust {
    fn scale_percent(&self) -> u8;
}

/// Destination for run history: completed zone segments and physical
/// output transitions.
pub trait RunLog {
    /// A zone segment just ended (the run state is about to change).
    fn zone_run(&mut self, record: &ZoneRunRecord);

    /// An output bit changed level. `zone` 0 is the shared pump.
    fn output_change(&mut self, zone: u8, on: bool);
}

/// Minutes elapsed since the most recent local midnight, 0..=1439.
pub fn minute_of_day(at: OffsetDateTime) -> u16 {
    u16::from(at.hour()) * 60 + u16::from(at.minute())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn minute_of_day_at_midnight() {
        assert_eq!(minute_of_day(datetime!(2026-08-03 00:00 UTC)), 0);
    }

    #[test]
    fn minute_of_day_mid_morning() {
        assert_eq!(minute_of_day(datetime!(2026-08-03 06:30 UTC)), 390);
    }

    #[test]
    fn minute_of_day_last_minute() {
        assert_eq!(minute_of_day(datetime!(2026-08-03 23:59:59 UTC)), 1439);
    }
}
