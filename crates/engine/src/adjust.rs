//! Seasonal/weather duration scaling. Pure arithmetic, no state.

use serde::Serialize;

/// Longest adjusted watering duration, in minutes. Every duration field
/// downstream of the adjuster fits in a single byte because of this clamp.
pub const MAX_ADJUSTED_MINUTES: u8 = 254;

/// The two percentage scale factors applied to a schedule's durations.
/// 100 means "unchanged" for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationAdjustments {
    pub seasonal: u8,
    pub weather: u8,
}

impl Default for DurationAdjustments {
    fn default() -> Self {
        DurationAdjustments {
            seasonal: 100,
            weather: 100,
        }
    }
}

/// Scale per-zone durations by the combined seasonal and weather factors.
///
/// The factors compose multiplicatively: `scale = seasonal * weather / 100`.
/// Each duration becomes `(d * scale + 50) / 100` (round half up), clamped
/// to [`MAX_ADJUSTED_MINUTES`]. A zero duration stays zero no matter the
/// scale; a skipped zone is never watered.
pub fn adjust_durations(durations: &[u8], adj: DurationAdjustments) -> Vec<u8> {
    let scale = u32::from(adj.seasonal) * u32::from(adj.weather) / 100;
    durations
        .iter()
        .map(|&d| {
            let scaled = (u32::from(d) * scale + 50) / 100;
            scaled.min(u32::from(MAX_ADJUSTED_MINUTES)) as u8
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn adj(seasonal: u8, weather: u8) -> DurationAdjustments {
        DurationAdjustments { seasonal, weather }
    }

    #[test]
    fn default_adjustment_is_identity() {
        assert_eq!(
            adjust_durations(&[0, 1, 60, 254], DurationAdjustments::default()),
            vec![0, 1, 60, 254]
        );
    }

    #[test]
    fn half_scale_rounds_half_up() {
        // 15 * 50 / 100 = 7.5 -> 8
        assert_eq!(adjust_durations(&[15], adj(50, 100)), vec![8]);
        // 5 * 50 / 100 = 2.5 -> 3
        assert_eq!(adjust_durations(&[5], adj(100, 50)), vec![3]);
    }

    #[test]
    fn factors_compose_multiplicatively() {
        // scale = 150 * 80 / 100 = 120; 60 * 120 / 100 = 72
        assert_eq!(adjust_durations(&[60], adj(150, 80)), vec![72]);
    }

    #[test]
    fn result_clamps_to_single_byte() {
        assert_eq!(adjust_durations(&[200], adj(200, 100)), vec![254]);
        assert_eq!(adjust_durations(&[254], adj(200, 200)), vec![254]);
    }

    #[test]
    fn zero_duration_stays_zero() {
        assert_eq!(adjust_durations(&[0], adj(200, 200)), vec![0]);
    }

    #[test]
    fn zero_scale_zeroes_everything() {
        assert_eq!(adjust_durations(&[0, 30, 254], adj(0, 100)), vec![0, 0, 0]);
    }

    #[test]
    fn monotonic_in_duration() {
        for scale in [0u8, 25, 50, 100, 150, 200] {
            let out = adjust_durations(
                &[0, 1, 2, 50, 100, 200, 254],
                adj(scale, 100),
            );
            for pair in out.windows(2) {
                assert!(pair[0] <= pair[1], "not monotonic at scale {scale}");
            }
        }
    }
}
