//! TOML config file loading, validation, and conversion into engine
//! settings: zones, schedules, and controller-wide options.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use time::Weekday;

use sprinkler_engine::{
    DayMask, OutputMode, Schedule, ScheduleMode, Settings, ZoneSettings, MAX_START_TIMES,
    MAX_ZONES,
};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    pub controller: ControllerEntry,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ControllerEntry {
    /// One of "none", "direct-positive", "direct-negative", "shift-register".
    pub output: String,
    #[serde(default = "default_true")]
    pub run_schedules: bool,
    #[serde(default = "default_percent")]
    pub seasonal_percent: u8,
    #[serde(default = "default_percent")]
    pub weather_percent: u8,
    #[serde(default)]
    pub utc_offset_hours: i8,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Pin for the shared pump/master valve relay (direct modes).
    pub pump_gpio_pin: Option<i64>,
    /// Where to write the JSON status snapshot. Omit to disable.
    pub status_path: Option<String>,
    pub shift_register: Option<ShiftRegisterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ShiftRegisterEntry {
    pub clock_pin: i64,
    pub data_pin: i64,
    pub latch_pin: i64,
}

#[derive(Debug, Deserialize)]
pub struct ZoneEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Run the shared pump whenever this zone is watering.
    #[serde(default)]
    pub pump: bool,
    pub gpio_pin: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub weather_adjust: bool,
    /// Weekday names; mutually exclusive with `interval_days`.
    #[serde(default)]
    pub days: Vec<String>,
    /// Run every N days; mutually exclusive with `days`.
    pub interval_days: Option<u8>,
    /// "HH:MM" local start times, up to four.
    pub start_times: Vec<String>,
    /// Watering minutes per zone, in zone order. 0 = skip.
    pub durations_min: Vec<i64>,
}

fn default_true() -> bool {
    true
}

fn default_percent() -> u8 {
    100
}

fn default_event_capacity() -> usize {
    32
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

const MAX_ZONE_MINUTES: i64 = 254;
const MAX_PERCENT: u8 = 200;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn load(path: &str) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    let cfg: Config =
        toml::from_str(&text).with_context(|| format!("failed to parse config file {path}"))?;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_controller(&mut errors);
        self.validate_zones(&mut errors);
        self.validate_schedules(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_controller(&self, errors: &mut Vec<String>) {
        let c = &self.controller;

        let mode = c.output_mode();
        if mode.is_none() {
            errors.push(format!(
                "controller: unknown output mode '{}' (expected none, \
                 direct-positive, direct-negative or shift-register)",
                c.output
            ));
        }

        if c.seasonal_percent > MAX_PERCENT {
            errors.push(format!(
                "controller: seasonal_percent {} out of range [0, {MAX_PERCENT}]",
                c.seasonal_percent
            ));
        }
        if c.weather_percent > MAX_PERCENT {
            errors.push(format!(
                "controller: weather_percent {} out of range [0, {MAX_PERCENT}]",
                c.weather_percent
            ));
        }

        if !(-12..=14).contains(&c.utc_offset_hours) {
            errors.push(format!(
                "controller: utc_offset_hours {} out of range [-12, 14]",
                c.utc_offset_hours
            ));
        }

        if !(4..=256).contains(&c.event_capacity) {
            errors.push(format!(
                "controller: event_capacity {} out of range [4, 256]",
                c.event_capacity
            ));
        }

        match (mode, &c.shift_register) {
            (Some(OutputMode::ShiftRegister), None) => {
                errors.push(
                    "controller: output is shift-register but no [controller.shift_register] \
                     pin block is configured"
                        .to_string(),
                );
            }
            (_, Some(sr)) => {
                for (label, pin) in [
                    ("clock_pin", sr.clock_pin),
                    ("data_pin", sr.data_pin),
                    ("latch_pin", sr.latch_pin),
                ] {
                    if !VALID_GPIO_PINS.contains(&pin) {
                        errors.push(format!(
                            "shift_register: {label} {pin} is not a valid BCM GPIO pin \
                             (allowed: 2-27)"
                        ));
                    }
                }
                if sr.clock_pin == sr.data_pin
                    || sr.clock_pin == sr.latch_pin
                    || sr.data_pin == sr.latch_pin
                {
                    errors.push("shift_register: pins must be distinct".to_string());
                }
            }
            _ => {}
        }
    }

    fn validate_zones(&self, errors: &mut Vec<String>) {
        if self.zones.is_empty() {
            errors.push("zones: no zones configured".to_string());
        }
        if self.zones.len() > MAX_ZONES {
            errors.push(format!(
                "zones: {} zones configured, at most {MAX_ZONES} supported",
                self.zones.len()
            ));
        }

        let direct = matches!(
            self.controller.output_mode(),
            Some(OutputMode::DirectPositive) | Some(OutputMode::DirectNegative)
        );

        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut seen_pins: HashSet<i64> = HashSet::new();

        if let Some(pin) = self.controller.pump_gpio_pin {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "controller: pump_gpio_pin {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else {
                seen_pins.insert(pin);
            }
        } else if direct && self.zones.iter().any(|z| z.pump) {
            errors.push(
                "controller: a zone is pump-dependent but pump_gpio_pin is not set".to_string(),
            );
        }

        for (i, z) in self.zones.iter().enumerate() {
            let ctx = || {
                if z.name.is_empty() {
                    format!("zones[{i}]")
                } else {
                    format!("zone '{}'", z.name)
                }
            };

            if z.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            } else if !seen_names.insert(&z.name) {
                errors.push(format!("{}: duplicate name", ctx()));
            }

            match z.gpio_pin {
                Some(pin) => {
                    if !VALID_GPIO_PINS.contains(&pin) {
                        errors.push(format!(
                            "{}: gpio_pin {pin} is not a valid BCM GPIO pin (allowed: 2-27)",
                            ctx()
                        ));
                    } else if !seen_pins.insert(pin) {
                        errors.push(format!(
                            "{}: gpio_pin {pin} is already used by another output",
                            ctx()
                        ));
                    }
                }
                None => {
                    if direct {
                        errors.push(format!(
                            "{}: gpio_pin is required for direct output modes",
                            ctx()
                        ));
                    }
                }
            }
        }
    }

    fn validate_schedules(&self, errors: &mut Vec<String>) {
        let mut seen_names: HashSet<&str> = HashSet::new();

        for (i, s) in self.schedules.iter().enumerate() {
            let ctx = || {
                if s.name.is_empty() {
                    format!("schedules[{i}]")
                } else {
                    format!("schedule '{}'", s.name)
                }
            };

            if s.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            } else if !seen_names.insert(&s.name) {
                errors.push(format!("{}: duplicate name", ctx()));
            }

            // ── Day selection: weekly or interval, never both ─────
            match (s.days.is_empty(), s.interval_days) {
                (true, None) => {
                    errors.push(format!(
                        "{}: set either days or interval_days",
                        ctx()
                    ));
                }
                (false, Some(_)) => {
                    errors.push(format!(
                        "{}: days and interval_days are mutually exclusive",
                        ctx()
                    ));
                }
                (false, None) => {
                    for day in &s.days {
                        if parse_day(day).is_none() {
                            errors.push(format!("{}: unknown day '{day}'", ctx()));
                        }
                    }
                }
                (true, Some(n)) => {
                    if n == 0 {
                        errors.push(format!("{}: interval_days must be at least 1", ctx()));
                    }
                }
            }

            // ── Start times ───────────────────────────────────────
            if s.start_times.is_empty() {
                errors.push(format!("{}: no start times", ctx()));
            }
            if s.start_times.len() > MAX_START_TIMES {
                errors.push(format!(
                    "{}: {} start times, at most {MAX_START_TIMES} supported",
                    ctx(),
                    s.start_times.len()
                ));
            }
            for t in &s.start_times {
                if parse_start_time(t).is_none() {
                    errors.push(format!("{}: invalid start time '{t}' (expected HH:MM)", ctx()));
                }
            }

            // ── Durations ─────────────────────────────────────────
            if s.durations_min.len() != self.zones.len() {
                errors.push(format!(
                    "{}: {} durations for {} zones",
                    ctx(),
                    s.durations_min.len(),
                    self.zones.len()
                ));
            }
            for &d in &s.durations_min {
                if !(0..=MAX_ZONE_MINUTES).contains(&d) {
                    errors.push(format!(
                        "{}: duration {d} out of range [0, {MAX_ZONE_MINUTES}] minutes",
                        ctx()
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion into engine types
// ---------------------------------------------------------------------------

impl ControllerEntry {
    pub fn output_mode(&self) -> Option<OutputMode> {
        match self.output.as_str() {
            "none" => Some(OutputMode::None),
            "direct-positive" => Some(OutputMode::DirectPositive),
            "direct-negative" => Some(OutputMode::DirectNegative),
            "shift-register" => Some(OutputMode::ShiftRegister),
            _ => None,
        }
    }
}

impl Config {
    /// Engine-facing settings snapshot. Call after `validate`.
    pub fn to_settings(&self) -> Settings {
        Settings {
            run_schedules: self.controller.run_schedules,
            seasonal_percent: self.controller.seasonal_percent,
            zones: self
                .zones
                .iter()
                .map(|z| ZoneSettings {
                    name: z.name.clone(),
                    enabled: z.enabled,
                    pump: z.pump,
                })
                .collect(),
            schedules: self.schedules.iter().map(schedule_from_entry).collect(),
        }
    }

    /// Output pin per mask bit: index 0 is the pump, then the zones in
    /// order. Unwired outputs get pin 0, which no backend registers.
    pub fn output_pins(&self) -> Vec<u8> {
        let mut pins = Vec::with_capacity(self.zones.len() + 1);
        pins.push(self.controller.pump_gpio_pin.unwrap_or(0) as u8);
        for z in &self.zones {
            pins.push(z.gpio_pin.unwrap_or(0) as u8);
        }
        pins
    }
}

fn schedule_from_entry(e: &ScheduleEntry) -> Schedule {
    let mode = match e.interval_days {
        Some(n) => ScheduleMode::Interval(n),
        None => ScheduleMode::Weekly(
            e.days
                .iter()
                .filter_map(|d| parse_day(d))
                .fold(DayMask::default(), DayMask::with),
        ),
    };

    let mut start_times = [None; MAX_START_TIMES];
    for (slot, t) in e.start_times.iter().take(MAX_START_TIMES).enumerate() {
        start_times[slot] = parse_start_time(t);
    }

    Schedule {
        name: e.name.clone(),
        enabled: e.enabled,
        weather_adjust: e.weather_adjust,
        mode,
        start_times,
        durations: e
            .durations_min
            .iter()
            .map(|&d| d.clamp(0, MAX_ZONE_MINUTES) as u8)
            .collect(),
    }
}

fn parse_day(day: &str) -> Option<Weekday> {
    match day.to_ascii_lowercase().as_str() {
        "sun" | "sunday" => Some(Weekday::Sunday),
        "mon" | "monday" => Some(Weekday::Monday),
        "tue" | "tuesday" => Some(Weekday::Tuesday),
        "wed" | "wednesday" => Some(Weekday::Wednesday),
        "thu" | "thursday" => Some(Weekday::Thursday),
        "fri" | "friday" => Some(Weekday::Friday),
        "sat" | "saturday" => Some(Weekday::Saturday),
        _ => None,
    }
}

/// Parse "HH:MM" into minutes since midnight.
fn parse_start_time(text: &str) -> Option<u16> {
    let (hh, mm) = text.split_once(':')?;
    let hours: u16 = hh.parse().ok()?;
    let minutes: u16 = mm.parse().ok()?;
    if hours > 23 || minutes > 59 || mm.len() != 2 {
        return None;
    }
    Some(hours * 60 + minutes)
}

// ===========================================================================
// Tests
// ===========================================================================
