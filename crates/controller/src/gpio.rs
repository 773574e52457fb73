//! Output backends. The `gpio` feature gates the real rppal driver;
//! without it, a mock implementation tracks pin state and logs the
//! operations it would have performed.

use anyhow::Result;
use sprinkler_engine::{HwOp, OutputBackend};

use crate::config::Config;

#[cfg(feature = "gpio")]
use anyhow::Context;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};
#[cfg(feature = "gpio")]
use std::collections::HashMap;

/// Build the backend for the configured output mode. Call after
/// `Config::validate`.
pub(crate) fn build(cfg: &Config) -> Result<Box<dyn OutputBackend>> {
    let direct_pins: Vec<u8> = cfg.output_pins().into_iter().filter(|&p| p != 0).collect();
    let shift = cfg
        .controller
        .shift_register
        .as_ref()
        .map(|sr| (sr.clock_pin as u8, sr.data_pin as u8, sr.latch_pin as u8));
    backend(&direct_pins, shift)
}

#[cfg(feature = "gpio")]
fn backend(direct_pins: &[u8], shift: Option<(u8, u8, u8)>) -> Result<Box<dyn OutputBackend>> {
    Ok(Box::new(RppalBackend::new(direct_pins, shift)?))
}

#[cfg(not(feature = "gpio"))]
fn backend(direct_pins: &[u8], shift: Option<(u8, u8, u8)>) -> Result<Box<dyn OutputBackend>> {
    Ok(Box::new(MockBackend::new(direct_pins, shift)))
}

// ---------------------------------------------------------------------------
// Real GPIO backend (production: requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct RppalBackend {
    pins: HashMap<u8, OutputPin>,
    clock: Option<OutputPin>,
    data: Option<OutputPin>,
    latch: Option<OutputPin>,
}

#[cfg(feature = "gpio")]
impl RppalBackend {
    pub(crate) fn new(direct_pins: &[u8], shift: Option<(u8, u8, u8)>) -> Result<Self> {
        let gpio = Gpio::new().context("gpio init failed")?;

        let mut pins = HashMap::new();
        for &pin_num in direct_pins {
            let pin = gpio
                .get(pin_num)
                .with_context(|| format!("gpio pin {pin_num} unavailable"))?
                .into_output();
            pins.insert(pin_num, pin);
        }

        let take = |pin_num: u8| -> Result<OutputPin> {
            let mut pin = gpio
                .get(pin_num)
                .with_context(|| format!("gpio pin {pin_num} unavailable"))?
                .into_output();
            pin.set_low();
            Ok(pin)
        };

        let (clock, data, latch) = match shift {
            Some((c, d, l)) => (Some(take(c)?), Some(take(d)?), Some(take(l)?)),
            None => (None, None, None),
        };

        Ok(Self { pins, clock, data, latch })
    }
}

#[cfg(feature = "gpio")]
impl OutputBackend for RppalBackend {
    fn exec(&mut self, op: HwOp) {
        match op {
            HwOp::SetPin { pin, high } => {
                if let Some(p) = self.pins.get_mut(&pin) {
                    if high {
                        p.set_high();
                    } else {
                        p.set_low();
                    }
                } else {
                    tracing::warn!(pin, "write to unregistered pin dropped");
                }
            }
            HwOp::ShiftBit { high } => {
                if let (Some(clock), Some(data)) = (self.clock.as_mut(), self.data.as_mut()) {
                    clock.set_low();
                    if high {
                        data.set_high();
                    } else {
                        data.set_low();
                    }
                    clock.set_high();
                }
            }
            HwOp::Latch => {
                if let Some(latch) = self.latch.as_mut() {
                    latch.set_high();
                    latch.set_low();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mock backend (development: no hardware, tracks state and logs)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct MockBackend {
    pub(crate) levels: std::collections::HashMap<u8, bool>,
    pub(crate) frame: Vec<bool>,
    pub(crate) latched: Option<Vec<bool>>,
}

#[cfg(not(feature = "gpio"))]
impl MockBackend {
    pub(crate) fn new(direct_pins: &[u8], shift: Option<(u8, u8, u8)>) -> Self {
        for &pin in direct_pins {
            tracing::debug!(pin, "mock gpio: registered output (not wired)");
        }
        if let Some((c, d, l)) = shift {
            tracing::debug!(
                clock = c,
                data = d,
                latch = l,
                "mock gpio: shift register (not wired)"
            );
        }
        Self {
            levels: direct_pins.iter().map(|&p| (p, false)).collect(),
            frame: Vec::new(),
            latched: None,
        }
    }
}

#[cfg(not(feature = "gpio"))]
impl OutputBackend for MockBackend {
    fn exec(&mut self, op: HwOp) {
        match op {
            HwOp::SetPin { pin, high } => {
                tracing::debug!(pin, high, "mock gpio: set pin");
                self.levels.insert(pin, high);
            }
            HwOp::ShiftBit { high } => {
                self.frame.push(high);
            }
            HwOp::Latch => {
                tracing::debug!(bits = self.frame.len(), "mock gpio: latch");
                self.latched = Some(std::mem::take(&mut self.frame));
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
