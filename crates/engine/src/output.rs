//! Physical output abstraction: a logical zone bitmask on one side, a
//! stream of primitive hardware operations on the other.
//!
//! Bit 0 of the mask is the shared pump/master valve; bits 1..=15 are the
//! zone valves. The driver tracks the mask it last committed and writes
//! hardware only on change, so `apply` is safe to call every tick.

use serde::Serialize;
use tracing::warn;

use crate::ports::RunLog;

/// Highest zone number the mask can represent (bit 0 is the pump).
pub const MAX_ZONES: usize = 15;

// ---------------------------------------------------------------------------
// Modes and primitive operations
// ---------------------------------------------------------------------------

/// The wiring variant between the controller and the valves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// No outputs wired; state is tracked and logged only.
    None,
    /// One GPIO pin per output, high = on.
    DirectPositive,
    /// One GPIO pin per output, low = on (common relay boards).
    DirectNegative,
    /// A 16-bit shift register: data is clocked out MSB first, then
    /// latched onto the outputs in one step.
    ShiftRegister,
}

/// A single hardware primitive. Backends execute these; the planning of
/// which ops a mask change produces is pure and lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwOp {
    SetPin { pin: u8, high: bool },
    ShiftBit { high: bool },
    Latch,
}

/// Executes primitive operations against real or mock hardware. Writes
/// are assumed to succeed; fault reporting is the backend's own concern.
pub trait OutputBackend {
    fn exec(&mut self, op: HwOp);
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct OutputDriver {
    mode: OutputMode,
    /// Output pin per mask bit for the direct modes; index 0 is the pump.
    pins: Vec<u8>,
    num_zones: u8,
    current: u16,
    previous: u16,
    /// Forces the first `apply` to drive every output to its off level.
    prime: bool,
    backend: Box<dyn OutputBackend>,
}

impl OutputDriver {
    pub fn new(
        mode: OutputMode,
        pins: Vec<u8>,
        num_zones: u8,
        backend: Box<dyn OutputBackend>,
    ) -> Self {
        OutputDriver {
            mode,
            pins,
            num_zones: num_zones.min(MAX_ZONES as u8),
            current: 0,
            previous: 0,
            prime: true,
            backend,
        }
    }

    // -- Mask manipulation -------------------------------------------------

    /// Request exactly one zone on, everything else off. The pump bit
    /// follows the zone's pump dependency. Out-of-range zones are ignored.
    pub fn turn_on_zone(&mut self, zone: u8, pump_dependent: bool) {
        if zone == 0 || zone > self.num_zones {
            warn!(zone, "ignoring request for out-of-range zone");
            return;
        }
        self.current = 1 << zone;
        if pump_dependent {
            self.current |= 0x01;
        }
    }

    /// Request all outputs off, pump included.
    pub fn turn_off_zones(&mut self) {
        self.current = 0;
    }

    /// Install an arbitrary mask. This is the merge path for concurrent
    /// multi-zone operation; the caller is responsible for the pump bit.
    pub fn set_mask(&mut self, mask: u16) {
        let valid = (1u32 << (self.num_zones + 1)) - 1;
        self.current = mask & valid as u16;
    }

    // -- Queries -----------------------------------------------------------

    pub fn mask(&self) -> u16 {
        self.current
    }

    pub fn is_zone_on(&self, zone: u8) -> bool {
        if zone == 0 || zone > self.num_zones {
            return false;
        }
        self.current & (1 << zone) != 0
    }

    /// The lowest-numbered zone currently on. A mask with only the pump
    /// bit set reports `None`.
    pub fn active_zone(&self) -> Option<u8> {
        (1..=self.num_zones).find(|&n| self.current & (1 << n) != 0)
    }

    // -- Hardware commit ---------------------------------------------------

    /// Write the requested mask out to hardware. A no-op when nothing
    /// changed since the last commit. Each changed zone bit is reported
    /// to the run log after the writes.
    pub fn apply<L: RunLog>(&mut self, log: &mut L) {
        if !self.prime && self.current == self.previous {
            return;
        }

        let changed = self.current ^ self.previous;

        match self.mode {
            OutputMode::None => {}
            OutputMode::DirectPositive | OutputMode::DirectNegative => {
                for bit in 0..=self.num_zones {
                    if !self.prime && changed & (1 << bit) == 0 {
                        continue;
                    }
                    let Some(&pin) = self.pins.get(usize::from(bit)) else {
                        continue;
                    };
                    let on = self.current & (1 << bit) != 0;
                    let high = match self.mode {
                        OutputMode::DirectPositive => on,
                        _ => !on,
                    };
                    self.backend.exec(HwOp::SetPin { pin, high });
                }
            }
            OutputMode::ShiftRegister => {
                for bit in (0..16).rev() {
                    self.backend.exec(HwOp::ShiftBit {
                        high: self.current & (1 << bit) != 0,
                    });
                }
                self.backend.exec(HwOp::Latch);
            }
        }

        for bit in 0..=self.num_zones {
            if changed & (1 << bit) != 0 {
                log.output_change(bit, self.current & (1 << bit) != 0);
            }
        }

        self.previous = self.current;
        self.prime = false;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runstate::ZoneRunRecord;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct TestBackend(Rc<RefCell<Vec<HwOp>>>);

    impl OutputBackend for TestBackend {
        fn exec(&mut self, op: HwOp) {
            self.0.borrow_mut().push(op);
        }
    }

    #[derive(Clone, Default)]
    struct TestLog(Rc<RefCell<Vec<(u8, bool)>>>);

    impl RunLog for TestLog {
        fn zone_run(&mut self, _record: &ZoneRunRecord) {}

        fn output_change(&mut self, zone: u8, on: bool) {
            self.0.borrow_mut().push((zone, on));
        }
    }

    /// Pump on pin 2, zones 1..=3 on pins 3..=5.
    fn driver(mode: OutputMode) -> (OutputDriver, TestBackend, TestLog) {
        let backend = TestBackend::default();
        let driver = OutputDriver::new(mode, vec![2, 3, 4, 5], 3, Box::new(backend.clone()));
        (driver, backend, TestLog::default())
    }

    fn drained(backend: &TestBackend) -> Vec<HwOp> {
        backend.0.borrow_mut().drain(..).collect()
    }

    // -- Priming -----------------------------------------------------------

    #[test]
    fn first_apply_writes_every_pin_off() {
        let (mut driver, backend, mut log) = driver(OutputMode::DirectPositive);
        driver.apply(&mut log);
        let ops = drained(&backend);
        assert_eq!(
            ops,
            vec![
                HwOp::SetPin { pin: 2, high: false },
                HwOp::SetPin { pin: 3, high: false },
                HwOp::SetPin { pin: 4, high: false },
                HwOp::SetPin { pin: 5, high: false },
            ]
        );
        // Forcing outputs to their existing logical level is not a change.
        assert!(log.0.borrow().is_empty());
    }

    #[test]
    fn priming_inverts_levels_for_negative_logic() {
        let (mut driver, backend, mut log) = driver(OutputMode::DirectNegative);
        driver.apply(&mut log);
        let ops = drained(&backend);
        assert!(ops
            .iter()
            .all(|op| matches!(op, HwOp::SetPin { high: true, .. })));
    }

    // -- Change-only writes ------------------------------------------------

    #[test]
    fn apply_twice_writes_hardware_once() {
        let (mut driver, backend, mut log) = driver(OutputMode::DirectPositive);
        driver.apply(&mut log);
        drained(&backend);

        driver.turn_on_zone(2, false);
        driver.apply(&mut log);
        assert_eq!(drained(&backend), vec![HwOp::SetPin { pin: 4, high: true }]);
        assert_eq!(log.0.borrow().as_slice(), &[(2, true)]);

        // Second apply with no intervening change: no writes, no records.
        driver.apply(&mut log);
        assert!(drained(&backend).is_empty());
        assert_eq!(log.0.borrow().len(), 1);
    }

    #[test]
    fn zone_swap_writes_only_the_two_changed_pins() {
        let (mut driver, backend, mut log) = driver(OutputMode::DirectPositive);
        driver.apply(&mut log);
        drained(&backend);

        driver.turn_on_zone(1, false);
        driver.apply(&mut log);
        drained(&backend);

        driver.turn_on_zone(3, false);
        driver.apply(&mut log);
        let ops = drained(&backend);
        assert_eq!(
            ops,
            vec![
                HwOp::SetPin { pin: 3, high: false },
                HwOp::SetPin { pin: 5, high: true },
            ]
        );
    }

    // -- Exclusive single-zone masks ---------------------------------------

    #[test]
    fn turn_on_zone_is_exclusive() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.turn_on_zone(1, false);
        driver.turn_on_zone(3, false);
        assert!(!driver.is_zone_on(1));
        assert!(driver.is_zone_on(3));
        assert_eq!(driver.mask(), 0b1000);
    }

    #[test]
    fn pump_dependent_zone_raises_pump_bit() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.turn_on_zone(2, true);
        assert_eq!(driver.mask(), 0b0101);
        assert_eq!(driver.active_zone(), Some(2));
    }

    #[test]
    fn turn_off_clears_mask_regardless_of_pump() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.turn_on_zone(2, true);
        driver.turn_off_zones();
        assert_eq!(driver.mask(), 0);
        assert_eq!(driver.active_zone(), None);
    }

    #[test]
    fn out_of_range_zone_is_ignored() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.turn_on_zone(0, false);
        driver.turn_on_zone(9, false);
        assert_eq!(driver.mask(), 0);
        assert!(!driver.is_zone_on(9));
    }

    #[test]
    fn pump_only_mask_reports_no_active_zone() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.set_mask(0x01);
        assert_eq!(driver.active_zone(), None);
    }

    #[test]
    fn set_mask_truncates_to_configured_range() {
        let (mut driver, _backend, _log) = driver(OutputMode::None);
        driver.set_mask(0xffff);
        assert_eq!(driver.mask(), 0b1111);
    }

    // -- Shift register ----------------------------------------------------

    #[test]
    fn shift_register_sends_sixteen_bits_msb_first_then_latches() {
        let (mut driver, backend, mut log) = driver(OutputMode::ShiftRegister);
        driver.apply(&mut log);
        drained(&backend);

        driver.turn_on_zone(1, true); // mask 0b11
        driver.apply(&mut log);
        let ops = drained(&backend);
        assert_eq!(ops.len(), 17);
        assert_eq!(ops[16], HwOp::Latch);
        // Bits 15..2 are low, bits 1 and 0 (sent last) are high.
        assert!(ops[..14]
            .iter()
            .all(|op| matches!(op, HwOp::ShiftBit { high: false })));
        assert_eq!(ops[14], HwOp::ShiftBit { high: true });
        assert_eq!(ops[15], HwOp::ShiftBit { high: true });
    }

    // -- Transition records ------------------------------------------------

    #[test]
    fn log_records_every_changed_bit() {
        let (mut driver, _backend, mut log) = driver(OutputMode::None);
        driver.apply(&mut log);

        driver.turn_on_zone(2, true);
        driver.apply(&mut log);
        assert_eq!(log.0.borrow().as_slice(), &[(0, true), (2, true)]);

        driver.turn_off_zones();
        driver.apply(&mut log);
        assert_eq!(
            log.0.borrow().as_slice(),
            &[(0, true), (2, true), (0, false), (2, false)]
        );
    }
}
