//! The day's event timeline: a fixed-capacity store of pending actions,
//! appended during a build pass and consumed one by one as their minute
//! arrives.

use serde::Serialize;

use crate::error::EngineError;

/// Default number of event slots. Enough for several schedules' worth of
/// zone switches plus their deferred load markers.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EventKind {
    /// Switch a single zone on. `off_time` is the minute the next event
    /// in the run takes over.
    StartZone { zone: u8, off_time: u16 },
    /// Switch every output off and end the running schedule.
    AllOff,
    /// Expand stored schedule `schedule` (start-time slot `start`) into
    /// zone events when this minute arrives.
    LoadSchedule { schedule: u8, start: u8 },
}

/// One pending action. `time` is minutes since the local midnight, not a
/// wall-clock timestamp; a run that accumulates past minute 1439 keeps
/// counting and its tail never becomes due before the midnight rebuild
/// discards it. Runs are bounded to the day they started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub time: u16,
    pub kind: EventKind,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Append-only store with a hard slot limit fixed at construction.
/// Consumed events leave an empty slot behind (no compaction), so stored
/// order is append order and, by construction, time order. The per-tick
/// scan is O(capacity), which is fine at this size and cadence.
#[derive(Debug)]
pub struct EventStore {
    slots: Vec<Option<Event>>,
    capacity: usize,
}

impl EventStore {
    pub fn with_capacity(capacity: usize) -> Self {
        EventStore {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots still available for appending.
    pub fn remaining(&self) -> usize {
        self.capacity - self.slots.len()
    }

    /// Number of appended slots, consumed ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Append an event. Fails (and changes nothing) when every slot is
    /// taken.
    pub fn push(&mut self, event: Event) -> Result<(), EngineError> {
        if self.slots.len() >= self.capacity {
            return Err(EngineError::EventOverflow {
                capacity: self.capacity,
            });
        }
        self.slots.push(Some(event));
        Ok(())
    }

    /// Drop every slot, consumed or not.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// The event at `index`, if that slot is still active.
    pub fn get(&self, index: usize) -> Option<Event> {
        self.slots.get(index).copied().flatten()
    }

    /// Mark the slot at `index` consumed. The slot is not reused.
    pub fn consume(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Push the event at `index` into the future by `minutes`.
    pub fn defer(&mut self, index: usize, minutes: u16) {
        if let Some(Some(event)) = self.slots.get_mut(index) {
            event.time = event.time.saturating_add(minutes);
        }
    }

    /// All still-active events, in stored (= time) order.
    pub fn active(&self) -> impl Iterator<Item = &Event> {
        self.slots.iter().flatten()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
