use thiserror::Error;

/// Errors the engine can surface. None of them are fatal: an overflow
/// truncates a build, a bad index turns the offending call into a no-op.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The event store has no room left for another event.
    #[error("event store full ({capacity} slots)")]
    EventOverflow { capacity: usize },

    /// A schedule index referenced a schedule that does not exist.
    #[error("schedule index {index} out of range (have {count})")]
    ScheduleIndex { index: usize, count: usize },
}
