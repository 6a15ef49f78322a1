//! Script runner state machine.

/// Lifecycle of the script worker.
///
/// `Idle -> Running -> Idle` on completion, `Running -> Cancelling -> Idle`
/// on stop, and `Running -> Idle` when the worker faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
    Cancelling,
}

impl ExecutionState {
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}
