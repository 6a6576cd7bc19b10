//! Loop controller state machine.

use serde::Serialize;

/// Lifecycle state of one `ralph run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    /// Iteration `i` (1-indexed within this run) is next to execute.
    Running(u32),
    /// The model emitted the completion sentinel during `iteration`.
    CompletedBySentinel { iteration: u32 },
    /// `iterations` turns ran without a sentinel and the budget is spent.
    CompletedByBudgetExhaustion { iterations: u32 },
}

impl LoopState {
    /// Initial state for a run bounded by `max_iterations`.
    pub fn start(max_iterations: u32) -> Self {
        if max_iterations == 0 {
            return LoopState::CompletedByBudgetExhaustion { iterations: 0 };
        }
        LoopState::Running(1)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, LoopState::Running(_))
    }

    /// Transition after the current iteration finished.
    ///
    /// The sentinel wins over budget exhaustion on the last iteration.
    /// Terminal states are absorbing.
    pub fn advance(self, sentinel_seen: bool, max_iterations: u32) -> Self {
        match self {
            LoopState::Running(iter) if sentinel_seen => {
                LoopState::CompletedBySentinel { iteration: iter }
            }
            LoopState::Running(iter) if iter >= max_iterations => {
                LoopState::CompletedByBudgetExhaustion { iterations: iter }
            }
            LoopState::Running(iter) => LoopState::Running(iter + 1),
            terminal => terminal,
        }
    }
}
