//! Engine run states.

use std::fmt;

/// Progress of one estimate.
///
/// `Init -> DurationChecked -> Sampling -> Correlating(window)... ->
/// Aggregating -> Done`. `Aborted` follows an invalid configuration, the
/// duration ceiling (after `DurationChecked`) or any window failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    DurationChecked,
    Sampling,
    Correlating { window: usize, total: usize },
    Aggregating,
    Done,
    Aborted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Init => write!(f, "Init"),
            EngineState::DurationChecked => write!(f, "Duration checked"),
            EngineState::Sampling => write!(f, "Sampling"),
            EngineState::Correlating { window, total } => {
                write!(f, "Correlating window {}/{}", window + 1, total)
            }
            EngineState::Aggregating => write!(f, "Aggregating"),
            EngineState::Done => write!(f, "Done"),
            EngineState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Receives every state transition. Called from worker threads in parallel mode.
pub type StateCallback = Box<dyn Fn(EngineState) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlating_is_one_based_for_display() {
        let state = EngineState::Correlating { window: 0, total: 6 };
        assert_eq!(state.to_string(), "Correlating window 1/6");
    }
}
