use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-level state machine for the swap → short → transfer strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for a run
    Idle,
    /// Connecting the perp client
    Initializing,
    /// Step 1 in flight
    ExecutingSwap,
    /// Step 2 in flight
    ExecutingShort,
    /// Step 3 in flight
    ExecutingTransfer,
    /// All steps confirmed
    Success,
    /// Run halted
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::ExecutingSwap => "executing_swap",
            SessionState::ExecutingShort => "executing_short",
            SessionState::ExecutingTransfer => "executing_transfer",
            SessionState::Success => "success",
            SessionState::Error => "error",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            // reset() always returns to idle
            (_, Idle) => true,

            (Idle, Initializing) => true,

            (Initializing, ExecutingSwap) => true,
            (ExecutingSwap, ExecutingShort) => true,
            (ExecutingShort, ExecutingTransfer) => true,
            (ExecutingTransfer, Success) => true,

            // Error from any non-idle, non-terminal state
            (Initializing | ExecutingSwap | ExecutingShort | ExecutingTransfer, Error) => true,

            _ => false,
        }
    }

    /// Executing state for the step at `index`
    pub fn for_step(index: usize) -> Option<SessionState> {
        match index {
            0 => Some(SessionState::ExecutingSwap),
            1 => Some(SessionState::ExecutingShort),
            2 => Some(SessionState::ExecutingTransfer),
            _ => None,
        }
    }

    /// Is a run in progress?
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing
                | SessionState::ExecutingSwap
                | SessionState::ExecutingShort
                | SessionState::ExecutingTransfer
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SessionState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, <Self as TryFrom<&str>>::Error> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionState::Idle),
            "initializing" => Ok(SessionState::Initializing),
            "executing_swap" => Ok(SessionState::ExecutingSwap),
            "executing_short" => Ok(SessionState::ExecutingShort),
            "executing_transfer" => Ok(SessionState::ExecutingTransfer),
            "success" => Ok(SessionState::Success),
            "error" => Ok(SessionState::Error),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState, message: impl Into<String>) -> Self {
        Self {
            from,
            to,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SessionState::*;

        let path = [
            Idle,
            Initializing,
            ExecutingSwap,
            ExecutingShort,
            ExecutingTransfer,
            Success,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_error_transitions() {
        use SessionState::*;

        assert!(!Idle.can_transition_to(Error));
        assert!(Initializing.can_transition_to(Error));
        assert!(ExecutingShort.can_transition_to(Error));
        assert!(!Success.can_transition_to(Error));
        assert!(Error.can_transition_to(Idle));
        assert!(Success.can_transition_to(Idle));
        assert!(!ExecutingSwap.can_transition_to(ExecutingTransfer));
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            SessionState::try_from("EXECUTING_SHORT").unwrap(),
            SessionState::ExecutingShort
        );
        assert!(SessionState::try_from("paused").is_err());
    }

    #[test]
    fn test_for_step() {
        assert_eq!(SessionState::for_step(0), Some(SessionState::ExecutingSwap));
        assert_eq!(SessionState::for_step(2), Some(SessionState::ExecutingTransfer));
        assert_eq!(SessionState::for_step(3), None);
    }
}
