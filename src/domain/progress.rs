use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one step in a sequential run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started yet
    Pending,
    /// Fetching the anti-replay token and building the transaction
    Building,
    /// Waiting for the signer to approve
    Signing,
    /// Simulating, then broadcasting
    Submitting,
    /// Waiting for network confirmation
    Confirming,
    /// Included and executed without error
    Confirmed,
    /// Halted the run
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Building => "building",
            StepStatus::Signing => "signing",
            StepStatus::Submitting => "submitting",
            StepStatus::Confirming => "confirming",
            StepStatus::Confirmed => "confirmed",
            StepStatus::Failed => "failed",
        }
    }

    /// Position in the forward pipeline
    fn rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Building => 1,
            StepStatus::Signing => 2,
            StepStatus::Submitting => 3,
            StepStatus::Confirming => 4,
            StepStatus::Confirmed => 5,
            StepStatus::Failed => 6,
        }
    }

    /// Check if this status can advance to `target`.
    ///
    /// Steps only move forward one phase at a time; `Failed` is reachable
    /// from any non-terminal status.
    pub fn can_transition_to(&self, target: StepStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if target == StepStatus::Failed {
            return true;
        }
        target.rank() == self.rank() + 1
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Confirmed | StepStatus::Failed)
    }

    /// Started but not finished
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != StepStatus::Pending
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress record for one step, mutated only by the engine while it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepProgress {
    pub fn pending(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: StepStatus::Pending,
            signature: None,
            error: None,
        }
    }
}

/// Outcome of a sequential run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub transactions: Vec<StepProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_index: Option<usize>,
}

impl ExecutionResult {
    /// Failure before any step ran
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transactions: Vec::new(),
            error: Some(error.into()),
            failed_at_index: None,
        }
    }

    /// Signature recorded for the step at `index`, confirmed or not
    pub fn signature_at(&self, index: usize) -> Option<&str> {
        self.transactions
            .get(index)
            .and_then(|t| t.signature.as_deref())
    }

    /// Signatures of every confirmed step, in order
    pub fn confirmed_signatures(&self) -> Vec<&str> {
        self.transactions
            .iter()
            .filter(|t| t.status == StepStatus::Confirmed)
            .filter_map(|t| t.signature.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use StepStatus::*;

        assert!(Pending.can_transition_to(Building));
        assert!(Building.can_transition_to(Signing));
        assert!(Signing.can_transition_to(Submitting));
        assert!(Submitting.can_transition_to(Confirming));
        assert!(Confirming.can_transition_to(Confirmed));

        // No skipping or moving backward
        assert!(!Pending.can_transition_to(Signing));
        assert!(!Confirming.can_transition_to(Submitting));
        assert!(!Building.can_transition_to(Pending));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        use StepStatus::*;

        for status in [Pending, Building, Signing, Submitting, Confirming] {
            assert!(status.can_transition_to(Failed), "{} -> failed", status);
        }
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Building));
    }

    #[test]
    fn test_active_status() {
        assert!(!StepStatus::Pending.is_active());
        assert!(StepStatus::Signing.is_active());
        assert!(!StepStatus::Confirmed.is_active());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ExecutionResult {
            success: false,
            transactions: vec![StepProgress::pending(0, "Swap")],
            error: Some("boom".into()),
            failed_at_index: Some(0),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failedAtIndex"], 0);
        assert_eq!(json["transactions"][0]["status"], "pending");
        assert!(json["transactions"][0].get("signature").is_none());
    }
}
