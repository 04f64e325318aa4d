//! Progress projection
//!
//! Turns an engine snapshot into the session phase and the one-line message
//! a user sees. Step-specific wording comes from a [`StepMessages`]
//! implementation so strategies can mention live amounts and addresses.

use crate::domain::{SessionState, StepProgress, StepStatus};

/// Wording for each step transition
pub trait StepMessages {
    fn describe(&self, step: &StepProgress) -> String;
}

/// Step-agnostic wording based on the step name
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericMessages;

impl StepMessages for GenericMessages {
    fn describe(&self, step: &StepProgress) -> String {
        match step.status {
            StepStatus::Pending => format!("{} queued", step.name),
            StepStatus::Building => format!("Building {}...", step.name),
            StepStatus::Signing => format!("Waiting for wallet approval ({})...", step.name),
            StepStatus::Submitting => format!("Submitting {}...", step.name),
            StepStatus::Confirming => format!("Confirming {}...", step.name),
            StepStatus::Confirmed => format!("{} confirmed", step.name),
            StepStatus::Failed => failure_message(step),
        }
    }
}

/// User-facing view of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Session phase, when the step maps onto one
    pub state: Option<SessionState>,
    /// Step the message is about
    pub step_index: Option<usize>,
    pub message: String,
}

/// Step that most recently changed: the failed one, the active one, or the
/// last one confirmed.
pub fn current_step(snapshot: &[StepProgress]) -> Option<&StepProgress> {
    snapshot
        .iter()
        .find(|s| s.status == StepStatus::Failed)
        .or_else(|| snapshot.iter().rev().find(|s| s.status != StepStatus::Pending))
}

pub fn project(snapshot: &[StepProgress], messages: &dyn StepMessages) -> Projection {
    let Some(step) = current_step(snapshot) else {
        return Projection {
            state: None,
            step_index: None,
            message: "Ready".to_string(),
        };
    };

    let all_confirmed = snapshot.iter().all(|s| s.status == StepStatus::Confirmed);
    let state = match step.status {
        StepStatus::Failed => Some(SessionState::Error),
        _ if all_confirmed => Some(SessionState::Success),
        _ => SessionState::for_step(step.index),
    };

    let message = if all_confirmed {
        "All transactions confirmed".to_string()
    } else if step.status == StepStatus::Failed {
        failure_message(step)
    } else {
        messages.describe(step)
    };

    Projection {
        state,
        step_index: Some(step.index),
        message,
    }
}

fn failure_message(step: &StepProgress) -> String {
    format!(
        "{} failed: {}",
        step.name,
        step.error.as_deref().unwrap_or("unknown error")
    )
}

/// Shorten an address for display: `9WzD...AWWM`
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
