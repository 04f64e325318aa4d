use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::SignedTransaction;
use crate::error::{Result, SeqError};

/// How settled a transaction must be before it counts as confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = SeqError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(SeqError::Validation(format!(
                "invalid commitment '{}'; expected processed|confirmed|finalized",
                other
            ))),
        }
    }
}

/// Dry-run result for a signed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn ok(logs: Vec<String>, units_consumed: Option<u64>) -> Self {
        Self {
            error: None,
            logs,
            units_consumed,
        }
    }

    pub fn failed(error: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            error: Some(error.into()),
            logs,
            units_consumed: None,
        }
    }
}

/// Broadcast options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Skip the node-side preflight check (the engine already simulated)
    pub skip_preflight: bool,
    /// Bounded number of broadcast retries
    pub max_retries: u8,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            max_retries: 3,
        }
    }
}

/// Anti-replay token plus the last block height at which it is valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationBound {
    pub token: String,
    pub expiry_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub signature: String,
    pub token: String,
    pub expiry_height: u64,
}

impl ConfirmationRequest {
    pub fn new(signature: impl Into<String>, bound: ConfirmationBound) -> Self {
        Self {
            signature: signature.into(),
            token: bound.token,
            expiry_height: bound.expiry_height,
        }
    }
}

/// Result of waiting for a landed transaction.
///
/// `error` is set when the transaction was included but failed to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub error: Option<String>,
}

/// Ledger submission and confirmation API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dry-run a signed transaction against current ledger state
    async fn simulate(&self, tx: &SignedTransaction) -> Result<SimulationOutcome>;

    /// Broadcast a signed transaction, returning its signature
    async fn submit(&self, tx: &SignedTransaction, options: SubmitOptions) -> Result<String>;

    /// Fetch a fresh anti-replay token and its expiry height
    async fn confirmation_bound(&self) -> Result<ConfirmationBound>;

    /// Wait until the signature is confirmed, fails on-chain, or expires
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_parses_and_orders() {
        assert_eq!(
            "Finalized".parse::<Commitment>().expect("finalized should parse"),
            Commitment::Finalized
        );
        assert!("eventual".parse::<Commitment>().is_err());
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
    }

    #[test]
    fn submit_options_default_skips_preflight() {
        let opts = SubmitOptions::default();
        assert!(opts.skip_preflight);
        assert_eq!(opts.max_retries, 3);
    }
}
