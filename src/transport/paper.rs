//! In-memory paper ledger for dry runs
//!
//! Behaves like a node that includes every transaction one block after it is
//! submitted. Failures can be injected per transaction ordinal (the order in
//! which transactions reach simulation), which lets dry runs and tests walk
//! every failure path without a network.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::{
    ConfirmationBound, ConfirmationOutcome, ConfirmationRequest, SimulationOutcome, SubmitOptions,
    Transport,
};
use crate::domain::SignedTransaction;
use crate::error::{Result, SeqError};

/// Failure injection and timing for [`PaperLedger`]
#[derive(Debug, Clone)]
pub struct PaperLedgerConfig {
    /// Blocks an anti-replay token stays valid
    pub validity_blocks: u64,
    /// Simulation errors keyed by transaction ordinal
    pub simulation_failures: HashMap<usize, String>,
    /// On-chain execution errors keyed by transaction ordinal
    pub execution_failures: HashMap<usize, String>,
    /// Broadcast errors keyed by transaction ordinal
    pub submit_failures: HashMap<usize, String>,
}

impl Default for PaperLedgerConfig {
    fn default() -> Self {
        Self {
            validity_blocks: 150,
            simulation_failures: HashMap::new(),
            execution_failures: HashMap::new(),
            submit_failures: HashMap::new(),
        }
    }
}

impl PaperLedgerConfig {
    pub fn fail_simulation(mut self, ordinal: usize, error: impl Into<String>) -> Self {
        self.simulation_failures.insert(ordinal, error.into());
        self
    }

    pub fn fail_execution(mut self, ordinal: usize, error: impl Into<String>) -> Self {
        self.execution_failures.insert(ordinal, error.into());
        self
    }

    pub fn fail_submit(mut self, ordinal: usize, error: impl Into<String>) -> Self {
        self.submit_failures.insert(ordinal, error.into());
        self
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    height: u64,
    /// token -> last valid height
    tokens: HashMap<String, u64>,
    /// signature -> ordinal
    landed: HashMap<String, usize>,
    simulated: usize,
    submitted: Vec<String>,
}

/// Paper ledger implementing [`Transport`]
pub struct PaperLedger {
    config: PaperLedgerConfig,
    state: Mutex<LedgerState>,
}

impl PaperLedger {
    pub fn new(config: PaperLedgerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState {
                height: 1_000,
                ..LedgerState::default()
            }),
        }
    }

    /// Signatures broadcast so far, in order
    pub async fn submitted(&self) -> Vec<String> {
        self.state.lock().await.submitted.clone()
    }

    /// Number of simulations run so far
    pub async fn simulations(&self) -> usize {
        self.state.lock().await.simulated
    }

    pub async fn height(&self) -> u64 {
        self.state.lock().await.height
    }

    /// Move the chain forward, e.g. to expire outstanding tokens
    pub async fn advance(&self, blocks: u64) {
        self.state.lock().await.height += blocks;
    }
}

impl Default for PaperLedger {
    fn default() -> Self {
        Self::new(PaperLedgerConfig::default())
    }
}

fn paper_token(height: u64, issued: usize) -> String {
    let digest = Sha256::digest(format!("paper-token:{}:{}", height, issued).as_bytes());
    bs58::encode(digest).into_string()
}

#[async_trait]
impl Transport for PaperLedger {
    async fn simulate(&self, tx: &SignedTransaction) -> Result<SimulationOutcome> {
        let mut state = self.state.lock().await;
        let ordinal = state.simulated;
        state.simulated += 1;

        let token_valid = state
            .tokens
            .get(&tx.message.recent_token)
            .map(|expiry| *expiry >= state.height)
            .unwrap_or(false);
        if !token_valid {
            return Ok(SimulationOutcome::failed("BlockhashNotFound", Vec::new()));
        }

        if tx.signature().is_none() {
            return Ok(SimulationOutcome::failed("SignatureFailure", Vec::new()));
        }

        let mut logs: Vec<String> = tx
            .message
            .instructions
            .iter()
            .map(|ix| format!("Program {} invoke [1]", ix.program_id))
            .collect();

        if let Some(err) = self.config.simulation_failures.get(&ordinal) {
            logs.push(format!("Program log: Error: {}", err));
            debug!("Paper simulation #{} failing: {}", ordinal, err);
            return Ok(SimulationOutcome::failed(err.clone(), logs));
        }

        logs.push("Program log: success".to_string());
        Ok(SimulationOutcome::ok(
            logs,
            Some(5_000 * tx.message.instructions.len() as u64),
        ))
    }

    async fn submit(&self, tx: &SignedTransaction, _options: SubmitOptions) -> Result<String> {
        let mut state = self.state.lock().await;
        let ordinal = state.simulated.saturating_sub(1);

        if let Some(err) = self.config.submit_failures.get(&ordinal) {
            return Err(SeqError::Submission(err.clone()));
        }

        let signature = tx
            .signature()
            .ok_or_else(|| SeqError::Submission("transaction is unsigned".to_string()))?
            .to_string();

        state.landed.insert(signature.clone(), ordinal);
        state.submitted.push(signature.clone());
        info!("Paper ledger accepted {} at height {}", signature, state.height);
        Ok(signature)
    }

    async fn confirmation_bound(&self) -> Result<ConfirmationBound> {
        let mut state = self.state.lock().await;
        let token = paper_token(state.height, state.tokens.len());
        let expiry_height = state.height + self.config.validity_blocks;
        state.tokens.insert(token.clone(), expiry_height);

        Ok(ConfirmationBound {
            token,
            expiry_height,
        })
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationOutcome> {
        let mut state = self.state.lock().await;
        state.height += 1;

        let ordinal = match state.landed.get(&request.signature) {
            Some(ordinal) => *ordinal,
            None => {
                return Err(SeqError::Confirmation(format!(
                    "block height exceeded: signature {} never landed",
                    request.signature
                )))
            }
        };

        if state.height > request.expiry_height {
            return Err(SeqError::Confirmation(format!(
                "block height exceeded: signature {} expired at height {}",
                request.signature, request.expiry_height
            )));
        }

        Ok(ConfirmationOutcome {
            error: self.config.execution_failures.get(&ordinal).cloned(),
        })
    }
}
