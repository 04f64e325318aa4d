//! JSON-RPC ledger transport
//!
//! Implements [`Transport`] against a node's JSON-RPC 2.0 endpoint.
//! Submission retries transient failures with exponential backoff;
//! confirmation polls signature status until the transaction settles,
//! fails on-chain, or its anti-replay token expires.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::traits::{
    Commitment, ConfirmationBound, ConfirmationOutcome, ConfirmationRequest, SimulationOutcome,
    SubmitOptions, Transport,
};
use crate::config::RpcConfig;
use crate::domain::SignedTransaction;
use crate::error::{Result, SeqError};

/// Base delay between broadcast retries
const RETRY_BASE_MS: u64 = 250;

/// Ledger transport over JSON-RPC
pub struct RpcTransport {
    http: Client,
    url: String,
    commitment: Commitment,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("seqtx/0.1")
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SeqError::Internal(format!("failed to build RPC HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            commitment: config.commitment,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self.http.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SeqError::RateLimited(format!("{} rate limited", method)));
        }

        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SeqError::Rpc {
                code: status.as_u16() as i64,
                message: format!("HTTP {} from {}: {}", status, method, text),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        parse_response(value)
    }

    async fn block_height(&self) -> Result<u64> {
        self.call(
            "getBlockHeight",
            json!([{ "commitment": self.commitment.as_str() }]),
        )
        .await
    }
}

#[async_trait]
impl Transport for RpcTransport {
    #[instrument(skip(self, tx))]
    async fn simulate(&self, tx: &SignedTransaction) -> Result<SimulationOutcome> {
        let result: Value = self
            .call(
                "simulateTransaction",
                json!([
                    tx.to_wire()?,
                    {
                        "encoding": "base64",
                        "commitment": self.commitment.as_str(),
                        "sigVerify": true,
                    }
                ]),
            )
            .await?;

        let outcome = parse_simulation(&result);
        debug!(
            "Simulation: error={:?} units={:?} logs={}",
            outcome.error,
            outcome.units_consumed,
            outcome.logs.len()
        );
        Ok(outcome)
    }

    #[instrument(skip(self, tx))]
    async fn submit(&self, tx: &SignedTransaction, options: SubmitOptions) -> Result<String> {
        let params = json!([
            tx.to_wire()?,
            {
                "encoding": "base64",
                "skipPreflight": options.skip_preflight,
                "preflightCommitment": self.commitment.as_str(),
                "maxRetries": options.max_retries,
            }
        ]);

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;

            match self.call::<String>("sendTransaction", params.clone()).await {
                Ok(signature) => {
                    info!("Transaction submitted: {} (attempt {})", signature, attempts);
                    return Ok(signature);
                }
                Err(e) if e.is_transient() && may_retry(attempts, options.max_retries) => {
                    warn!("Submit attempt {} failed: {}. Retrying...", attempts, e);

                    // Exponential backoff
                    sleep(retry_delay(attempts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn confirmation_bound(&self) -> Result<ConfirmationBound> {
        let result: Value = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;

        parse_bound(&result)
    }

    #[instrument(skip(self), fields(signature = %request.signature))]
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationOutcome> {
        loop {
            let result: Value = self
                .call(
                    "getSignatureStatuses",
                    json!([[request.signature], { "searchTransactionHistory": false }]),
                )
                .await?;

            match parse_signature_status(&result)? {
                SignatureState::Failed(err) => {
                    warn!("Transaction {} failed on-chain: {}", request.signature, err);
                    return Ok(ConfirmationOutcome { error: Some(err) });
                }
                SignatureState::Landed(level) if level >= self.commitment => {
                    debug!("Transaction {} reached {}", request.signature, level);
                    return Ok(ConfirmationOutcome::default());
                }
                _ => {}
            }

            let height = self.block_height().await?;
            if height > request.expiry_height {
                return Err(SeqError::Confirmation(format!(
                    "block height exceeded: signature {} expired at height {} (current {})",
                    request.signature, request.expiry_height, height
                )));
            }

            sleep(self.poll_interval).await;
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_MS * (1u64 << attempt.min(6)))
}

/// `attempts` counts submissions so far; the first one is not a retry
fn may_retry(attempts: u32, max_retries: u8) -> bool {
    attempts <= u32::from(max_retries)
}

/// Unwrap a JSON-RPC envelope, mapping node errors into [`SeqError`].
///
/// Errors that carry simulation logs (e.g. preflight failures) become
/// [`SeqError::Ledger`] so the logs reach the step's error message.
fn parse_response<T: DeserializeOwned>(mut value: Value) -> Result<T> {
    if let Some(err) = value.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown RPC error")
            .to_string();
        let logs = string_array(err.pointer("/data/logs"));

        if logs.is_empty() {
            return Err(SeqError::Rpc { code, message });
        }
        return Err(SeqError::Ledger { message, logs });
    }

    let result = value
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| SeqError::Internal("RPC response has no result".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

fn parse_simulation(result: &Value) -> SimulationOutcome {
    let value = result.get("value").unwrap_or(result);
    let error = value
        .get("err")
        .filter(|e| !e.is_null())
        .map(describe_ledger_error);

    SimulationOutcome {
        error,
        logs: string_array(value.get("logs")),
        units_consumed: value.get("unitsConsumed").and_then(Value::as_u64),
    }
}

fn parse_bound(result: &Value) -> Result<ConfirmationBound> {
    let value = result.get("value").unwrap_or(result);
    let token = value
        .get("blockhash")
        .and_then(Value::as_str)
        .ok_or_else(|| SeqError::Internal("getLatestBlockhash: missing blockhash".to_string()))?;
    let expiry_height = value
        .get("lastValidBlockHeight")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            SeqError::Internal("getLatestBlockhash: missing lastValidBlockHeight".to_string())
        })?;

    Ok(ConfirmationBound {
        token: token.to_string(),
        expiry_height,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SignatureState {
    /// Not seen by the node yet
    Unknown,
    /// Included at the given settlement level
    Landed(Commitment),
    /// Included but execution failed
    Failed(String),
}

fn parse_signature_status(result: &Value) -> Result<SignatureState> {
    let entries = result
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| SeqError::Internal("getSignatureStatuses: missing value".to_string()))?;

    let status = match entries.first() {
        Some(status) if !status.is_null() => status,
        _ => return Ok(SignatureState::Unknown),
    };

    if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
        return Ok(SignatureState::Failed(describe_ledger_error(err)));
    }

    let level = status
        .get("confirmationStatus")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Commitment>().ok())
        .unwrap_or(Commitment::Processed);
    Ok(SignatureState::Landed(level))
}

/// Render a structured ledger error (`{"InstructionError":[1,{"Custom":6001}]}`)
/// as a compact string.
fn describe_ledger_error(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_result() {
        let sig: String =
            parse_response(json!({"jsonrpc": "2.0", "id": 1, "result": "5xSig"})).unwrap();
        assert_eq!(sig, "5xSig");
    }

    #[test]
    fn parse_response_maps_preflight_logs_to_ledger_error() {
        let err = parse_response::<String>(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed",
                "data": { "logs": ["Program X invoke [1]", "Program X failed"] }
            }
        }))
        .unwrap_err();

        match err {
            SeqError::Ledger { message, logs } => {
                assert_eq!(message, "Transaction simulation failed");
                assert_eq!(logs.len(), 2);
            }
            other => panic!("expected ledger error, got {:?}", other),
        }
    }

    #[test]
    fn parse_response_plain_rpc_error() {
        let err = parse_response::<u64>(json!({
            "error": { "code": -32005, "message": "Node is behind" }
        }))
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn parse_simulation_with_instruction_error() {
        let outcome = parse_simulation(&json!({
            "context": { "slot": 10 },
            "value": {
                "err": { "InstructionError": [1, { "Custom": 6001 }] },
                "logs": ["Program log: slippage exceeded"],
                "unitsConsumed": 41_000
            }
        }));

        assert_eq!(
            outcome.error.as_deref(),
            Some(r#"{"InstructionError":[1,{"Custom":6001}]}"#)
        );
        assert_eq!(outcome.logs, vec!["Program log: slippage exceeded"]);
        assert_eq!(outcome.units_consumed, Some(41_000));
    }

    #[test]
    fn parse_simulation_success() {
        let outcome = parse_simulation(&json!({
            "value": { "err": null, "logs": [], "unitsConsumed": 1200 }
        }));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn parse_bound_reads_blockhash_and_height() {
        let bound = parse_bound(&json!({
            "context": { "slot": 1 },
            "value": { "blockhash": "Hash111", "lastValidBlockHeight": 3090 }
        }))
        .unwrap();
        assert_eq!(bound.token, "Hash111");
        assert_eq!(bound.expiry_height, 3090);

        assert!(parse_bound(&json!({ "value": { "blockhash": "x" } })).is_err());
    }

    #[test]
    fn parse_signature_status_variants() {
        assert_eq!(
            parse_signature_status(&json!({ "value": [null] })).unwrap(),
            SignatureState::Unknown
        );
        assert_eq!(
            parse_signature_status(&json!({
                "value": [{ "slot": 5, "err": null, "confirmationStatus": "finalized" }]
            }))
            .unwrap(),
            SignatureState::Landed(Commitment::Finalized)
        );
        assert_eq!(
            parse_signature_status(&json!({
                "value": [{ "slot": 5, "err": "AccountInUse", "confirmationStatus": "confirmed" }]
            }))
            .unwrap(),
            SignatureState::Failed("AccountInUse".to_string())
        );
    }

    #[test]
    fn retry_delay_grows() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert!(retry_delay(20) <= Duration::from_millis(RETRY_BASE_MS * 64));
        assert!(retry_delay(u32::MAX) <= Duration::from_millis(RETRY_BASE_MS * 64));
    }

    #[test]
    fn retry_budget_covers_full_u8_range() {
        assert!(!may_retry(1, 0));
        assert!(may_retry(3, 3));
        assert!(!may_retry(4, 3));
        assert!(may_retry(255, u8::MAX));
        assert!(!may_retry(256, u8::MAX));
    }
}
