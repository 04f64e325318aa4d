use thiserror::Error;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum SeqError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Ledger errors
    #[error("{message}")]
    Ledger { message: String, logs: Vec<String> },

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Transaction failed on-chain: {0}")]
    Confirmation(String),

    // Wallet/signing errors
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    // Venue client errors
    #[error("Client initialization failed: {0}")]
    ClientInit(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SeqError
pub type Result<T> = std::result::Result<T, SeqError>;

impl SeqError {
    /// Ledger log lines attached to this error, if any
    pub fn logs(&self) -> &[String] {
        match self {
            SeqError::Ledger { logs, .. } => logs,
            _ => &[],
        }
    }

    /// Whether a transport call hitting this error is worth repeating
    pub fn is_transient(&self) -> bool {
        match self {
            SeqError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SeqError::RateLimited(_) => true,
            // Node is behind or temporarily unhealthy
            SeqError::Rpc { code, .. } => matches!(code, -32004 | -32005 | -32014),
            _ => false,
        }
    }
}

/// Flatten an error into the message recorded on a failed step.
///
/// Structured ledger failures keep their log lines so the caller can see
/// which instruction broke.
pub fn describe(err: &SeqError) -> String {
    with_logs(err.to_string(), err.logs())
}

/// Append ledger log lines to a message.
pub fn with_logs(message: String, logs: &[String]) -> String {
    if logs.is_empty() {
        return message;
    }

    let mut out = message;
    out.push_str("\nLogs:");
    for line in logs {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}
