use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::transport::Commitment;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint of the ledger node
    pub url: String,
    /// Settlement level required before a step counts as confirmed
    #[serde(default)]
    pub commitment: Commitment,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Signature status polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_poll_interval() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum broadcast retries per submission
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Skip node preflight on submit (simulation already ran)
    #[serde(default = "default_skip_preflight")]
    pub skip_preflight: bool,
}

fn default_max_retries() -> u8 {
    3
}

fn default_skip_preflight() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            skip_preflight: default_skip_preflight(),
        }
    }
}

/// Token identity and precision
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub mint: String,
    pub decimals: u8,
}

/// Parameters of the swap → short → transfer strategy
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Perp market to short (e.g., "SOL-PERP")
    pub market_name: String,
    /// Perp market index on the venue
    #[serde(default)]
    pub market_index: u16,
    /// Position leverage (e.g., 2 = 2x)
    pub leverage: Decimal,
    /// Asset spent by the swap
    pub source: TokenConfig,
    /// Asset acquired by the swap and transferred out
    pub target: TokenConfig,
    /// Amount of `source` to swap
    pub swap_amount: Decimal,
    /// Swap slippage tolerance in basis points
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    /// Amount of `target` sent to `destination`
    pub transfer_amount: Decimal,
    /// Transfer recipient address
    pub destination: String,
}

fn default_slippage_bps() -> u16 {
    50
}

impl StrategyConfig {
    /// Validate strategy values against the transfer policy
    pub fn validate(&self, policy: &TransferPolicy) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.market_name.trim().is_empty() {
            errors.push("market_name must not be empty".to_string());
        }

        if self.leverage < Decimal::ONE {
            errors.push(format!("leverage must be at least 1, got {}", self.leverage));
        }

        if self.swap_amount <= Decimal::ZERO {
            errors.push("swap_amount must be positive".to_string());
        }

        if self.transfer_amount < policy.min_amount {
            errors.push(format!(
                "transfer_amount {} is below the {} minimum of {}",
                self.transfer_amount, policy.profile, policy.min_amount
            ));
        }

        if self.slippage_bps > 10_000 {
            errors.push("slippage_bps must be at most 10000".to_string());
        }

        if self.destination.trim().is_empty() {
            errors.push("destination must not be empty".to_string());
        } else if bs58::decode(self.destination.trim()).into_vec().is_err() {
            errors.push(format!(
                "destination is not a base58 address: {}",
                self.destination
            ));
        }

        for token in [&self.source, &self.target] {
            if token.decimals > 18 {
                errors.push(format!("{} decimals must be at most 18", token.symbol));
            }
        }

        if self.source.mint == self.target.mint {
            errors.push("source and target tokens must differ".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Which minimum transfer amount applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferProfile {
    Debug,
    Production,
}

impl Default for TransferProfile {
    fn default() -> Self {
        Self::Production
    }
}

impl std::fmt::Display for TransferProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub profile: TransferProfile,
    #[serde(default = "default_debug_min_amount")]
    pub debug_min_amount: Decimal,
    #[serde(default = "default_production_min_amount")]
    pub production_min_amount: Decimal,
}

fn default_debug_min_amount() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_production_min_amount() -> Decimal {
    Decimal::from(10)
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            profile: TransferProfile::default(),
            debug_min_amount: default_debug_min_amount(),
            production_min_amount: default_production_min_amount(),
        }
    }
}

/// Minimum transfer amount, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    pub profile: TransferProfile,
    pub min_amount: Decimal,
}

impl TransferPolicy {
    pub fn resolve(config: &TransferConfig) -> Self {
        let min_amount = match config.profile {
            TransferProfile::Debug => config.debug_min_amount,
            TransferProfile::Production => config.production_min_amount,
        };
        Self {
            profile: config.profile,
            min_amount,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    /// Base URL of the position report endpoint (reporting disabled if unset)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_report_timeout")]
    pub timeout_ms: u64,
}

fn default_report_timeout() -> u64 {
    10_000
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_report_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    /// JSON keypair file (64-byte array); falls back to SEQTX_KEYPAIR
    #[serde(default)]
    pub keypair_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Run against the in-memory paper ledger
    #[serde(default)]
    pub enabled: bool,
    /// Paper swap price of the target token, quoted in the source token
    #[serde(default = "default_paper_price")]
    pub swap_price: Decimal,
    /// Paper oracle price of the perp market
    #[serde(default = "default_paper_price")]
    pub oracle_price: Decimal,
}

fn default_paper_price() -> Decimal {
    Decimal::from(150)
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            swap_price: default_paper_price(),
            oracle_price: default_paper_price(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("rpc.commitment", "confirmed")?
            .set_default("execution.max_retries", 3)?
            .set_default("execution.skip_preflight", true)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SEQTX_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SEQTX__RPC__URL, etc.)
            .add_source(
                Environment::with_prefix("SEQTX")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(dry_run: bool) -> Self {
        use rust_decimal_macros::dec;

        Self {
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                commitment: Commitment::Confirmed,
                request_timeout_ms: default_request_timeout(),
                poll_interval_ms: default_poll_interval(),
            },
            execution: ExecutionConfig::default(),
            strategy: StrategyConfig {
                market_name: "SOL-PERP".to_string(),
                market_index: 0,
                leverage: dec!(2),
                source: TokenConfig {
                    symbol: "USDC".to_string(),
                    mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                    decimals: 6,
                },
                target: TokenConfig {
                    symbol: "SOL".to_string(),
                    mint: "So11111111111111111111111111111111111111112".to_string(),
                    decimals: 9,
                },
                swap_amount: dec!(100),
                slippage_bps: default_slippage_bps(),
                transfer_amount: dec!(0.5),
                destination: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
            },
            transfer: TransferConfig {
                profile: TransferProfile::Debug,
                ..TransferConfig::default()
            },
            reporting: ReportingConfig::default(),
            signer: SignerConfig::default(),
            dry_run: DryRunConfig {
                enabled: dry_run,
                ..DryRunConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy::resolve(&self.transfer)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.rpc.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(format!(
                "rpc.url must be http(s), got scheme '{}'",
                parsed.scheme()
            )),
            Err(e) => errors.push(format!("rpc.url is invalid: {}", e)),
        }

        if self.rpc.poll_interval_ms == 0 {
            errors.push("rpc.poll_interval_ms must be positive".to_string());
        }

        if let Some(endpoint) = &self.reporting.endpoint {
            if url::Url::parse(endpoint).is_err() {
                errors.push(format!("reporting.endpoint is invalid: {}", endpoint));
            }
        }

        if let Err(mut strategy_errors) = self.strategy.validate(&self.transfer_policy()) {
            errors.append(&mut strategy_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config(true);
        assert!(config.validate().is_ok(), "{:?}", config.validate());
        assert!(config.dry_run.enabled);
    }

    #[test]
    fn test_transfer_policy_profiles() {
        let mut transfer = TransferConfig::default();
        assert_eq!(TransferPolicy::resolve(&transfer).min_amount, dec!(10));

        transfer.profile = TransferProfile::Debug;
        assert_eq!(TransferPolicy::resolve(&transfer).min_amount, dec!(0.01));
    }

    #[test]
    fn test_transfer_below_minimum_rejected() {
        let mut config = AppConfig::default_config(true);
        config.transfer.profile = TransferProfile::Production;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("below the production minimum")));
    }

    #[test]
    fn test_invalid_strategy_values() {
        let mut config = AppConfig::default_config(false);
        config.strategy.leverage = dec!(0.5);
        config.strategy.destination = "not-base58-0OIl".to_string();
        config.rpc.url = "ftp://node".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{:?}", errors);
    }
}
