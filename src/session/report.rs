//! Position reporting
//!
//! Best-effort notification of the short position outcome. Failures are the
//! caller's to log; they never affect the run result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ReportingConfig;
use crate::error::{Result, SeqError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
}

/// Outcome of the position-opening step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub market_name: String,
    pub size: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receives position reports
#[async_trait]
pub trait ResultReporter: Send + Sync {
    async fn report(&self, report: &PositionReport) -> Result<()>;
}

/// Posts reports as JSON to `{endpoint}/positions`
#[derive(Clone)]
pub struct HttpReporter {
    client: Client,
    url: String,
}

impl HttpReporter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = url::Url::parse(endpoint)
            .map_err(|e| SeqError::Validation(format!("invalid reporting endpoint: {}", e)))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}/positions", base.as_str().trim_end_matches('/')),
        })
    }

    /// Reporter for the configured endpoint, if any
    pub fn from_config(config: &ReportingConfig) -> Result<Option<Self>> {
        match config.endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                info!("Position reporting enabled: {}", endpoint);
                Self::new(endpoint, Duration::from_millis(config.timeout_ms)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ResultReporter for HttpReporter {
    async fn report(&self, report: &PositionReport) -> Result<()> {
        let resp = self.client.post(&self.url).json(report).send().await?;

        if resp.status().is_success() {
            debug!("Position report sent ({:?})", report.status);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("Position report failed: {} - {}", status, body);
            Err(SeqError::Internal(format!(
                "report endpoint returned HTTP {}: {}",
                status, body
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_wire_format() {
        let report = PositionReport {
            market_name: "SOL-PERP".into(),
            size: dec!(0.66),
            deposit_amount: Some(dec!(50)),
            signature: Some("sigB".into()),
            timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            status: ReportStatus::Success,
            error: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["marketName"], "SOL-PERP");
        assert_eq!(json["depositAmount"], "50");
        assert_eq!(json["signature"], "sigB");
        assert_eq!(json["status"], "success");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_endpoint_url() {
        let reporter = HttpReporter::new("https://example.com/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(reporter.url(), "https://example.com/api/positions");

        assert!(HttpReporter::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_from_config_without_endpoint() {
        let config = ReportingConfig::default();
        assert!(HttpReporter::from_config(&config).unwrap().is_none());
    }
}
