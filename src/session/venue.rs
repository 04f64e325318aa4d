//! Venue seams used by the strategy steps
//!
//! Swap routing and perp trading live behind these traits; concrete venue
//! SDK adapters implement them. The perp client is stateful: it is connected
//! once per run, and its position updates arrive through an explicit
//! [`Subscription`] that is cancelled when the client is torn down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::domain::Instruction;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub owner: String,
    pub input: TokenConfig,
    pub output: TokenConfig,
    /// UI amount of `input`
    pub amount: Decimal,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    /// Expected UI amount of `output`
    pub expected_out: Decimal,
    /// Output after slippage tolerance
    pub min_out: Decimal,
    pub instructions: Vec<Instruction>,
}

/// Quotes and builds swap instructions
#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote>;
}

/// Order to open a short perp position with fresh collateral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortOrder {
    pub market_index: u16,
    /// Base asset size of the short
    pub size: Decimal,
    /// Collateral deposited alongside the order
    pub deposit: Decimal,
    pub collateral: TokenConfig,
    /// Create the trading account in the same transaction
    pub initialize_account: bool,
}

/// Live perp client bound to one account
#[async_trait]
pub trait PerpClient: Send + Sync {
    /// Current oracle price of the market
    async fn oracle_price(&self, market_index: u16) -> Result<Decimal>;

    /// Whether the trading account already exists
    async fn account_exists(&self) -> Result<bool>;

    async fn open_short(&self, order: &ShortOrder) -> Result<Vec<Instruction>>;

    /// Release connections held by the client
    async fn shutdown(&self) -> Result<()>;
}

/// Connects perp clients
#[async_trait]
pub trait PerpVenue: Send + Sync {
    async fn connect(&self, authority: &str, market_index: u16) -> Result<PerpConnection>;
}

/// A connected client and its position update subscription
pub struct PerpConnection {
    pub client: Box<dyn PerpClient>,
    pub updates: Subscription,
}

/// Position change pushed by the venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub market_index: u16,
    /// Signed base size (negative for shorts)
    pub base_size: Decimal,
    pub collateral: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Handle for a position update stream.
///
/// Cancelling (or dropping) the handle tells the venue to stop publishing,
/// so no listener outlives the client it belongs to.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    updates: Option<mpsc::Receiver<PositionUpdate>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(updates: mpsc::Receiver<PositionUpdate>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            id: Uuid::new_v4(),
            updates: Some(updates),
            cancel: Some(cancel),
        }
    }

    /// Subscription with no updates, for venues that don't push any
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            updates: None,
            cancel: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take the update stream; it ends once the subscription is cancelled
    pub fn take_updates(&mut self) -> Option<mpsc::Receiver<PositionUpdate>> {
        self.updates.take()
    }

    pub fn cancel(mut self) {
        self.signal_cancel();
    }

    fn signal_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!("Cancelling position subscription {}", self.id);
            let _ = cancel.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal_cancel();
    }
}
