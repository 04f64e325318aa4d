//! Paper venues for dry runs
//!
//! A fixed-price swap router and an in-memory perp venue. Both build
//! well-formed instructions that the paper ledger accepts, and both can be
//! told to fail so error paths can be exercised end to end.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::venue::{
    PerpClient, PerpConnection, PerpVenue, PositionUpdate, ShortOrder, Subscription, SwapQuote,
    SwapRequest, SwapRouter,
};
use crate::domain::{to_base_units, AccountMeta, Instruction};
use crate::error::{Result, SeqError};

pub const PAPER_SWAP_PROGRAM_ID: &str = "PaperSwap1111111111111111111111111111111111";
pub const PAPER_PERP_PROGRAM_ID: &str = "PaperPerp1111111111111111111111111111111111";

/// Decimals of perp base sizes
const BASE_DECIMALS: u8 = 9;

const IX_INIT_ACCOUNT: u8 = 0;
const IX_DEPOSIT: u8 = 1;
const IX_PLACE_SHORT: u8 = 2;

/// Swaps at a fixed price of the output token, quoted in the input token
#[derive(Debug, Clone)]
pub struct PaperSwapRouter {
    price: Decimal,
    failure: Option<String>,
}

impl PaperSwapRouter {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            failure: None,
        }
    }

    /// Every quote fails with `error`
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.failure = Some(error.into());
        self
    }
}

#[async_trait]
impl SwapRouter for PaperSwapRouter {
    async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote> {
        if let Some(err) = &self.failure {
            return Err(SeqError::MarketDataUnavailable(err.clone()));
        }
        if self.price <= Decimal::ZERO {
            return Err(SeqError::MarketDataUnavailable(
                "no route: price is not positive".to_string(),
            ));
        }

        let decimals = request.output.decimals as u32;
        let expected_out = (request.amount / self.price)
            .round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
        let tolerance = Decimal::from(10_000u32 - request.slippage_bps.min(10_000) as u32)
            / Decimal::from(10_000u32);
        let min_out =
            (expected_out * tolerance).round_dp_with_strategy(decimals, RoundingStrategy::ToZero);

        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&to_base_units(request.amount, request.input.decimals)?.to_le_bytes());
        data.extend_from_slice(&to_base_units(min_out, request.output.decimals)?.to_le_bytes());

        let instruction = Instruction {
            program_id: PAPER_SWAP_PROGRAM_ID.to_string(),
            accounts: vec![
                AccountMeta::writable(&request.owner, true),
                AccountMeta::readonly(&request.input.mint, false),
                AccountMeta::readonly(&request.output.mint, false),
            ],
            data,
        };

        Ok(SwapQuote {
            expected_out,
            min_out,
            instructions: vec![instruction],
        })
    }
}

/// In-memory perp venue with connection bookkeeping
#[derive(Debug)]
pub struct PaperPerpVenue {
    oracle_price: Decimal,
    account_exists: bool,
    connect_failure: Option<String>,
    connects: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
    cancellations: Arc<AtomicUsize>,
}

impl PaperPerpVenue {
    pub fn new(oracle_price: Decimal) -> Self {
        Self {
            oracle_price,
            account_exists: false,
            connect_failure: None,
            connects: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            cancellations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Treat the trading account as already created
    pub fn with_existing_account(mut self) -> Self {
        self.account_exists = true;
        self
    }

    /// Every connection attempt fails with `error`
    pub fn failing_connect(mut self, error: impl Into<String>) -> Self {
        self.connect_failure = Some(error.into());
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Position subscriptions cancelled so far
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PerpVenue for PaperPerpVenue {
    async fn connect(&self, authority: &str, market_index: u16) -> Result<PerpConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.connect_failure {
            return Err(SeqError::ClientInit(err.clone()));
        }

        info!("Paper perp client connected for {} (market {})", authority, market_index);

        let (updates_tx, updates_rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        // Flat position snapshot on subscribe
        let _ = updates_tx.try_send(PositionUpdate {
            market_index,
            base_size: Decimal::ZERO,
            collateral: Decimal::ZERO,
            timestamp: Utc::now(),
        });

        let cancellations = Arc::clone(&self.cancellations);
        tokio::spawn(async move {
            let _ = cancel_rx.await;
            cancellations.fetch_add(1, Ordering::SeqCst);
            drop(updates_tx);
            debug!("Paper position publisher stopped");
        });

        Ok(PerpConnection {
            client: Box::new(PaperPerpClient {
                authority: authority.to_string(),
                oracle_price: self.oracle_price,
                account_exists: self.account_exists,
                shutdowns: Arc::clone(&self.shutdowns),
            }),
            updates: Subscription::new(updates_rx, cancel_tx),
        })
    }
}

struct PaperPerpClient {
    authority: String,
    oracle_price: Decimal,
    account_exists: bool,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl PerpClient for PaperPerpClient {
    async fn oracle_price(&self, _market_index: u16) -> Result<Decimal> {
        Ok(self.oracle_price)
    }

    async fn account_exists(&self) -> Result<bool> {
        Ok(self.account_exists)
    }

    async fn open_short(&self, order: &ShortOrder) -> Result<Vec<Instruction>> {
        let owner = AccountMeta::writable(&self.authority, true);
        let mut instructions = Vec::with_capacity(3);

        if order.initialize_account {
            instructions.push(Instruction {
                program_id: PAPER_PERP_PROGRAM_ID.to_string(),
                accounts: vec![owner.clone()],
                data: vec![IX_INIT_ACCOUNT],
            });
        }

        let mut deposit = vec![IX_DEPOSIT];
        deposit.extend_from_slice(
            &to_base_units(order.deposit, order.collateral.decimals)?.to_le_bytes(),
        );
        instructions.push(Instruction {
            program_id: PAPER_PERP_PROGRAM_ID.to_string(),
            accounts: vec![
                owner.clone(),
                AccountMeta::readonly(&order.collateral.mint, false),
            ],
            data: deposit,
        });

        let mut place = vec![IX_PLACE_SHORT];
        place.extend_from_slice(&order.market_index.to_le_bytes());
        place.extend_from_slice(&to_base_units(order.size, BASE_DECIMALS)?.to_le_bytes());
        instructions.push(Instruction {
            program_id: PAPER_PERP_PROGRAM_ID.to_string(),
            accounts: vec![owner],
            data: place,
        });

        Ok(instructions)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        debug!("Paper perp client shut down");
        Ok(())
    }
}
