//! Swap → short → transfer step builders
//!
//! Each builder runs lazily when the engine reaches its step, so prices and
//! quotes are as fresh as the anti-replay token they are signed with.
//! Values computed along the way (swap output, short size, deposit) are
//! written to a shared [`StrategyQuotes`] for progress messages and
//! reporting.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::venue::{PerpClient, ShortOrder, SwapRequest, SwapRouter};
use crate::config::StrategyConfig;
use crate::domain::{to_base_units, token_transfer, StepProgress, StepStatus, UnsignedTransaction};
use crate::engine::StepDescriptor;
use crate::error::{Result, SeqError};
use crate::projection::{truncate_address, StepMessages};
use crate::transport::ConfirmationBound;

pub const SWAP_STEP: &str = "Swap";
pub const SHORT_STEP: &str = "Open Short";
pub const TRANSFER_STEP: &str = "Transfer";

/// Index of the position-opening step
pub const SHORT_STEP_INDEX: usize = 1;

/// Values the builders discover while the run progresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyQuotes {
    pub expected_out: Option<Decimal>,
    pub oracle_price: Option<Decimal>,
    pub short_size: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
}

/// Shared, lock-protected [`StrategyQuotes`]
#[derive(Debug, Clone, Default)]
pub struct QuoteBoard(Arc<Mutex<StrategyQuotes>>);

impl QuoteBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StrategyQuotes> {
        // Quotes are plain values; a panic mid-update can't leave them torn
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> StrategyQuotes {
        self.lock().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut StrategyQuotes)) {
        f(&mut self.lock());
    }
}

/// Collateral needed to open `size` at `price` with `leverage`,
/// rounded up to `decimals` places.
pub fn deposit_for(size: Decimal, price: Decimal, leverage: Decimal, decimals: u8) -> Result<Decimal> {
    if leverage <= Decimal::ZERO {
        return Err(SeqError::Validation(format!(
            "leverage must be positive, got {}",
            leverage
        )));
    }
    if price <= Decimal::ZERO {
        return Err(SeqError::MarketDataUnavailable(format!(
            "oracle price is not positive: {}",
            price
        )));
    }

    let notional = size * price;
    Ok((notional / leverage).round_dp_with_strategy(
        decimals as u32,
        rust_decimal::RoundingStrategy::AwayFromZero,
    ))
}

/// Everything the three builders need
#[derive(Clone)]
pub struct StrategyContext {
    pub params: StrategyConfig,
    pub owner: String,
    pub swap: Arc<dyn SwapRouter>,
    pub perp: Arc<dyn PerpClient>,
    pub quotes: QuoteBoard,
}

/// Build the three step descriptors in execution order
pub fn build_steps(ctx: StrategyContext) -> Vec<StepDescriptor<'static>> {
    vec![
        swap_step(ctx.clone()),
        short_step(ctx.clone()),
        transfer_step(ctx),
    ]
}

fn swap_step(ctx: StrategyContext) -> StepDescriptor<'static> {
    StepDescriptor::new(SWAP_STEP, move |bound: ConfirmationBound| async move {
        let request = SwapRequest {
            owner: ctx.owner.clone(),
            input: ctx.params.source.clone(),
            output: ctx.params.target.clone(),
            amount: ctx.params.swap_amount,
            slippage_bps: ctx.params.slippage_bps,
        };

        let quote = ctx.swap.quote(&request).await?;
        info!(
            "Swap quote: {} {} -> {} {} (min {})",
            request.amount, request.input.symbol, quote.expected_out, request.output.symbol, quote.min_out
        );
        ctx.quotes.update(|q| q.expected_out = Some(quote.expected_out));

        let mut tx = UnsignedTransaction::new(ctx.owner.clone(), bound.token);
        tx.instructions = quote.instructions;
        Ok(tx)
    })
}

fn short_step(ctx: StrategyContext) -> StepDescriptor<'static> {
    StepDescriptor::new(SHORT_STEP, move |bound: ConfirmationBound| async move {
        let params = &ctx.params;
        let size = ctx.quotes.snapshot().expected_out.ok_or_else(|| {
            SeqError::Internal("swap output unknown when sizing the short".to_string())
        })?;

        // Price is read at build time, not when the run started
        let price = ctx.perp.oracle_price(params.market_index).await?;
        let deposit = deposit_for(size, price, params.leverage, params.source.decimals)?;
        let initialize_account = !ctx.perp.account_exists().await?;

        debug!(
            "Short sizing: size={} price={} leverage={} deposit={} init_account={}",
            size, price, params.leverage, deposit, initialize_account
        );
        ctx.quotes.update(|q| {
            q.oracle_price = Some(price);
            q.short_size = Some(size);
            q.deposit_amount = Some(deposit);
        });

        let order = ShortOrder {
            market_index: params.market_index,
            size,
            deposit,
            collateral: params.source.clone(),
            initialize_account,
        };
        let instructions = ctx.perp.open_short(&order).await?;

        let mut tx = UnsignedTransaction::new(ctx.owner.clone(), bound.token);
        tx.instructions = instructions;
        Ok(tx)
    })
}

fn transfer_step(ctx: StrategyContext) -> StepDescriptor<'static> {
    StepDescriptor::new(TRANSFER_STEP, move |bound: ConfirmationBound| async move {
        let params = &ctx.params;
        // Configured target amount, not the measured swap output
        let amount = to_base_units(params.transfer_amount, params.target.decimals)?;

        Ok(UnsignedTransaction::new(ctx.owner.clone(), bound.token).with_instruction(
            token_transfer(
                &ctx.owner,
                &params.target.mint,
                &params.destination,
                amount,
                params.target.decimals,
            ),
        ))
    })
}

/// Progress wording with live strategy values
pub struct StrategyMessages {
    params: StrategyConfig,
    quotes: QuoteBoard,
}

impl StrategyMessages {
    pub fn new(params: StrategyConfig, quotes: QuoteBoard) -> Self {
        Self { params, quotes }
    }

    fn swap_message(&self, status: StepStatus, quotes: &StrategyQuotes) -> String {
        let p = &self.params;
        let expected = quotes
            .expected_out
            .map(|v| format!("~{} {}", v.normalize(), p.target.symbol))
            .unwrap_or_else(|| p.target.symbol.clone());

        match status {
            StepStatus::Building => format!(
                "Fetching swap route for {} {} → {}...",
                p.swap_amount, p.source.symbol, p.target.symbol
            ),
            StepStatus::Signing => format!(
                "Approve swap of {} {} for {} in your wallet...",
                p.swap_amount, p.source.symbol, expected
            ),
            StepStatus::Submitting => format!("Submitting swap for {}...", expected),
            StepStatus::Confirming => "Confirming swap...".to_string(),
            StepStatus::Confirmed => format!(
                "Swapped {} {} for {}",
                p.swap_amount, p.source.symbol, expected
            ),
            StepStatus::Pending | StepStatus::Failed => String::new(),
        }
    }

    fn short_message(&self, status: StepStatus, quotes: &StrategyQuotes) -> String {
        let p = &self.params;
        let size = quotes
            .short_size
            .map(|v| v.normalize().to_string())
            .unwrap_or_else(|| "?".to_string());
        let deposit = quotes
            .deposit_amount
            .map(|v| format!("{} {}", v.normalize(), p.source.symbol))
            .unwrap_or_else(|| p.source.symbol.clone());

        match status {
            StepStatus::Building => format!("Fetching {} oracle price...", p.market_name),
            StepStatus::Signing => format!(
                "Approve {}x short of {} {} with {} collateral...",
                p.leverage.normalize(),
                size,
                p.market_name,
                deposit
            ),
            StepStatus::Submitting => format!("Opening short on {}...", p.market_name),
            StepStatus::Confirming => "Confirming short position...".to_string(),
            StepStatus::Confirmed => format!("Short of {} {} opened", size, p.market_name),
            StepStatus::Pending | StepStatus::Failed => String::new(),
        }
    }

    fn transfer_message(&self, status: StepStatus) -> String {
        let p = &self.params;
        let dest = truncate_address(&p.destination);

        match status {
            StepStatus::Building => "Preparing transfer...".to_string(),
            StepStatus::Signing => format!(
                "Approve transfer of {} {} to {}...",
                p.transfer_amount, p.target.symbol, dest
            ),
            StepStatus::Submitting => format!(
                "Sending {} {} to {}...",
                p.transfer_amount, p.target.symbol, dest
            ),
            StepStatus::Confirming => "Confirming transfer...".to_string(),
            StepStatus::Confirmed => format!(
                "Transferred {} {} to {}",
                p.transfer_amount, p.target.symbol, dest
            ),
            StepStatus::Pending | StepStatus::Failed => String::new(),
        }
    }
}

impl StepMessages for StrategyMessages {
    fn describe(&self, step: &StepProgress) -> String {
        let quotes = self.quotes.snapshot();
        let message = match step.index {
            0 => self.swap_message(step.status, &quotes),
            SHORT_STEP_INDEX => self.short_message(step.status, &quotes),
            2 => self.transfer_message(step.status),
            _ => String::new(),
        };

        if message.is_empty() {
            crate::projection::GenericMessages.describe(step)
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deposit_for() {
        // 0.5 SOL @ 150 = 75 notional, 2x leverage -> 37.5
        assert_eq!(deposit_for(dec!(0.5), dec!(150), dec!(2), 6).unwrap(), dec!(37.5));
        // Rounds up at the collateral precision
        assert_eq!(
            deposit_for(dec!(1), dec!(100), dec!(3), 2).unwrap(),
            dec!(33.34)
        );
        assert!(deposit_for(dec!(1), dec!(0), dec!(2), 6).is_err());
        assert!(deposit_for(dec!(1), dec!(100), dec!(0), 6).is_err());
    }

    #[test]
    fn test_messages_use_live_values() {
        let params = AppConfig::default_config(true).strategy;
        let quotes = QuoteBoard::new();
        let messages = StrategyMessages::new(params, quotes.clone());

        let mut step = StepProgress::pending(1, SHORT_STEP);
        step.status = StepStatus::Signing;
        assert!(messages.describe(&step).contains("? SOL-PERP"));

        quotes.update(|q| {
            q.short_size = Some(dec!(0.66));
            q.deposit_amount = Some(dec!(50.10));
        });
        assert_eq!(
            messages.describe(&step),
            "Approve 2x short of 0.66 SOL-PERP with 50.1 USDC collateral..."
        );

        let mut transfer = StepProgress::pending(2, TRANSFER_STEP);
        transfer.status = StepStatus::Submitting;
        assert_eq!(messages.describe(&transfer), "Sending 0.5 SOL to 9WzD...AWWM...");
    }

    #[test]
    fn test_messages_fall_back_for_unknown_steps() {
        let params = AppConfig::default_config(true).strategy;
        let messages = StrategyMessages::new(params, QuoteBoard::new());

        let mut extra = StepProgress::pending(3, "Extra");
        extra.status = StepStatus::Building;
        assert_eq!(messages.describe(&extra), "Building Extra...");
    }
}
