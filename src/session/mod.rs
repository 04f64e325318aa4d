//! Strategy session: swap → leveraged short → transfer
//!
//! The controller wraps the sequential engine with the session state
//! machine, the perp client lifecycle and position reporting.

mod controller;
pub mod paper;
mod report;
mod strategy;
mod venue;

pub use controller::{SessionController, SessionDeps, SessionEvent, SessionOutcome, SessionStatus};
pub use paper::{PaperPerpVenue, PaperSwapRouter};
pub use report::{HttpReporter, PositionReport, ReportStatus, ResultReporter};
pub use strategy::{
    build_steps, deposit_for, QuoteBoard, StrategyContext, StrategyMessages, StrategyQuotes,
    SHORT_STEP, SHORT_STEP_INDEX, SWAP_STEP, TRANSFER_STEP,
};
pub use venue::{
    PerpClient, PerpConnection, PerpVenue, PositionUpdate, ShortOrder, Subscription, SwapQuote,
    SwapRequest, SwapRouter,
};
