//! Execution session controller
//!
//! Owns the session state machine around one strategy run: checks
//! preconditions, connects the perp client, drives the engine, maps step
//! progress to session phases and user messages, tears the client down and
//! reports the position outcome.

use futures::FutureExt;
use rust_decimal::Decimal;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::report::{PositionReport, ReportStatus, ResultReporter};
use super::strategy::{
    build_steps, QuoteBoard, StrategyContext, StrategyMessages, StrategyQuotes, SHORT_STEP,
    SHORT_STEP_INDEX, SWAP_STEP, TRANSFER_STEP,
};
use super::venue::{PerpClient, PerpConnection, PerpVenue, PositionUpdate, Subscription, SwapRouter};
use crate::config::{StrategyConfig, TransferPolicy};
use crate::domain::{ExecutionResult, SessionState, StateTransition, StepProgress, StepStatus};
use crate::engine::{ExecutionEngine, ProgressObserver};
use crate::error::{describe, Result, SeqError};
use crate::projection::{project, StepMessages};
use crate::signing::Signer;
use crate::transport::Transport;

/// External collaborators of a session
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn Transport>,
    pub swap: Arc<dyn SwapRouter>,
    pub perp: Arc<dyn PerpVenue>,
}

/// Current phase, user message and last result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub message: String,
    pub result: Option<ExecutionResult>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            message: READY.to_string(),
            result: None,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub success: bool,
    pub message: String,
    /// Signatures of confirmed steps, in order
    pub signatures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_index: Option<usize>,
}

impl SessionOutcome {
    fn of(result: &ExecutionResult, message: &str) -> Self {
        Self {
            success: result.success,
            message: message.to_string(),
            signatures: result
                .confirmed_signatures()
                .into_iter()
                .map(str::to_string)
                .collect(),
            failed_at_index: result.failed_at_index,
        }
    }
}

/// Events broadcast to session listeners
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(StateTransition),
    /// Step records after a status change, with the projected message
    Progress {
        message: String,
        steps: Vec<StepProgress>,
    },
    Position(PositionUpdate),
    Completed(SessionOutcome),
}

const READY: &str = "Ready";
const INITIALIZING: &str = "Initializing perp client...";

/// Perp client held for the duration of one run
struct ClientLease {
    client: Arc<dyn PerpClient>,
    updates: Subscription,
    forwarder: Option<JoinHandle<()>>,
}

impl ClientLease {
    async fn acquire(
        venue: &dyn PerpVenue,
        authority: &str,
        market_index: u16,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        let PerpConnection {
            client,
            mut updates,
        } = venue
            .connect(authority, market_index)
            .await
            .map_err(|e| match e {
                SeqError::ClientInit(_) => e,
                other => SeqError::ClientInit(describe(&other)),
            })?;

        let forwarder = updates.take_updates().map(|mut rx| {
            tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    let _ = events.send(SessionEvent::Position(update));
                }
            })
        });
        debug!("Perp client ready (subscription {})", updates.id());

        Ok(Self {
            client: Arc::from(client),
            updates,
            forwarder,
        })
    }

    fn client(&self) -> Arc<dyn PerpClient> {
        Arc::clone(&self.client)
    }

    /// Cancel the subscription and shut the client down
    async fn release(self) {
        let Self {
            client,
            updates,
            forwarder,
        } = self;

        updates.cancel();
        if let Some(handle) = forwarder {
            handle.abort();
        }
        match client.shutdown().await {
            Ok(()) => debug!("Perp client shut down"),
            Err(e) => warn!("Perp client teardown failed: {}", e),
        }
    }
}

/// Runs the swap → short → transfer strategy
pub struct SessionController {
    deps: SessionDeps,
    engine: ExecutionEngine,
    policy: TransferPolicy,
    signer: RwLock<Option<Arc<dyn Signer>>>,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(deps: SessionDeps, engine: ExecutionEngine, policy: TransferPolicy) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        let (events, _) = broadcast::channel(64);
        Self {
            deps,
            engine,
            policy,
            signer: RwLock::new(None),
            status,
            events,
        }
    }

    pub async fn set_signer(&self, signer: Arc<dyn Signer>) {
        info!("Signer connected: {}", signer.address());
        *self.signer.write().await = Some(signer);
    }

    pub async fn clear_signer(&self) {
        *self.signer.write().await = None;
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Run the strategy once.
    ///
    /// Precondition failures (no signer, invalid parameters, a run already in
    /// flight) return immediately without touching the session state or
    /// emitting events.
    pub async fn execute(
        &self,
        params: &StrategyConfig,
        reporter: Option<&dyn ResultReporter>,
    ) -> ExecutionResult {
        let Some(signer) = self.signer.read().await.clone() else {
            return self.reject(SeqError::WalletNotConnected);
        };
        if let Err(problems) = params.validate(&self.policy) {
            return self.reject(SeqError::Validation(problems.join("; ")));
        }
        if let Err(e) = self.begin() {
            warn!("Execution refused: {}", e);
            return ExecutionResult::rejected(describe(&e));
        }

        let owner = signer.address();
        let lease = match ClientLease::acquire(
            self.deps.perp.as_ref(),
            &owner,
            params.market_index,
            self.events.clone(),
        )
        .await
        {
            Ok(lease) => lease,
            Err(e) => {
                let message = describe(&e);
                error!("Perp client initialization failed: {}", message);
                let result = ExecutionResult {
                    success: false,
                    transactions: [SWAP_STEP, SHORT_STEP, TRANSFER_STEP]
                        .iter()
                        .enumerate()
                        .map(|(i, name)| StepProgress::pending(i, *name))
                        .collect(),
                    error: Some(message),
                    failed_at_index: None,
                };
                self.finish(&result);
                return result;
            }
        };

        let quotes = QuoteBoard::new();
        let steps = build_steps(StrategyContext {
            params: params.clone(),
            owner,
            swap: Arc::clone(&self.deps.swap),
            perp: lease.client(),
            quotes: quotes.clone(),
        });
        let messages = StrategyMessages::new(params.clone(), quotes.clone());
        let observer: ProgressObserver<'_> =
            Box::new(move |snapshot: Vec<StepProgress>| self.on_progress(snapshot, &messages));

        let run = AssertUnwindSafe(self.engine.execute(
            self.deps.transport.as_ref(),
            signer.as_ref(),
            steps,
            Some(observer),
        ))
        .catch_unwind()
        .await;

        lease.release().await;

        let result = match run {
            Ok(result) => result,
            Err(panic) => {
                let message = format!("Execution aborted: {}", panic_message(panic.as_ref()));
                error!("{}", message);
                ExecutionResult::rejected(message)
            }
        };

        if let Some(reporter) = reporter {
            self.report(reporter, params, &quotes.snapshot(), &result)
                .await;
        }

        self.finish(&result);
        result
    }

    /// Return to idle and forget the last result. Does not cancel a run.
    pub fn reset(&self) {
        if let Err(e) = self.transition(SessionState::Idle, READY) {
            warn!("Reset failed: {}", e);
        }
        self.status.send_modify(|s| {
            s.message = READY.to_string();
            s.result = None;
        });
    }

    fn reject(&self, err: SeqError) -> ExecutionResult {
        let result = ExecutionResult::rejected(describe(&err));
        warn!("Execution rejected: {}", err);
        self.status.send_modify(|s| {
            s.message = err.to_string();
            s.result = Some(result.clone());
        });
        result
    }

    /// Claim the session for a new run
    fn begin(&self) -> Result<()> {
        let mut previous = None;
        self.status.send_if_modified(|s| {
            if s.state.is_running() {
                return false;
            }
            previous = Some(s.state);
            s.state = SessionState::Initializing;
            s.message = INITIALIZING.to_string();
            true
        });

        let from = previous.ok_or_else(|| {
            SeqError::Validation("Execution already in progress".to_string())
        })?;
        if from.is_terminal() {
            self.emit_transition(from, SessionState::Idle, READY);
            self.emit_transition(SessionState::Idle, SessionState::Initializing, INITIALIZING);
        } else {
            self.emit_transition(from, SessionState::Initializing, INITIALIZING);
        }
        Ok(())
    }

    fn on_progress(&self, snapshot: Vec<StepProgress>, messages: &dyn StepMessages) {
        let projection = project(&snapshot, messages);

        if let Some(state) = projection.state {
            if let Err(e) = self.transition(state, projection.message.clone()) {
                warn!("Ignoring progress update: {}", e);
                return;
            }
        }

        let _ = self.events.send(SessionEvent::Progress {
            message: projection.message,
            steps: snapshot,
        });
    }

    fn transition(&self, to: SessionState, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let mut outcome = Ok(None);

        self.status.send_if_modified(|s| {
            if s.state == to {
                let changed = s.message != message;
                s.message = message.clone();
                return changed;
            }
            if !s.state.can_transition_to(to) {
                outcome = Err(SeqError::InvalidStateTransition {
                    from: s.state.to_string(),
                    to: to.to_string(),
                });
                return false;
            }
            outcome = Ok(Some(s.state));
            s.state = to;
            s.message = message.clone();
            true
        });

        if let Some(from) = outcome? {
            self.emit_transition(from, to, message);
        }
        Ok(())
    }

    fn emit_transition(&self, from: SessionState, to: SessionState, message: impl Into<String>) {
        let message = message.into();
        info!("Session {} -> {}: {}", from, to, message);
        let _ = self
            .events
            .send(SessionEvent::StateChanged(StateTransition::new(from, to, message)));
    }

    fn finish(&self, result: &ExecutionResult) {
        let (state, message) = if result.success {
            (SessionState::Success, "All transactions confirmed".to_string())
        } else {
            let message = result
                .failed_at_index
                .and_then(|i| result.transactions.get(i))
                .map(|step| {
                    format!(
                        "{} failed: {}",
                        step.name,
                        step.error.as_deref().unwrap_or("unknown error")
                    )
                })
                .or_else(|| result.error.clone())
                .unwrap_or_else(|| "Execution failed".to_string());
            (SessionState::Error, message)
        };

        if let Err(e) = self.transition(state, message.clone()) {
            warn!("Final state not applied: {}", e);
        }
        self.status.send_modify(|s| s.result = Some(result.clone()));

        info!(
            "Run finished: success={} confirmed={}",
            result.success,
            result.confirmed_signatures().len()
        );
        let _ = self
            .events
            .send(SessionEvent::Completed(SessionOutcome::of(result, &message)));
    }

    async fn report(
        &self,
        reporter: &dyn ResultReporter,
        params: &StrategyConfig,
        quotes: &StrategyQuotes,
        result: &ExecutionResult,
    ) {
        let Some(report) = position_report(params, quotes, result) else {
            return;
        };

        match reporter.report(&report).await {
            Ok(()) => info!("Position reported ({:?})", report.status),
            Err(e) => warn!("Position report failed: {}", e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Report for the short step: `failed` when it failed, `success` only when
/// the whole run confirmed
fn position_report(
    params: &StrategyConfig,
    quotes: &StrategyQuotes,
    result: &ExecutionResult,
) -> Option<PositionReport> {
    let short = result.transactions.get(SHORT_STEP_INDEX)?;

    let status = if result.failed_at_index == Some(SHORT_STEP_INDEX) {
        ReportStatus::Failed
    } else if result.success && short.status == StepStatus::Confirmed && short.signature.is_some()
    {
        ReportStatus::Success
    } else {
        return None;
    };

    Some(PositionReport {
        market_name: params.market_name.clone(),
        size: quotes.short_size.unwrap_or(Decimal::ZERO),
        deposit_amount: quotes.deposit_amount,
        signature: short.signature.clone(),
        timestamp: chrono::Utc::now(),
        status,
        error: match status {
            ReportStatus::Failed => short.error.clone().or_else(|| result.error.clone()),
            ReportStatus::Success => None,
        },
    })
}
