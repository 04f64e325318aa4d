//! Session runs over the paper ledger and paper venues

use async_trait::async_trait;
use rust_decimal_macros::dec;
use seqtx::config::{AppConfig, StrategyConfig};
use seqtx::domain::{
    SessionState, SignedTransaction, StepStatus, TxSignature, UnsignedTransaction,
};
use seqtx::engine::ExecutionEngine;
use seqtx::error::{Result, SeqError};
use seqtx::session::{
    PaperPerpVenue, PaperSwapRouter, PositionReport, ReportStatus, ResultReporter,
    SessionController, SessionDeps, SessionEvent, SwapQuote, SwapRequest, SwapRouter,
};
use seqtx::signing::Signer;
use seqtx::transport::{PaperLedger, PaperLedgerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::TryRecvError;

const OWNER: &str = "Owner11111111111111111111111111111111111111";

/// Signs with sigA, sigB, sigC, ...
struct LabelSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl Signer for LabelSigner {
    fn address(&self) -> String {
        OWNER.to_string()
    }

    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let label = (b'A' + n as u8) as char;
        Ok(SignedTransaction {
            message: tx,
            signatures: vec![TxSignature {
                signer: OWNER.to_string(),
                signature: format!("sig{}", label),
            }],
        })
    }
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<PositionReport>>,
}

impl RecordingReporter {
    fn reports(&self) -> Vec<PositionReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultReporter for RecordingReporter {
    async fn report(&self, report: &PositionReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct FailingReporter;

#[async_trait]
impl ResultReporter for FailingReporter {
    async fn report(&self, _report: &PositionReport) -> Result<()> {
        Err(SeqError::Internal("report endpoint down".to_string()))
    }
}

struct PanickingRouter;

#[async_trait]
impl SwapRouter for PanickingRouter {
    async fn quote(&self, _request: &SwapRequest) -> Result<SwapQuote> {
        panic!("quote table corrupted");
    }
}

struct Harness {
    controller: SessionController,
    ledger: Arc<PaperLedger>,
    venue: Arc<PaperPerpVenue>,
    params: StrategyConfig,
}

fn harness(ledger: PaperLedgerConfig, venue: PaperPerpVenue) -> Harness {
    harness_with_router(ledger, venue, Arc::new(PaperSwapRouter::new(dec!(150))))
}

fn harness_with_router(
    ledger: PaperLedgerConfig,
    venue: PaperPerpVenue,
    swap: Arc<dyn SwapRouter>,
) -> Harness {
    let config = AppConfig::default_config(true);
    let ledger = Arc::new(PaperLedger::new(ledger));
    let venue = Arc::new(venue);

    let controller = SessionController::new(
        SessionDeps {
            transport: ledger.clone(),
            swap,
            perp: venue.clone(),
        },
        ExecutionEngine::new(&config.execution),
        config.transfer_policy(),
    );

    Harness {
        controller,
        ledger,
        venue,
        params: config.strategy,
    }
}

async fn with_signer(h: &Harness) {
    h.controller
        .set_signer(Arc::new(LabelSigner {
            calls: AtomicUsize::new(0),
        }))
        .await;
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn state_path(events: &[SessionEvent]) -> Vec<SessionState> {
    let mut path = Vec::new();
    for event in events {
        if let SessionEvent::StateChanged(t) = event {
            if path.is_empty() {
                path.push(t.from);
            }
            path.push(t.to);
        }
    }
    path
}

#[tokio::test]
async fn all_steps_succeed_and_short_is_reported() {
    let h = harness(PaperLedgerConfig::default(), PaperPerpVenue::new(dec!(150)));
    with_signer(&h).await;
    let mut events = h.controller.subscribe();
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(result.success, "{:?}", result.error);
    let signatures: Vec<_> = result.transactions.iter().map(|t| t.signature.clone()).collect();
    assert_eq!(
        signatures,
        vec![Some("sigA".into()), Some("sigB".into()), Some("sigC".into())]
    );
    assert_eq!(h.ledger.submitted().await, vec!["sigA", "sigB", "sigC"]);

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Success);
    assert_eq!(reports[0].signature.as_deref(), Some("sigB"));
    assert_eq!(reports[0].market_name, "SOL-PERP");
    // 100 USDC at 150 -> 0.666666666 SOL; half of its notional as collateral
    assert_eq!(reports[0].size, dec!(0.666666666));
    assert_eq!(reports[0].deposit_amount, Some(dec!(50)));

    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Success);
    assert_eq!(status.message, "All transactions confirmed");
    assert_eq!(status.result.as_ref(), Some(&result));

    let events = drain(&mut events);
    assert_eq!(
        state_path(&events),
        vec![
            SessionState::Idle,
            SessionState::Initializing,
            SessionState::ExecutingSwap,
            SessionState::ExecutingShort,
            SessionState::ExecutingTransfer,
            SessionState::Success,
        ]
    );
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Completed(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].success);
    assert_eq!(completed[0].signatures, vec!["sigA", "sigB", "sigC"]);

    assert_eq!(h.venue.connects(), 1);
    assert_eq!(h.venue.shutdowns(), 1);
}

#[tokio::test]
async fn simulation_failure_at_short_step() {
    let h = harness(
        PaperLedgerConfig::default().fail_simulation(1, "custom program error: 0x1770"),
        PaperPerpVenue::new(dec!(150)),
    );
    with_signer(&h).await;
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(!result.success);
    assert_eq!(result.failed_at_index, Some(1));
    let statuses: Vec<_> = result.transactions.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Confirmed, StepStatus::Failed, StepStatus::Pending]
    );
    assert!(result.transactions[1].signature.is_none());
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Simulation failed: custom program error: 0x1770"));

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Failed);
    assert!(reports[0].signature.is_none());
    assert!(reports[0]
        .error
        .as_deref()
        .unwrap()
        .contains("custom program error: 0x1770"));

    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Error);
    assert!(status.message.starts_with("Open Short failed: Simulation failed"));

    // Torn down on the error path too
    assert_eq!(h.venue.connects(), 1);
    assert_eq!(h.venue.shutdowns(), 1);
}

#[tokio::test]
async fn swap_failure_is_not_reported() {
    let h = harness(
        PaperLedgerConfig::default().fail_execution(0, "SlippageToleranceExceeded"),
        PaperPerpVenue::new(dec!(150)),
    );
    with_signer(&h).await;
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert_eq!(result.failed_at_index, Some(0));
    assert_eq!(result.transactions[0].signature.as_deref(), Some("sigA"));
    assert!(reporter.reports().is_empty());
    assert_eq!(h.venue.shutdowns(), 1);
}

#[tokio::test]
async fn transfer_failure_after_short_is_not_reported() {
    let h = harness(
        PaperLedgerConfig::default().fail_execution(2, "TransferFailed"),
        PaperPerpVenue::new(dec!(150)),
    );
    with_signer(&h).await;
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(!result.success);
    assert_eq!(result.failed_at_index, Some(2));
    assert_eq!(result.transactions[1].status, StepStatus::Confirmed);
    assert_eq!(result.transactions[1].signature.as_deref(), Some("sigB"));
    assert!(reporter.reports().is_empty());
    assert_eq!(h.controller.status().state, SessionState::Error);
    assert_eq!(h.venue.shutdowns(), 1);
}

#[tokio::test]
async fn missing_signer_is_rejected_without_events() {
    let h = harness(PaperLedgerConfig::default(), PaperPerpVenue::new(dec!(150)));
    let mut events = h.controller.subscribe();
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(!result.success);
    assert!(result.transactions.is_empty());
    assert_eq!(result.error.as_deref(), Some("Wallet not connected"));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(reporter.reports().is_empty());

    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.message, "Wallet not connected");
    assert_eq!(h.venue.connects(), 0);
    assert_eq!(h.ledger.simulations().await, 0);
}

#[tokio::test]
async fn client_init_failure_stops_before_building() {
    let h = harness(
        PaperLedgerConfig::default(),
        PaperPerpVenue::new(dec!(150)).failing_connect("websocket refused"),
    );
    with_signer(&h).await;
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Client initialization failed: websocket refused")
    );
    assert_eq!(result.failed_at_index, None);
    assert!(result
        .transactions
        .iter()
        .all(|t| t.status == StepStatus::Pending));
    assert_eq!(h.ledger.simulations().await, 0);
    assert!(reporter.reports().is_empty());

    assert_eq!(h.controller.status().state, SessionState::Error);
    assert_eq!(h.venue.connects(), 1);
    assert_eq!(h.venue.shutdowns(), 0);
}

#[tokio::test]
async fn reporter_errors_are_swallowed() {
    let h = harness(PaperLedgerConfig::default(), PaperPerpVenue::new(dec!(150)));
    with_signer(&h).await;

    let result = h.controller.execute(&h.params, Some(&FailingReporter)).await;

    assert!(result.success);
    assert_eq!(h.controller.status().state, SessionState::Success);
}

#[tokio::test]
async fn reset_returns_to_idle_and_allows_another_run() {
    let h = harness(PaperLedgerConfig::default(), PaperPerpVenue::new(dec!(150)));
    with_signer(&h).await;

    let first = h.controller.execute(&h.params, None).await;
    assert!(first.success);

    h.controller.reset();
    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.message, "Ready");
    assert!(status.result.is_none());

    // Each run gets its own client
    with_signer(&h).await;
    let second = h.controller.execute(&h.params, None).await;
    assert!(second.success);
    assert_eq!(h.venue.connects(), 2);
    assert_eq!(h.venue.shutdowns(), 2);
}

#[tokio::test]
async fn transfer_below_policy_minimum_is_rejected() {
    let h = harness(PaperLedgerConfig::default(), PaperPerpVenue::new(dec!(150)));
    with_signer(&h).await;

    let mut params = h.params.clone();
    params.transfer_amount = dec!(0.001);
    let result = h.controller.execute(&params, None).await;

    assert!(!result.success);
    assert!(result.transactions.is_empty());
    assert!(result.error.as_deref().unwrap().starts_with("Validation failed"));
    assert_eq!(h.venue.connects(), 0);
}

#[tokio::test]
async fn reset_after_failed_run_allows_another_run() {
    let h = harness(
        PaperLedgerConfig::default().fail_simulation(1, "custom program error: 0x1770"),
        PaperPerpVenue::new(dec!(150)),
    );
    with_signer(&h).await;

    let first = h.controller.execute(&h.params, None).await;
    assert!(!first.success);
    assert_eq!(h.controller.status().state, SessionState::Error);

    h.controller.reset();
    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.message, "Ready");
    assert!(status.result.is_none());

    // Ledger ordinals count simulations, so the injected failure is spent
    with_signer(&h).await;
    let second = h.controller.execute(&h.params, None).await;
    assert!(second.success, "{:?}", second.error);
    assert_eq!(h.controller.status().state, SessionState::Success);
    assert_eq!(h.venue.connects(), 2);
    assert_eq!(h.venue.shutdowns(), 2);
}

#[tokio::test]
async fn panicking_builder_still_releases_client() {
    let h = harness_with_router(
        PaperLedgerConfig::default(),
        PaperPerpVenue::new(dec!(150)),
        Arc::new(PanickingRouter),
    );
    with_signer(&h).await;
    let reporter = RecordingReporter::default();

    let result = h.controller.execute(&h.params, Some(&reporter)).await;

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("quote table corrupted"));
    assert!(reporter.reports().is_empty());
    assert_eq!(h.controller.status().state, SessionState::Error);
    assert_eq!(h.venue.connects(), 1);
    assert_eq!(h.venue.shutdowns(), 1);
}
