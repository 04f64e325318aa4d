use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::step::{BuildFn, ProgressObserver, StepDescriptor};
use crate::config::ExecutionConfig;
use crate::domain::{ExecutionResult, StepProgress, StepStatus};
use crate::error::{describe, with_logs, SeqError};
use crate::signing::Signer;
use crate::transport::{ConfirmationRequest, SubmitOptions, Transport};

/// Sequential executor for multi-transaction runs
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    options: SubmitOptions,
}

/// Why a step stopped, plus the signature if it already reached the network
#[derive(Debug)]
struct StepFailure {
    message: String,
    signature: Option<String>,
}

impl StepFailure {
    fn after_submit(err: &SeqError, signature: &str) -> Self {
        Self {
            message: describe(err),
            signature: Some(signature.to_string()),
        }
    }
}

impl From<SeqError> for StepFailure {
    fn from(err: SeqError) -> Self {
        Self {
            message: describe(&err),
            signature: None,
        }
    }
}

/// Step records for one run, plus the observer that sees every change
struct RunTracker<'o> {
    records: Vec<StepProgress>,
    observer: Option<ProgressObserver<'o>>,
}

impl<'o> RunTracker<'o> {
    fn new(names: Vec<String>, observer: Option<ProgressObserver<'o>>) -> Self {
        let records = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| StepProgress::pending(index, name))
            .collect();
        Self { records, observer }
    }

    fn advance(&mut self, index: usize, status: StepStatus) {
        let record = &mut self.records[index];
        if !record.status.can_transition_to(status) {
            // Engine bug, not a runtime condition
            error!(
                "Step {} '{}': invalid transition {} -> {}",
                index, record.name, record.status, status
            );
            debug_assert!(false, "invalid step transition");
        }

        debug!("Step {} '{}': {} -> {}", index, record.name, record.status, status);
        record.status = status;
        self.emit();
    }

    fn set_signature(&mut self, index: usize, signature: &str) {
        self.records[index].signature = Some(signature.to_string());
    }

    fn fail(&mut self, index: usize, failure: StepFailure) {
        let record = &mut self.records[index];
        if failure.signature.is_some() {
            record.signature = failure.signature;
        }
        record.error = Some(failure.message);
        self.advance(index, StepStatus::Failed);
    }

    fn emit(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(self.records.clone());
        }
    }

    fn finish(self, failed_at: Option<usize>) -> ExecutionResult {
        let error = failed_at.and_then(|i| self.records[i].error.clone());
        ExecutionResult {
            success: failed_at.is_none(),
            transactions: self.records,
            error,
            failed_at_index: failed_at,
        }
    }
}

impl ExecutionEngine {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            options: SubmitOptions {
                skip_preflight: config.skip_preflight,
                max_retries: config.max_retries,
            },
        }
    }

    pub fn with_options(options: SubmitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SubmitOptions {
        self.options
    }

    /// Run `steps` in order, one transaction at a time.
    ///
    /// Each step is built immediately before signing, so the anti-replay
    /// token it embeds is as fresh as possible when the signer approves. The
    /// first failing step halts the run; the returned result carries every
    /// step record so callers can see what confirmed before it.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), steps = steps.len()))]
    pub async fn execute<'s>(
        &self,
        transport: &dyn Transport,
        signer: &dyn Signer,
        steps: Vec<StepDescriptor<'s>>,
        on_progress: Option<ProgressObserver<'_>>,
    ) -> ExecutionResult {
        if steps.is_empty() {
            warn!("Execution requested with no steps");
            return ExecutionResult::rejected("No transactions to execute");
        }

        let names = steps.iter().map(|s| s.name().to_string()).collect();
        let mut run = RunTracker::new(names, on_progress);
        let total = steps.len();

        for (index, step) in steps.into_iter().enumerate() {
            let name = step.name().to_string();
            info!("Step {}/{} '{}' starting", index + 1, total, name);

            match self
                .run_step(transport, signer, &mut run, index, step.into_build())
                .await
            {
                Ok(signature) => {
                    run.set_signature(index, &signature);
                    run.advance(index, StepStatus::Confirmed);
                    info!("Step {}/{} '{}' confirmed: {}", index + 1, total, name, signature);
                }
                Err(failure) => {
                    error!(
                        "Step {}/{} '{}' failed: {}",
                        index + 1,
                        total,
                        name,
                        failure.message
                    );
                    run.fail(index, failure);
                    return run.finish(Some(index));
                }
            }
        }

        run.finish(None)
    }

    async fn run_step(
        &self,
        transport: &dyn Transport,
        signer: &dyn Signer,
        run: &mut RunTracker<'_>,
        index: usize,
        build: BuildFn<'_>,
    ) -> std::result::Result<String, StepFailure> {
        run.advance(index, StepStatus::Building);
        let bound = transport.confirmation_bound().await?;
        let unsigned = build(bound).await?;

        run.advance(index, StepStatus::Signing);
        let signed = signer.sign(unsigned).await?;

        run.advance(index, StepStatus::Submitting);
        let simulation = transport.simulate(&signed).await?;
        if let Some(err) = simulation.error {
            return Err(StepFailure {
                message: with_logs(SeqError::Simulation(err).to_string(), &simulation.logs),
                signature: None,
            });
        }
        debug!(
            "Simulation passed ({} units)",
            simulation.units_consumed.unwrap_or_default()
        );

        let signature = transport.submit(&signed, self.options).await?;
        run.set_signature(index, &signature);
        run.advance(index, StepStatus::Confirming);

        // The build-time bound may be close to expiry by now
        let bound = transport
            .confirmation_bound()
            .await
            .map_err(|e| StepFailure::after_submit(&e, &signature))?;
        let outcome = transport
            .confirm(&ConfirmationRequest::new(signature.clone(), bound))
            .await
            .map_err(|e| StepFailure::after_submit(&e, &signature))?;

        if let Some(err) = outcome.error {
            return Err(StepFailure::after_submit(
                &SeqError::Confirmation(err),
                &signature,
            ));
        }

        Ok(signature)
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::with_options(SubmitOptions::default())
    }
}
