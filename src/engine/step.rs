use futures::future::BoxFuture;
use std::future::Future;

use crate::domain::{StepProgress, UnsignedTransaction};
use crate::error::Result;
use crate::transport::ConfirmationBound;

/// Builder capability for one step: takes a fresh anti-replay bound and
/// produces the transaction to sign. Called at most once per run.
pub type BuildFn<'a> =
    Box<dyn FnOnce(ConfirmationBound) -> BoxFuture<'a, Result<UnsignedTransaction>> + Send + 'a>;

/// Receives a full copy of every step record after each status change
pub type ProgressObserver<'a> = Box<dyn FnMut(Vec<StepProgress>) + Send + 'a>;

/// One step of a sequential run
pub struct StepDescriptor<'a> {
    name: String,
    build: BuildFn<'a>,
}

impl<'a> StepDescriptor<'a> {
    pub fn new<F, Fut>(name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(ConfirmationBound) -> Fut + Send + 'a,
        Fut: Future<Output = Result<UnsignedTransaction>> + Send + 'a,
    {
        Self {
            name: name.into(),
            build: Box::new(move |bound| Box::pin(build(bound))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_build(self) -> BuildFn<'a> {
        self.build
    }
}

impl std::fmt::Debug for StepDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
