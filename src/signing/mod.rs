pub mod approval;
pub mod keypair;

pub use approval::{ApprovalRequest, ApprovalSigner, TransactionSummary};
pub use keypair::KeypairSigner;

use async_trait::async_trait;

use crate::domain::{SignedTransaction, UnsignedTransaction};
use crate::error::Result;

/// Single-transaction signing capability.
///
/// Signing may wait on a person approving the request, so callers must not
/// put a deadline on it.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address of the signing account, used as fee payer
    fn address(&self) -> String;

    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction>;
}
