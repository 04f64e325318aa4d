//! Interactive approval in front of a signer
//!
//! Every signature request is forwarded to whoever holds the receiving end
//! of the approval channel (a terminal prompt, a wallet UI bridge) and only
//! reaches the inner signer once approved. There is no deadline: the
//! request waits for as long as the approver takes.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::Signer;
use crate::domain::{SignedTransaction, UnsignedTransaction};
use crate::error::{Result, SeqError};

/// What the approver sees before deciding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub fee_payer: String,
    pub recent_token: String,
    pub programs: Vec<String>,
    pub instruction_count: usize,
}

impl TransactionSummary {
    pub fn of(tx: &UnsignedTransaction) -> Self {
        let mut programs: Vec<String> = Vec::new();
        for ix in &tx.instructions {
            if !programs.contains(&ix.program_id) {
                programs.push(ix.program_id.clone());
            }
        }

        Self {
            fee_payer: tx.fee_payer.clone(),
            recent_token: tx.recent_token.clone(),
            programs,
            instruction_count: tx.instructions.len(),
        }
    }
}

impl std::fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} instruction(s) via [{}], fee payer {}",
            self.instruction_count,
            self.programs.join(", "),
            self.fee_payer
        )
    }
}

/// Pending approval; dropping it without answering rejects the request
#[derive(Debug)]
pub struct ApprovalRequest {
    pub summary: TransactionSummary,
    respond: oneshot::Sender<bool>,
}

impl ApprovalRequest {
    pub fn approve(self) {
        let _ = self.respond.send(true);
    }

    pub fn reject(self) {
        let _ = self.respond.send(false);
    }
}

/// Signer that asks for approval before delegating to `inner`
pub struct ApprovalSigner<S> {
    inner: S,
    requests: mpsc::Sender<ApprovalRequest>,
}

impl<S: Signer> ApprovalSigner<S> {
    /// Wrap `inner`; approvals are answered through the returned receiver
    pub fn new(inner: S) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (requests, rx) = mpsc::channel(1);
        (Self { inner, requests }, rx)
    }
}

#[async_trait]
impl<S: Signer> Signer for ApprovalSigner<S> {
    fn address(&self) -> String {
        self.inner.address()
    }

    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let (respond, decision) = oneshot::channel();
        let request = ApprovalRequest {
            summary: TransactionSummary::of(&tx),
            respond,
        };

        debug!("Requesting approval: {}", request.summary);
        self.requests
            .send(request)
            .await
            .map_err(|_| SeqError::Wallet("approval handler is not running".to_string()))?;

        match decision.await {
            Ok(true) => self.inner.sign(tx).await,
            Ok(false) => {
                warn!("Signature request rejected");
                Err(SeqError::SignatureRejected(
                    "User rejected the request".to_string(),
                ))
            }
            Err(_) => Err(SeqError::SignatureRejected(
                "approval request dropped".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token_transfer;
    use crate::signing::KeypairSigner;

    #[tokio::test]
    async fn test_approved_request_is_signed() {
        let inner = KeypairSigner::from_bytes(&[3u8; 32]).unwrap();
        let address = inner.address();
        let (signer, mut rx) = ApprovalSigner::new(inner);

        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                assert_eq!(req.summary.instruction_count, 1);
                req.approve();
            }
        });

        let tx = UnsignedTransaction::new(address.clone(), "token")
            .with_instruction(token_transfer(&address, "mint", "dest", 1, 0));
        let signed = signer.sign(tx).await.unwrap();
        assert!(signed.signature().is_some());
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let inner = KeypairSigner::from_bytes(&[3u8; 32]).unwrap();
        let address = inner.address();
        let (signer, mut rx) = ApprovalSigner::new(inner);

        tokio::spawn(async move {
            if let Some(req) = rx.recv().await {
                req.reject();
            }
        });

        let err = signer
            .sign(UnsignedTransaction::new(address, "token"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Signature rejected: User rejected the request");
    }

    #[tokio::test]
    async fn test_no_handler() {
        let inner = KeypairSigner::from_bytes(&[3u8; 32]).unwrap();
        let address = inner.address();
        let (signer, rx) = ApprovalSigner::new(inner);
        drop(rx);

        let err = signer
            .sign(UnsignedTransaction::new(address, "token"))
            .await
            .unwrap_err();
        assert!(matches!(err, SeqError::Wallet(_)));
    }
}
