use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqError};

/// Token program that owns fungible token accounts
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Instruction tag for a decimals-checked token transfer
const TRANSFER_CHECKED_TAG: u8 = 12;

/// Account referenced by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub address: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: impl Into<String>, is_signer: bool) -> Self {
        Self {
            address: address.into(),
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(address: impl Into<String>, is_signer: bool) -> Self {
        Self {
            address: address.into(),
            is_signer,
            is_writable: false,
        }
    }
}

/// A single program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Transaction ready to be signed.
///
/// `recent_token` is the anti-replay token the network issued when the
/// transaction was built. It expires after a bounded number of blocks, so
/// transactions are built immediately before they are signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub fee_payer: String,
    pub recent_token: String,
    pub instructions: Vec<Instruction>,
}

impl UnsignedTransaction {
    pub fn new(fee_payer: impl Into<String>, recent_token: impl Into<String>) -> Self {
        Self {
            fee_payer: fee_payer.into(),
            recent_token: recent_token.into(),
            instructions: Vec::new(),
        }
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Bytes covered by the signature
    pub fn message_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Signature produced by one signer, base58 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub signer: String,
    pub signature: String,
}

/// Transaction with its signatures attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub message: UnsignedTransaction,
    pub signatures: Vec<TxSignature>,
}

impl SignedTransaction {
    /// The fee payer's signature, which identifies the transaction on the ledger
    pub fn signature(&self) -> Option<&str> {
        self.signatures
            .iter()
            .find(|s| s.signer == self.message.fee_payer)
            .or_else(|| self.signatures.first())
            .map(|s| s.signature.as_str())
    }

    /// Base64 payload handed to the node
    pub fn to_wire(&self) -> Result<String> {
        Ok(BASE64_STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn from_wire(encoded: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| SeqError::Validation(format!("invalid transaction encoding: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Convert a UI amount into integer base units for a token with `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u64> {
    if amount.is_sign_negative() {
        return Err(SeqError::Validation(format!(
            "amount must not be negative: {}",
            amount
        )));
    }

    if decimals > 18 {
        return Err(SeqError::Validation(format!(
            "unsupported token decimals: {}",
            decimals
        )));
    }

    let scale = Decimal::from(10u64.pow(decimals as u32));
    (amount * scale)
        .trunc()
        .to_u64()
        .ok_or_else(|| SeqError::Validation(format!("amount out of range: {}", amount)))
}

/// Plain token transfer from `owner` to `destination`.
///
/// Token accounts are resolved by the ledger from the owner and mint.
pub fn token_transfer(
    owner: &str,
    mint: &str,
    destination: &str,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(10);
    data.push(TRANSFER_CHECKED_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    Instruction {
        program_id: TOKEN_PROGRAM_ID.to_string(),
        accounts: vec![
            AccountMeta::writable(owner, true),
            AccountMeta::readonly(mint, false),
            AccountMeta::writable(destination, false),
        ],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec!(1.5), 6).unwrap(), 1_500_000);
        assert_eq!(to_base_units(dec!(0.0000019), 6).unwrap(), 1);
        assert_eq!(to_base_units(dec!(0), 9).unwrap(), 0);
        assert!(to_base_units(dec!(-1), 6).is_err());
    }

    #[test]
    fn test_token_transfer_layout() {
        let ix = token_transfer("owner", "mint", "dest", 1_000_000, 6);

        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
        assert_eq!(ix.data[0], 12);
        assert_eq!(&ix.data[1..9], &1_000_000u64.to_le_bytes());
        assert_eq!(ix.data[9], 6);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[2].address, "dest");
    }

    #[test]
    fn test_signature_prefers_fee_payer() {
        let tx = SignedTransaction {
            message: UnsignedTransaction::new("payer", "token"),
            signatures: vec![
                TxSignature {
                    signer: "other".into(),
                    signature: "sigOther".into(),
                },
                TxSignature {
                    signer: "payer".into(),
                    signature: "sigPayer".into(),
                },
            ],
        };
        assert_eq!(tx.signature(), Some("sigPayer"));
    }

    #[test]
    fn test_wire_encoding_is_reversible() {
        let tx = SignedTransaction {
            message: UnsignedTransaction::new("payer", "token")
                .with_instruction(token_transfer("payer", "mint", "dest", 5, 0)),
            signatures: vec![],
        };
        let wire = tx.to_wire().unwrap();
        assert_eq!(SignedTransaction::from_wire(&wire).unwrap(), tx);
        assert!(SignedTransaction::from_wire("not base64!").is_err());
    }
}
