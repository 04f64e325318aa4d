use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroize;

use super::Signer;
use crate::domain::{SignedTransaction, TxSignature, UnsignedTransaction};
use crate::error::{Result, SeqError};

/// Local ed25519 keypair signer
///
/// # Security
/// Secret material read from files or the environment is zeroized as soon as
/// the signing key has been constructed. The key itself zeroizes on drop.
#[derive(Clone)]
pub struct KeypairSigner {
    key: SigningKey,
    address: String,
}

impl KeypairSigner {
    /// Create a signer from a 64-byte keypair (secret || public) or a 32-byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = match bytes.len() {
            64 => {
                let mut buf = [0u8; 64];
                buf.copy_from_slice(bytes);
                let key = SigningKey::from_keypair_bytes(&buf)
                    .map_err(|e| SeqError::Wallet(format!("Invalid keypair: {}", e)));
                buf.zeroize();
                key?
            }
            32 => {
                let mut buf = [0u8; 32];
                buf.copy_from_slice(bytes);
                let key = SigningKey::from_bytes(&buf);
                buf.zeroize();
                key
            }
            n => {
                return Err(SeqError::Wallet(format!(
                    "Invalid keypair length: expected 32 or 64 bytes, got {}",
                    n
                )))
            }
        };

        let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
        Ok(Self { key, address })
    }

    /// Create a signer from a base58-encoded secret
    pub fn from_base58(secret: &str) -> Result<Self> {
        let mut bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| SeqError::Wallet(format!("Invalid base58 secret: {}", e)))?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Load a JSON keypair file (array of 64 bytes)
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut raw = std::fs::read_to_string(path)?;
        let parsed: std::result::Result<Vec<u8>, _> = serde_json::from_str(&raw);
        raw.zeroize();

        let mut bytes = parsed.map_err(|e| {
            SeqError::Wallet(format!("Invalid keypair file {}: {}", path.display(), e))
        })?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();

        let signer = result?;
        info!("Keypair loaded from {}: {}", path.display(), signer.address);
        Ok(signer)
    }

    /// Create a signer from the `SEQTX_KEYPAIR` environment variable
    pub fn from_env() -> Result<Self> {
        let mut secret = std::env::var("SEQTX_KEYPAIR").map_err(|_| {
            SeqError::Wallet("SEQTX_KEYPAIR environment variable not set".to_string())
        })?;

        let result = Self::from_base58(&secret);
        secret.zeroize();
        result
    }

    /// Resolve a signer from an explicit path, the environment, or the
    /// default keypair location, in that order
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if std::env::var("SEQTX_KEYPAIR").is_ok() {
            return Self::from_env();
        }
        match default_keypair_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Err(SeqError::Wallet(
                "no keypair configured (signer.keypair_path, SEQTX_KEYPAIR, or ~/.config/solana/id.json)"
                    .to_string(),
            )),
        }
    }

    /// Fresh random keypair (dry runs)
    pub fn generate() -> Self {
        let mut seed: [u8; 32] = rand::random();
        let key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
        Self { key, address }
    }

    /// Check a base58 signature over `message` against this key
    pub fn verify(&self, message: &[u8], signature: &str) -> bool {
        let Ok(bytes) = bs58::decode(signature).into_vec() else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&bytes);
        self.key.verifying_key().verify_strict(message, &sig).is_ok()
    }
}

fn default_keypair_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("solana").join("id.json"))
}

#[async_trait]
impl Signer for KeypairSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        if tx.fee_payer != self.address {
            return Err(SeqError::Signature(format!(
                "fee payer {} does not match signer {}",
                tx.fee_payer, self.address
            )));
        }

        let message = tx.message_bytes()?;
        let signature = self.key.sign(&message);

        Ok(SignedTransaction {
            signatures: vec![TxSignature {
                signer: self.address.clone(),
                signature: bs58::encode(signature.to_bytes()).into_string(),
            }],
            message: tx,
        })
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("address", &self.address)
            .finish()
    }
}
