use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: i64 },

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// An unsigned value transfer. The detached signature travels beside it
/// and is never part of the block that commits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: Address,

    /// Recipient's address
    pub recipient: Address,

    /// Amount being transferred
    pub amount: u64,
}

impl Transaction {
    pub fn new(sender: Address, recipient: Address, amount: u64) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
        }
    }

    /// Creates a coinbase transfer paying `amount` to `recipient`
    pub fn new_coinbase(recipient: Address, amount: u64) -> Self {
        Self::new(Address::mint(), recipient, amount)
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_mint()
    }

    /// The exact bytes that get signed: compact JSON with sorted keys
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        // serde_json::Map is ordered by key, so field order never leaks in
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Signs the transaction with a wallet's private key
    pub fn sign(&self, wallet: &Wallet) -> Result<DigitalSignature, TransactionError> {
        let message = self.signing_bytes()?;
        Ok(wallet.sign(&message))
    }

    /// Signs the transaction with a hex-encoded private key
    pub fn sign_with_secret_hex(&self, secret_hex: &str) -> Result<DigitalSignature, TransactionError> {
        let wallet = Wallet::from_secret_hex(secret_hex)?;
        self.sign(&wallet)
    }

    /// Checks `signature` against the sender's declared public key.
    /// Any decoding problem counts as a failed verification.
    pub fn verify(&self, signature: &DigitalSignature) -> bool {
        match self.try_verify(signature) {
            Ok(valid) => valid,
            Err(err) => {
                debug!("Signature check failed for sender {}: {}", self.sender, err);
                false
            }
        }
    }

    /// Same as [`Transaction::verify`] for a signature still in hex form
    pub fn verify_hex(&self, signature_hex: &str) -> bool {
        match signature_hex.parse::<DigitalSignature>() {
            Ok(signature) => self.verify(&signature),
            Err(err) => {
                debug!("Malformed signature from {}: {}", self.sender, err);
                false
            }
        }
    }

    fn try_verify(&self, signature: &DigitalSignature) -> Result<bool, TransactionError> {
        let public_key = self.sender.to_public_key()?;
        let message = self.signing_bytes()?;
        Ok(verify_signature(&message, signature, &public_key))
    }
}
