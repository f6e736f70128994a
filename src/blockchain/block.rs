use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Proof stored in the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Previous-hash sentinel stored in the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "1";

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Block {0} has no previous hash")]
    MissingPreviousHash(u64),
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// 1-based position of the block in the chain
    pub index: u64,

    /// Creation time, carried on the wire as Unix milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub timestamp: DateTime<Utc>,

    /// Transactions in commit order
    pub transactions: Vec<Transaction>,

    /// Proof of work solving the puzzle against the previous block
    pub proof: u64,

    /// Hash of the previous block
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `proof` - The proof of work
    /// * `previous_hash` - The hash of the previous block; must not be empty
    /// * `transactions` - The transactions to commit
    /// * `timestamp` - Creation time, defaults to now
    pub fn new(
        index: u64,
        proof: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self, BlockError> {
        if previous_hash.is_empty() {
            return Err(BlockError::MissingPreviousHash(index));
        }

        // Millisecond precision is all the wire format keeps
        let timestamp = timestamp.unwrap_or_else(Utc::now).trunc_subsecs(3);

        Ok(Block {
            index,
            timestamp,
            transactions,
            proof,
            previous_hash,
        })
    }

    /// The genesis block. Identical on every node so independently started
    /// chains share their first link.
    pub fn genesis() -> Self {
        Block {
            index: 1,
            timestamp: DateTime::<Utc>::default(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    /// Canonical serialization: compact JSON with lexicographically sorted keys
    pub fn canonical_json(&self) -> String {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp.timestamp_millis(),
            "transactions": self.transactions,
            "proof": self.proof,
            "previous_hash": self.previous_hash,
        });

        block_data.to_string()
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the canonical serialization as a hexadecimal string
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
