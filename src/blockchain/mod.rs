// Blockchain module
//
// The ledger core:
// - Transaction signing and verification
// - Block structure and canonical hashing
// - Proof of work
// - Balance table derived from committed blocks
// - The ledger itself: pending pool, sealing, validation, reconciliation
// - Optional sled persistence

pub mod balance;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod proof;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use balance::{AccountBalance, BalanceTable};
pub use block::Block;
pub use chain::{Blockchain, BlockchainError, SubmitPolicy, MINING_REWARD};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use transaction::Transaction;
