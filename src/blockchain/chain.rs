use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::balance::{pending_net_for, AccountBalance, BalanceTable};
use super::block::{Block, BlockError};
use super::crypto::{Address, DigitalSignature};
use super::proof::valid_proof;
use super::storage::{BlockchainStorage, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Coins paid to the node that seals a block
pub const MINING_REWARD: u64 = 1;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Stale proof: expected previous hash {expected}, got {got}")]
    StaleProof { expected: String, got: String },

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// What the ledger checks before pooling a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SubmitPolicy {
    /// Pool whatever the caller hands over; the caller has already verified it
    #[default]
    TrustCaller,
    /// Require a valid signature and a sufficient spendable balance
    ValidateOnSubmit,
}

/// Everything guarded by the ledger lock
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    balances: BalanceTable,
}

impl LedgerState {
    fn from_chain(chain: Vec<Block>) -> Self {
        let balances = BalanceTable::replay(&chain);
        LedgerState {
            chain,
            pending: Vec::new(),
            balances,
        }
    }

    fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }
}

/// Represents the blockchain
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// Chain, pending pool and balances behind one lock
    state: Arc<Mutex<LedgerState>>,

    /// Checks applied by `submit_transaction`
    policy: SubmitPolicy,

    /// Storage for committed blocks
    storage: Option<Arc<BlockchainStorage>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new in-memory blockchain holding only the genesis block
    pub fn new() -> Self {
        Blockchain {
            state: Arc::new(Mutex::new(LedgerState::from_chain(vec![Block::genesis()]))),
            policy: SubmitPolicy::default(),
            storage: None,
        }
    }

    /// Creates a blockchain backed by the sled database at `storage_path`.
    /// An empty store is initialised with genesis; a stored chain must be valid.
    pub fn with_storage<P: AsRef<std::path::Path>>(storage_path: P) -> Result<Self, BlockchainError> {
        let storage = BlockchainStorage::new(storage_path)?;
        let mut chain = storage.get_all_blocks()?;

        if chain.is_empty() {
            info!("No existing blockchain found in storage, creating genesis block");
            chain.push(Block::genesis());
            storage.replace_chain(&chain)?;
        } else {
            if chain[0] != Block::genesis() {
                return Err(BlockchainError::InvalidChain(
                    "stored genesis block does not match".to_string(),
                ));
            }
            if !Self::is_chain_valid(&chain) {
                return Err(BlockchainError::InvalidChain(
                    "stored chain failed validation".to_string(),
                ));
            }
            info!("Loaded {} blocks from storage", chain.len());
        }

        Ok(Blockchain {
            state: Arc::new(Mutex::new(LedgerState::from_chain(chain))),
            policy: SubmitPolicy::default(),
            storage: Some(Arc::new(storage)),
        })
    }

    pub fn with_submit_policy(mut self, policy: SubmitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn submit_policy(&self) -> SubmitPolicy {
        self.policy
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A panic while holding the lock never leaves a half-applied block
        // behind: every mutation is validated first and applied last.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        self.state().last_block().clone()
    }

    /// Snapshot of `(last_proof, last_hash)` to run a proof search against
    pub fn tip(&self) -> (u64, String) {
        let state = self.state();
        let last = state.last_block();
        (last.proof, last.hash())
    }

    /// Gets the entire blockchain
    pub fn chain(&self) -> Vec<Block> {
        self.state().chain.clone()
    }

    pub fn chain_length(&self) -> usize {
        self.state().chain.len()
    }

    /// Blocks a peer holding only the first `length` blocks is missing
    pub fn blocks_after(&self, length: usize) -> Vec<Block> {
        self.state().chain.iter().skip(length).cloned().collect()
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state().pending.clone()
    }

    /// Adds a transaction to the pending pool
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn submit_transaction(
        &self,
        transaction: Transaction,
        signature: Option<&DigitalSignature>,
    ) -> Result<u64, BlockchainError> {
        let mut state = self.state();

        if self.policy == SubmitPolicy::ValidateOnSubmit {
            Self::check_submission(&state, &transaction, signature)?;
        }

        Ok(Self::pool_locked(&mut state, transaction))
    }

    /// Verifies `signature` and the sender's spendable balance, then pools the
    /// transaction, all under one lock acquisition regardless of the policy
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn submit_checked(
        &self,
        transaction: Transaction,
        signature: &DigitalSignature,
    ) -> Result<u64, BlockchainError> {
        let mut state = self.state();
        Self::check_submission(&state, &transaction, Some(signature))?;

        Ok(Self::pool_locked(&mut state, transaction))
    }

    fn pool_locked(state: &mut LedgerState, transaction: Transaction) -> u64 {
        debug!(
            "Pooled transaction {} -> {} ({})",
            transaction.sender, transaction.recipient, transaction.amount
        );
        state.pending.push(transaction);

        state.last_block().index + 1
    }

    fn check_submission(
        state: &LedgerState,
        transaction: &Transaction,
        signature: Option<&DigitalSignature>,
    ) -> Result<(), BlockchainError> {
        let signature = signature.ok_or(TransactionError::InvalidSignature)?;
        if transaction.is_coinbase() || !transaction.verify(signature) {
            return Err(TransactionError::InvalidSignature.into());
        }

        let available = state
            .balances
            .balance_of(&transaction.sender)
            .saturating_add(pending_net_for(&state.pending, &transaction.sender));
        if i128::from(available) < i128::from(transaction.amount) {
            return Err(TransactionError::InsufficientFunds {
                required: transaction.amount,
                available,
            }
            .into());
        }

        Ok(())
    }

    /// Moves the whole pending pool into a new block sealed with `proof`
    ///
    /// `previous_hash` is the hash the proof was searched against. If the tip
    /// moved since, the proof is stale and nothing changes.
    pub fn seal_block(&self, proof: u64, previous_hash: &str) -> Result<Block, BlockchainError> {
        let mut state = self.state();
        self.seal_locked(&mut state, proof, previous_hash, None)
    }

    /// Same as [`Blockchain::seal_block`], appending a coinbase transfer to
    /// `miner` as the block's last transaction
    pub fn mine_block(&self, proof: u64, previous_hash: &str, miner: &Address) -> Result<Block, BlockchainError> {
        let reward = Transaction::new_coinbase(miner.clone(), MINING_REWARD);
        let mut state = self.state();
        self.seal_locked(&mut state, proof, previous_hash, Some(reward))
    }

    fn seal_locked(
        &self,
        state: &mut LedgerState,
        proof: u64,
        previous_hash: &str,
        reward: Option<Transaction>,
    ) -> Result<Block, BlockchainError> {
        let last = state.last_block();
        let last_hash = last.hash();

        if previous_hash != last_hash {
            return Err(BlockchainError::StaleProof {
                expected: last_hash,
                got: previous_hash.to_string(),
            });
        }
        if !valid_proof(last.proof, proof, &last_hash) {
            return Err(BlockchainError::InvalidBlock(format!(
                "proof {} does not solve block {}",
                proof, last.index
            )));
        }

        let mut transactions = state.pending.clone();
        transactions.extend(reward);
        let block = Block::new(last.index + 1, proof, last_hash, transactions, None)?;

        self.persist_block(&block)?;

        state.pending.clear();
        state.balances.apply_block(&block);
        state.chain.push(block.clone());

        info!(
            "Sealed block {} with {} transactions",
            block.index,
            block.transactions.len()
        );
        Ok(block)
    }

    fn persist_block(&self, block: &Block) -> Result<(), BlockchainError> {
        if let Some(storage) = &self.storage {
            storage.save_block(block)?;
            storage.flush()?;
        }
        Ok(())
    }

    /// Checks that `block` may follow `last` directly
    fn check_successor(last: &Block, block: &Block) -> Result<(), BlockchainError> {
        let expected = last.index.checked_add(1).ok_or_else(|| {
            BlockchainError::InvalidBlock(format!("no index follows {}", last.index))
        })?;
        if block.index != expected {
            return Err(BlockchainError::InvalidBlock(format!(
                "expected index {}, got {}",
                expected, block.index
            )));
        }

        let last_hash = last.hash();
        if block.previous_hash != last_hash {
            return Err(BlockchainError::InvalidBlock(format!(
                "block {} does not link to {}",
                block.index, last_hash
            )));
        }

        if !valid_proof(last.proof, block.proof, &last_hash) {
            return Err(BlockchainError::InvalidBlock(format!(
                "block {} has an invalid proof",
                block.index
            )));
        }

        Ok(())
    }

    /// Walks `chain` checking every link and proof
    ///
    /// # Returns
    ///
    /// true if the chain is valid, false otherwise
    pub fn is_chain_valid(chain: &[Block]) -> bool {
        if chain.is_empty() {
            return false;
        }

        for pair in chain.windows(2) {
            if let Err(err) = Self::check_successor(&pair[0], &pair[1]) {
                debug!("Chain rejected: {}", err);
                return false;
            }
        }

        true
    }

    /// Validates this node's own chain
    pub fn is_valid(&self) -> bool {
        Self::is_chain_valid(&self.state().chain)
    }

    /// Appends a block produced elsewhere if it extends the current tip
    ///
    /// # Returns
    ///
    /// true if the block was appended; false leaves the ledger untouched
    pub fn append_foreign_block(&self, block: Block) -> bool {
        let mut state = self.state();

        if let Err(err) = Self::check_successor(state.last_block(), &block) {
            warn!("Rejected foreign block {}: {}", block.index, err);
            return false;
        }
        if let Err(err) = self.persist_block(&block) {
            error!("Could not store foreign block {}: {}", block.index, err);
            return false;
        }

        state.balances.apply_block(&block);
        info!("Accepted foreign block {}", block.index);
        state.chain.push(block);
        true
    }

    /// Longest-valid-chain rule
    ///
    /// Adopts the longest candidate that is strictly longer than the local
    /// chain, shares its genesis block and validates. Ties go to the
    /// candidate whose last block hash sorts first.
    ///
    /// # Returns
    ///
    /// true if the local chain was replaced
    pub fn resolve_conflicts(&self, candidates: Vec<Vec<Block>>) -> bool {
        let current_length = self.chain_length();
        let genesis = Block::genesis();

        // Validation is pure hashing, keep it outside the lock
        let best = candidates
            .into_iter()
            .filter(|candidate| candidate.len() > current_length)
            .filter(|candidate| candidate.first() == Some(&genesis))
            .filter(|candidate| Self::is_chain_valid(candidate))
            .map(|candidate| {
                let tip_hash = candidate.last().map(Block::hash).unwrap_or_default();
                (candidate, tip_hash)
            })
            .max_by_key(|(candidate, tip_hash)| (candidate.len(), Reverse(tip_hash.clone())));

        let Some((chain, _)) = best else {
            return false;
        };

        let mut state = self.state();
        // Our own chain may have grown while we were validating
        if chain.len() <= state.chain.len() {
            return false;
        }

        if let Some(storage) = &self.storage {
            if let Err(err) = storage.replace_chain(&chain) {
                error!("Could not store replacement chain: {}", err);
                return false;
            }
        }

        info!(
            "Replaced chain of length {} with one of length {}",
            state.chain.len(),
            chain.len()
        );
        state.balances = BalanceTable::replay(&chain);
        state.chain = chain;
        true
    }

    /// Committed balance of `address`
    pub fn balance_of(&self, address: &Address) -> i64 {
        self.state().balances.balance_of(address)
    }

    /// Net effect of the pending pool on `address`
    pub fn pending_net_for(&self, address: &Address) -> i64 {
        pending_net_for(&self.state().pending, address)
    }

    /// Committed balance plus the pending pool's net effect
    pub fn spendable_balance(&self, address: &Address) -> i64 {
        let state = self.state();
        state
            .balances
            .balance_of(address)
            .saturating_add(pending_net_for(&state.pending, address))
    }

    /// Snapshot of the incrementally maintained balance table
    pub fn balances(&self) -> BalanceTable {
        self.state().balances.clone()
    }

    pub fn accounts(&self) -> Vec<AccountBalance> {
        self.state().balances.accounts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;
    use crate::blockchain::proof::solve;

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    fn mine_next(blockchain: &Blockchain, miner: &Address) -> Block {
        let (last_proof, last_hash) = blockchain.tip();
        let proof = solve(last_proof, &last_hash);
        blockchain.mine_block(proof, &last_hash, miner).unwrap()
    }

    fn invalid_proof(last: &Block) -> u64 {
        let last_hash = last.hash();
        (0..).find(|p| !valid_proof(last.proof, *p, &last_hash)).unwrap()
    }

    fn assert_balances_replay(blockchain: &Blockchain) {
        assert_eq!(BalanceTable::replay(&blockchain.chain()), blockchain.balances());
    }

    #[test]
    fn test_new_blockchain() {
        let blockchain = Blockchain::new();
        let chain = blockchain.chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 1);
        assert_eq!(chain[0].previous_hash, "1");
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_submit_returns_next_index() {
        let blockchain = Blockchain::new();
        let index = blockchain
            .submit_transaction(Transaction::new(addr("a"), addr("b"), 1), None)
            .unwrap();

        assert_eq!(index, 2);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_seal_first_block() {
        let blockchain = Blockchain::new();
        blockchain
            .submit_transaction(Transaction::new(addr("0"), addr("A"), 10), None)
            .unwrap();

        let genesis = blockchain.last_block();
        let proof = solve(genesis.proof, &genesis.hash());
        let block = blockchain.seal_block(proof, &genesis.hash()).unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(blockchain.chain_length(), 2);
        assert_eq!(blockchain.balance_of(&addr("A")), 10);
        assert_eq!(blockchain.balance_of(&addr("0")), -10);
        assert!(blockchain.pending_transactions().is_empty());
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_mine_block_pays_reward_last() {
        let blockchain = Blockchain::new();
        blockchain
            .submit_transaction(Transaction::new(addr("0"), addr("alice"), 5), None)
            .unwrap();

        let block = mine_next(&blockchain, &addr("miner"));

        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1], Transaction::new_coinbase(addr("miner"), MINING_REWARD));
        assert_eq!(blockchain.balance_of(&addr("miner")), 1);
    }

    #[test]
    fn test_seal_rejects_stale_previous_hash() {
        let blockchain = Blockchain::new();
        let (last_proof, stale_hash) = blockchain.tip();
        let stale_proof = solve(last_proof, &stale_hash);

        mine_next(&blockchain, &addr("miner"));
        blockchain
            .submit_transaction(Transaction::new(addr("a"), addr("b"), 1), None)
            .unwrap();

        let result = blockchain.seal_block(stale_proof, &stale_hash);
        assert!(matches!(result, Err(BlockchainError::StaleProof { .. })));
        assert_eq!(blockchain.chain_length(), 2);
        assert_eq!(blockchain.pending_transactions().len(), 1);
    }

    #[test]
    fn test_seal_rejects_invalid_proof() {
        let blockchain = Blockchain::new();
        let last = blockchain.last_block();

        let result = blockchain.seal_block(invalid_proof(&last), &last.hash());
        assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
        assert_eq!(blockchain.chain_length(), 1);
    }

    #[test]
    fn test_sealed_chain_links() {
        let blockchain = Blockchain::new();
        for _ in 0..3 {
            mine_next(&blockchain, &addr("miner"));
        }

        let chain = blockchain.chain();
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash());
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
        assert!(Blockchain::is_chain_valid(&chain));
        assert_balances_replay(&blockchain);
    }

    #[test]
    fn test_tampered_chain_is_invalid() {
        let blockchain = Blockchain::new();
        mine_next(&blockchain, &addr("miner"));
        mine_next(&blockchain, &addr("miner"));

        let mut chain = blockchain.chain();
        chain[1].transactions[0].amount = 1_000;
        assert!(!Blockchain::is_chain_valid(&chain));

        assert!(!Blockchain::is_chain_valid(&[]));
        assert!(blockchain.is_valid());
    }

    #[test]
    fn test_append_foreign_block() {
        let local = Blockchain::new();
        let remote = Blockchain::new();
        remote
            .submit_transaction(Transaction::new(addr("0"), addr("alice"), 3), None)
            .unwrap();
        let block = mine_next(&remote, &addr("remote-miner"));

        assert!(local.append_foreign_block(block));
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.balance_of(&addr("alice")), 3);
        assert_balances_replay(&local);
    }

    #[test]
    fn test_append_foreign_block_rejections() {
        let local = Blockchain::new();
        let remote = Blockchain::new();
        remote
            .submit_transaction(Transaction::new(addr("0"), addr("alice"), 3), None)
            .unwrap();
        let block = mine_next(&remote, &addr("remote-miner"));

        let wrong_index = Block {
            index: block.index + 1,
            ..block.clone()
        };
        let wrong_link = Block {
            previous_hash: "f".repeat(64),
            ..block.clone()
        };
        let wrong_proof = Block {
            proof: invalid_proof(&Block::genesis()),
            ..block.clone()
        };

        for rejected in [wrong_index, wrong_link, wrong_proof] {
            assert!(!local.append_foreign_block(rejected));
            assert_eq!(local.chain_length(), 1);
            assert_eq!(local.balances(), BalanceTable::new());
        }

        // The untouched block still goes in afterwards
        assert!(local.append_foreign_block(block));
    }

    #[test]
    fn test_resolve_conflicts_adopts_longer_chain() {
        let local = Blockchain::new();
        local
            .submit_transaction(Transaction::new(addr("a"), addr("b"), 1), None)
            .unwrap();
        let remote = Blockchain::new();
        remote
            .submit_transaction(Transaction::new(addr("0"), addr("carol"), 9), None)
            .unwrap();
        mine_next(&remote, &addr("remote-miner"));
        mine_next(&remote, &addr("remote-miner"));

        assert!(local.resolve_conflicts(vec![remote.chain()]));
        assert_eq!(local.chain_length(), 3);
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.balance_of(&addr("carol")), 9);
        assert_eq!(local.pending_transactions().len(), 1);
        assert_balances_replay(&local);
    }

    #[test]
    fn test_resolve_conflicts_rejects_invalid_chain() {
        let local = Blockchain::new();
        let remote = Blockchain::new();
        mine_next(&remote, &addr("remote-miner"));
        mine_next(&remote, &addr("remote-miner"));

        let mut tampered = remote.chain();
        tampered[2].transactions[0].recipient = addr("thief");

        assert!(!local.resolve_conflicts(vec![tampered]));
        assert_eq!(local.chain_length(), 1);
    }

    #[test]
    fn test_resolve_conflicts_ignores_shorter_and_equal() {
        let local = Blockchain::new();
        mine_next(&local, &addr("local-miner"));
        let before = local.chain();

        let remote = Blockchain::new();
        mine_next(&remote, &addr("remote-miner"));

        assert!(!local.resolve_conflicts(vec![remote.chain(), vec![Block::genesis()], Vec::new()]));
        assert_eq!(local.chain(), before);
    }

    #[test]
    fn test_resolve_conflicts_rejects_foreign_genesis() {
        let local = Blockchain::new();

        let mut genesis = Block::genesis();
        genesis.proof = 7;
        let mut chain = vec![genesis];
        for _ in 0..2 {
            let last = chain[chain.len() - 1].clone();
            let proof = solve(last.proof, &last.hash());
            chain.push(Block::new(last.index + 1, proof, last.hash(), Vec::new(), None).unwrap());
        }
        assert!(Blockchain::is_chain_valid(&chain));

        assert!(!local.resolve_conflicts(vec![chain]));
        assert_eq!(local.chain(), vec![Block::genesis()]);
    }

    #[test]
    fn test_resolve_conflicts_tie_break_is_order_independent() {
        let first = Blockchain::new();
        let second = Blockchain::new();
        for blockchain in [&first, &second] {
            mine_next(blockchain, &Wallet::generate().address().clone());
            mine_next(blockchain, &Wallet::generate().address().clone());
        }

        let (a, b) = (first.chain(), second.chain());
        let expected = if a[2].hash() < b[2].hash() { a.clone() } else { b.clone() };

        let forward = Blockchain::new();
        assert!(forward.resolve_conflicts(vec![a.clone(), b.clone()]));
        let backward = Blockchain::new();
        assert!(backward.resolve_conflicts(vec![b, a]));

        assert_eq!(forward.chain(), expected);
        assert_eq!(backward.chain(), expected);
    }

    #[test]
    fn test_resolve_conflicts_prefers_longest() {
        let local = Blockchain::new();
        let short = Blockchain::new();
        mine_next(&short, &addr("s"));
        mine_next(&short, &addr("s"));
        let long = Blockchain::new();
        for _ in 0..3 {
            mine_next(&long, &addr("l"));
        }

        assert!(local.resolve_conflicts(vec![short.chain(), long.chain()]));
        assert_eq!(local.chain_length(), 4);
    }

    #[test]
    fn test_validate_on_submit_policy() {
        let blockchain = Blockchain::new().with_submit_policy(SubmitPolicy::ValidateOnSubmit);
        let sender = Wallet::generate();
        let recipient = addr("recipient");

        // Fund the sender through a committed coinbase reward
        mine_next(&blockchain, sender.address());
        assert_eq!(blockchain.balance_of(sender.address()), 1);

        let transaction = Transaction::new(sender.address().clone(), recipient.clone(), 1);
        let signature = transaction.sign(&sender).unwrap();

        assert!(matches!(
            blockchain.submit_transaction(transaction.clone(), None),
            Err(BlockchainError::TransactionError(TransactionError::InvalidSignature))
        ));

        let forged = transaction.sign(&Wallet::generate()).unwrap();
        assert!(blockchain
            .submit_transaction(transaction.clone(), Some(&forged))
            .is_err());

        assert_eq!(blockchain.submit_transaction(transaction.clone(), Some(&signature)).unwrap(), 3);

        // The pooled spend already uses up the balance
        assert!(matches!(
            blockchain.submit_transaction(transaction, Some(&signature)),
            Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds { .. }))
        ));
        assert_eq!(blockchain.spendable_balance(sender.address()), 0);
    }

    #[test]
    fn test_submit_checked_ignores_policy() {
        let blockchain = Blockchain::new();
        assert_eq!(blockchain.submit_policy(), SubmitPolicy::TrustCaller);
        let sender = Wallet::generate();

        let transaction = Transaction::new(sender.address().clone(), addr("recipient"), 1);
        let signature = transaction.sign(&sender).unwrap();
        assert!(matches!(
            blockchain.submit_checked(transaction.clone(), &signature),
            Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds { .. }))
        ));

        mine_next(&blockchain, sender.address());
        let forged = transaction.sign(&Wallet::generate()).unwrap();
        assert!(matches!(
            blockchain.submit_checked(transaction.clone(), &forged),
            Err(BlockchainError::TransactionError(TransactionError::InvalidSignature))
        ));
        assert_eq!(blockchain.submit_checked(transaction, &signature).unwrap(), 3);
    }

    #[test]
    fn test_racing_checked_submissions_cannot_overspend() {
        let blockchain = Blockchain::new();
        let sender = Wallet::generate();
        mine_next(&blockchain, sender.address());
        assert_eq!(blockchain.balance_of(sender.address()), 1);

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let spenders: Vec<_> = ["bob", "carol"]
            .into_iter()
            .map(|recipient| {
                let blockchain = blockchain.clone();
                let barrier = barrier.clone();
                let transaction = Transaction::new(sender.address().clone(), addr(recipient), 1);
                let signature = transaction.sign(&sender).unwrap();
                std::thread::spawn(move || {
                    barrier.wait();
                    blockchain.submit_checked(transaction, &signature).is_ok()
                })
            })
            .collect();

        let accepted = spenders
            .into_iter()
            .map(|spender| spender.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(blockchain.pending_transactions().len(), 1);
        assert_eq!(blockchain.spendable_balance(sender.address()), 0);
    }

    #[test]
    fn test_chain_ending_at_max_index_is_invalid() {
        let mut last = Block::genesis();
        last.index = u64::MAX;
        let next = Block::new(1, 0, last.hash(), Vec::new(), None).unwrap();

        assert!(!Blockchain::is_chain_valid(&[last, next]));
    }

    #[test]
    fn test_validate_on_submit_rejects_mint_sender() {
        let blockchain = Blockchain::new().with_submit_policy(SubmitPolicy::ValidateOnSubmit);
        let wallet = Wallet::generate();
        let transaction = Transaction::new_coinbase(wallet.address().clone(), 100);
        let signature = transaction.sign(&wallet).unwrap();

        assert!(blockchain.submit_transaction(transaction, Some(&signature)).is_err());
        assert!(blockchain.pending_transactions().is_empty());
    }

    #[test]
    fn test_pending_net_and_spendable() {
        let blockchain = Blockchain::new();
        blockchain
            .submit_transaction(Transaction::new(addr("0"), addr("alice"), 10), None)
            .unwrap();
        mine_next(&blockchain, &addr("miner"));
        blockchain
            .submit_transaction(Transaction::new(addr("alice"), addr("bob"), 4), None)
            .unwrap();

        assert_eq!(blockchain.balance_of(&addr("alice")), 10);
        assert_eq!(blockchain.pending_net_for(&addr("alice")), -4);
        assert_eq!(blockchain.spendable_balance(&addr("alice")), 6);
        assert_eq!(blockchain.pending_net_for(&addr("bob")), 4);
    }

    #[test]
    fn test_concurrent_submissions_and_seals() {
        let blockchain = Blockchain::new();

        let submitters: Vec<_> = (0..4)
            .map(|n| {
                let blockchain = blockchain.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let transaction = Transaction::new(
                            Address(format!("sender-{}", n)),
                            Address(format!("recipient-{}", i)),
                            1,
                        );
                        blockchain.submit_transaction(transaction, None).unwrap();
                    }
                })
            })
            .collect();

        mine_next(&blockchain, &addr("miner"));
        mine_next(&blockchain, &addr("miner"));
        for submitter in submitters {
            submitter.join().unwrap();
        }

        let committed: usize = blockchain
            .chain()
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|transaction| !transaction.is_coinbase())
            .count();
        assert_eq!(committed + blockchain.pending_transactions().len(), 200);
        assert!(blockchain.is_valid());
        assert_balances_replay(&blockchain);
    }

    #[test]
    fn test_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let blockchain = Blockchain::with_storage(dir.path()).unwrap();
            assert_eq!(blockchain.chain_length(), 1);
            blockchain
                .submit_transaction(Transaction::new(addr("0"), addr("alice"), 2), None)
                .unwrap();
            mine_next(&blockchain, &addr("miner"));
        }

        let reopened = Blockchain::with_storage(dir.path()).unwrap();
        assert_eq!(reopened.chain_length(), 2);
        assert_eq!(reopened.balance_of(&addr("alice")), 2);
        assert!(reopened.is_valid());
    }

    #[test]
    fn test_storage_follows_chain_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Blockchain::new();
        mine_next(&remote, &addr("remote"));
        mine_next(&remote, &addr("remote"));
        {
            let blockchain = Blockchain::with_storage(dir.path()).unwrap();
            assert!(blockchain.resolve_conflicts(vec![remote.chain()]));
        }

        let reopened = Blockchain::with_storage(dir.path()).unwrap();
        assert_eq!(reopened.chain(), remote.chain());
    }
}
