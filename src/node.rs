use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{proof, Block, Blockchain, BlockchainError, Wallet};
use crate::network::{PeerRegistry, PeerTransport, Synchronizer};

/// Errors that can occur while the node mines
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Proof search gave up after {0:?}")]
    MiningTimedOut(Duration),

    #[error("Proof search was cancelled")]
    MiningCancelled,

    #[error("Proof search worker failed: {0}")]
    MiningAborted(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] BlockchainError),
}

/// One running node: its ledger, its identity and its view of the network.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Node {
    ledger: Blockchain,
    peers: PeerRegistry,
    wallet: Arc<Wallet>,
    sync: Synchronizer,
    mining_timeout: Duration,
}

impl Node {
    pub fn new(
        ledger: Blockchain,
        wallet: Wallet,
        transport: Arc<dyn PeerTransport>,
        mining_timeout: Duration,
    ) -> Self {
        let peers = PeerRegistry::new();
        let sync = Synchronizer::new(
            ledger.clone(),
            peers.clone(),
            transport,
            wallet.address().clone(),
        );

        Node {
            ledger,
            peers,
            wallet: Arc::new(wallet),
            sync,
            mining_timeout,
        }
    }

    pub fn ledger(&self) -> &Blockchain {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    /// Searches a proof for the current tip on a blocking worker, then seals
    /// the pending pool plus this node's reward and pushes the block to peers.
    ///
    /// Fails with [`BlockchainError::StaleProof`] if another block landed on
    /// the tip while the search ran.
    pub async fn mine(&self) -> Result<Block, NodeError> {
        let (last_proof, last_hash) = self.ledger.tip();

        let cancel = CancellationToken::new();
        // Stops the search if this future is dropped or times out
        let _stop_search = cancel.clone().drop_guard();

        let search = {
            let last_hash = last_hash.clone();
            tokio::task::spawn_blocking(move || proof::solve_until(last_proof, &last_hash, &cancel))
        };

        let proof = match tokio::time::timeout(self.mining_timeout, search).await {
            Ok(Ok(Some(proof))) => proof,
            Ok(Ok(None)) => return Err(NodeError::MiningCancelled),
            Ok(Err(err)) => return Err(NodeError::MiningAborted(err.to_string())),
            Err(_) => return Err(NodeError::MiningTimedOut(self.mining_timeout)),
        };
        debug!("Found proof {} for tip {}", proof, last_hash);

        let block = self
            .ledger
            .mine_block(proof, &last_hash, self.wallet.address())?;

        let sync = self.sync.clone();
        let pushed = block.clone();
        tokio::spawn(async move {
            let report = sync.push_block(&pushed).await;
            info!("Pushed block {} to {} peers", pushed.index, report.delivered);
        });

        Ok(block)
    }

    /// Starts the periodic chain-length announcement
    pub fn spawn_sync_worker(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        self.sync.spawn_worker(interval, cancel)
    }
}
