use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::peers::{PeerError, PeerRegistry};
use super::transport::PeerTransport;
use crate::blockchain::{Address, Block, Blockchain};

/// Path the chain-length announcement is posted to
pub const PING_PATH: &str = "/ping";

/// Path freshly sealed blocks are pushed to
pub const RECEIVE_BLOCK_PATH: &str = "/blocks/receive";

/// Body of a chain-length announcement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PingRequest {
    pub chainlength: usize,
}

/// Reply to a chain-length announcement: who we are, and the blocks the
/// announcing peer is missing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PingResponse {
    pub node: String,
    pub blocks: Vec<Block>,
}

/// Builds the reply to a peer that announced `chain_length`
pub fn ping_response(ledger: &Blockchain, identity: &Address, chain_length: usize) -> PingResponse {
    PingResponse {
        node: identity.0.clone(),
        blocks: ledger.blocks_after(chain_length),
    }
}

/// Outcome of one broadcast round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers that answered
    pub delivered: usize,
    /// Peers dropped from the registry because they failed
    pub evicted: Vec<String>,
    /// Foreign blocks appended from the answers
    pub accepted_blocks: usize,
}

/// Pushes and pulls chain state between this node and its peers
#[derive(Clone)]
pub struct Synchronizer {
    ledger: Blockchain,
    peers: PeerRegistry,
    transport: Arc<dyn PeerTransport>,
    identity: Address,
}

impl Synchronizer {
    pub fn new(
        ledger: Blockchain,
        peers: PeerRegistry,
        transport: Arc<dyn PeerTransport>,
        identity: Address,
    ) -> Self {
        Synchronizer {
            ledger,
            peers,
            transport,
            identity,
        }
    }

    /// Known peers except this node itself
    fn targets(&self) -> Vec<String> {
        self.peers
            .peers()
            .into_iter()
            .filter(|peer| {
                let is_self = peer.name == self.identity.0;
                if is_self {
                    debug!("Skipping myself at {}", peer.address);
                }
                !is_self
            })
            .map(|peer| peer.address)
            .collect()
    }

    /// Posts `payload` to `path` on every peer concurrently. Failing peers
    /// are evicted; answers may name the peer and carry blocks to append.
    pub async fn broadcast(&self, path: &str, payload: &Value) -> BroadcastReport {
        let targets = self.targets();
        let requests = targets.iter().map(|peer| async move {
            debug!("Broadcasting to http://{}{}", peer, path);
            (peer, self.transport.post(peer, path, payload).await)
        });

        let mut report = BroadcastReport::default();
        for (peer, result) in join_all(requests).await {
            match result.and_then(|answer| self.absorb_answer(peer, answer)) {
                Ok(accepted) => {
                    report.delivered += 1;
                    report.accepted_blocks += accepted;
                }
                Err(err) => {
                    warn!("Broadcast to {} failed: {}", peer, err);
                    self.peers.evict(peer);
                    report.evicted.push(peer.clone());
                }
            }
        }

        report
    }

    fn absorb_answer(&self, peer: &str, answer: Value) -> Result<usize, PeerError> {
        if let Some(name) = answer.get("node").and_then(Value::as_str) {
            self.peers.set_name(peer, name);
        }

        let Some(blocks) = answer.get("blocks") else {
            return Ok(0);
        };
        let blocks: Vec<Block> =
            serde_json::from_value(blocks.clone()).map_err(|e| PeerError::InvalidResponse {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        let accepted = blocks
            .into_iter()
            .filter(|block| self.ledger.append_foreign_block(block.clone()))
            .count();
        Ok(accepted)
    }

    /// Tells every peer our chain length and takes whatever blocks they
    /// answer with
    pub async fn announce_chain_length(&self) -> BroadcastReport {
        let payload = serde_json::json!({ "chainlength": self.ledger.chain_length() });
        self.broadcast(PING_PATH, &payload).await
    }

    /// Pushes one block to every peer
    pub async fn push_block(&self, block: &Block) -> BroadcastReport {
        match serde_json::to_value(block) {
            Ok(payload) => self.broadcast(RECEIVE_BLOCK_PATH, &payload).await,
            Err(err) => {
                error!("Could not encode block {}: {}", block.index, err);
                BroadcastReport::default()
            }
        }
    }

    /// Fetches every peer's chain concurrently; unreachable peers are evicted
    pub async fn fetch_chains(&self) -> Vec<Vec<Block>> {
        let targets = self.targets();
        let requests = targets.iter().map(|peer| async move {
            (peer, self.transport.fetch_chain(peer).await)
        });

        let mut chains = Vec::new();
        for (peer, result) in join_all(requests).await {
            match result {
                Ok(snapshot) => chains.push(snapshot.chain),
                Err(err) => {
                    warn!("Could not fetch chain from {}: {}", peer, err);
                    self.peers.evict(peer);
                }
            }
        }
        chains
    }

    /// Applies the longest-valid-chain rule against every peer's chain
    pub async fn resolve_conflicts(&self) -> bool {
        let chains = self.fetch_chains().await;
        self.ledger.resolve_conflicts(chains)
    }

    /// Announces the chain length every `interval` until `cancel` fires
    pub fn spawn_worker(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!("Sync worker started, interval {:?}", interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = sync.announce_chain_length().await;
                        debug!("Sync round: {:?}", report);
                    }
                }
            }
            info!("Sync worker stopped");
        })
    }
}
