use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Name stored for a peer until it tells us who it is
pub const UNKNOWN_PEER: &str = "unknown";

/// Errors that can occur while talking to peers
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("Invalid response from {peer}: {reason}")]
    InvalidResponse { peer: String, reason: String },

    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),
}

/// Normalises `http://host:port/...`, `host:port` and similar forms into
/// the `host:port` key peers are stored under
pub fn normalize_address(address: &str) -> Result<String, PeerError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(PeerError::InvalidAddress("empty address".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| PeerError::InvalidAddress(format!("{}: {}", address, e)))?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| PeerError::InvalidAddress(format!("{}: no host", address)))?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// A known peer and the node identity it last reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeerInfo {
    pub address: String,
    pub name: String,
}

/// The set of known peers, shared between request handlers and the
/// background sync worker
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<String, String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. Registering an already known peer keeps its name.
    ///
    /// # Returns
    ///
    /// The normalised `host:port` key
    pub fn register(&self, address: &str) -> Result<String, PeerError> {
        let key = normalize_address(address)?;
        if !self.peers.contains_key(&key) {
            info!("Registered peer {}", key);
        }
        self.peers.entry(key.clone()).or_insert_with(|| UNKNOWN_PEER.to_string());
        Ok(key)
    }

    /// Records the identity a peer reported about itself
    pub fn set_name(&self, key: &str, name: &str) {
        if let Some(mut entry) = self.peers.get_mut(key) {
            *entry = name.to_string();
        }
    }

    pub fn name_of(&self, key: &str) -> Option<String> {
        self.peers.get(key).map(|entry| entry.value().clone())
    }

    /// Drops a peer
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.peers.remove(key).is_some();
        if removed {
            info!("Evicted peer {}", key);
        }
        removed
    }

    /// All peers, sorted by address
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .peers
            .iter()
            .map(|entry| PeerInfo {
                address: entry.key().clone(),
                name: entry.value().clone(),
            })
            .collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    pub fn addresses(&self) -> Vec<String> {
        self.peers().into_iter().map(|peer| peer.address).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
