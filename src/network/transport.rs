use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::peers::PeerError;
use crate::blockchain::Block;

/// Path peers serve their full chain on
pub const CHAIN_PATH: &str = "/chain";

/// Full chain as served by `GET /chain`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainSnapshot {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        ChainSnapshot { chain, length }
    }
}

/// Performs the actual requests to other nodes
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// POSTs `payload` as JSON to `path` on `peer` and returns the decoded body
    async fn post(&self, peer: &str, path: &str, payload: &Value) -> Result<Value, PeerError>;

    /// Fetches the peer's full chain
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError>;
}

/// [`PeerTransport`] over plain HTTP with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }

    fn url(peer: &str, path: &str) -> String {
        format!("http://{}{}", peer, path)
    }
}

fn unreachable(peer: &str, err: reqwest::Error) -> PeerError {
    PeerError::Unreachable {
        peer: peer.to_string(),
        reason: err.to_string(),
    }
}

fn invalid(peer: &str, err: reqwest::Error) -> PeerError {
    PeerError::InvalidResponse {
        peer: peer.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn post(&self, peer: &str, path: &str, payload: &Value) -> Result<Value, PeerError> {
        let response = self
            .client
            .post(Self::url(peer, path))
            .json(payload)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        response
            .error_for_status()
            .map_err(|e| invalid(peer, e))?
            .json::<Value>()
            .await
            .map_err(|e| invalid(peer, e))
    }

    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        let response = self
            .client
            .get(Self::url(peer, CHAIN_PATH))
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        response
            .error_for_status()
            .map_err(|e| invalid(peer, e))?
            .json::<ChainSnapshot>()
            .await
            .map_err(|e| invalid(peer, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_snapshot_length() {
        let snapshot = ChainSnapshot::new(vec![Block::genesis()]);
        assert_eq!(snapshot.length, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["length"], 1);
        assert_eq!(json["chain"][0]["previous_hash"], "1");
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();

        // Port 9 on localhost is the discard service, practically never listening
        let result = transport.fetch_chain("127.0.0.1:9").await;
        assert!(matches!(result, Err(PeerError::Unreachable { .. })));
    }
}
