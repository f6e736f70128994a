// Network module
//
// Peer reconciliation between nodes:
// - Peer address normalisation and the known-peer registry
// - The transport used to reach peers (HTTP in production)
// - Broadcast, chain fetching and the periodic sync worker

pub mod peers;
pub mod sync;
pub mod transport;

// Re-export main components for easier access
pub use peers::{normalize_address, PeerError, PeerInfo, PeerRegistry};
pub use sync::{BroadcastReport, PingRequest, PingResponse, Synchronizer};
pub use transport::{ChainSnapshot, HttpTransport, PeerTransport};
