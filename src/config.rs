use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::blockchain::SubmitPolicy;

/// Command line of the node binary. Every flag can also come from the
/// environment.
#[derive(Debug, Parser)]
#[command(version, about = "Proof-of-work ledger node")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LEDGER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "LEDGER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Wallet key file name, without the .json extension
    #[arg(short, long, env = "LEDGER_WALLET", default_value = "wallet")]
    pub wallet: String,

    /// Directory of the block database; the ledger is kept in memory without it
    #[arg(long, env = "LEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Checks the ledger applies to submitted transactions
    #[arg(long, value_enum, env = "LEDGER_SUBMIT_POLICY", default_value_t = SubmitPolicy::TrustCaller)]
    pub submit_policy: SubmitPolicy,

    /// Seconds between chain-length announcements to peers
    #[arg(long, env = "LEDGER_SYNC_INTERVAL", default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
    pub sync_interval_secs: u64,

    /// Seconds before an unanswered peer request counts as unreachable
    #[arg(long, env = "LEDGER_PEER_TIMEOUT", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub peer_timeout_secs: u64,

    /// Seconds a proof search may run before it is abandoned
    #[arg(long, env = "LEDGER_MINING_TIMEOUT", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub mining_timeout_secs: u64,

    /// Peers to register at startup (repeatable or comma separated)
    #[arg(long = "peer", env = "LEDGER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,
}

/// Resolved node settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub wallet_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub submit_policy: SubmitPolicy,
    pub sync_interval: Duration,
    pub peer_timeout: Duration,
    pub mining_timeout: Duration,
    pub bootstrap_peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            wallet_path: PathBuf::from("wallet.json"),
            data_dir: None,
            submit_policy: SubmitPolicy::TrustCaller,
            sync_interval: Duration::from_secs(20),
            peer_timeout: Duration::from_secs(5),
            mining_timeout: Duration::from_secs(300),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        NodeConfig {
            host: args.host,
            port: args.port,
            wallet_path: PathBuf::from(format!("{}.json", args.wallet)),
            data_dir: args.data_dir,
            submit_policy: args.submit_policy,
            sync_interval: Duration::from_secs(args.sync_interval_secs),
            peer_timeout: Duration::from_secs(args.peer_timeout_secs),
            mining_timeout: Duration::from_secs(args.mining_timeout_secs),
            bootstrap_peers: args.peers,
        }
    }
}
