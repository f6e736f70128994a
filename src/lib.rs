//! A minimal proof-of-work ledger node.
//!
//! Signed transfers are pooled, sealed into hash-linked blocks by a
//! proof-of-work search, and reconciled between peers by adopting the
//! longest valid chain.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod network;
pub mod node;
