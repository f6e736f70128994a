use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Net balance of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountBalance {
    pub address: Address,
    pub balance: i64,
}

/// Balances derived from committed blocks. Never authoritative: it can
/// always be rebuilt by replaying the chain from genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceTable {
    balances: HashMap<Address, i64>,
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

impl BalanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from scratch by replaying every block in order
    pub fn replay<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut table = Self::new();
        for block in blocks {
            table.apply_block(block);
        }
        table
    }

    pub fn apply_block(&mut self, block: &Block) {
        for transaction in &block.transactions {
            self.apply_transaction(transaction);
        }
    }

    pub fn apply_transaction(&mut self, transaction: &Transaction) {
        let amount = signed(transaction.amount);

        let recipient = self.balances.entry(transaction.recipient.clone()).or_insert(0);
        *recipient = recipient.saturating_add(amount);

        let sender = self.balances.entry(transaction.sender.clone()).or_insert(0);
        *sender = sender.saturating_sub(amount);
    }

    /// Balance of `address`, zero if it never appeared in a committed block
    pub fn balance_of(&self, address: &Address) -> i64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// All known balances, sorted by address
    pub fn accounts(&self) -> Vec<AccountBalance> {
        let mut accounts: Vec<AccountBalance> = self
            .balances
            .iter()
            .map(|(address, balance)| AccountBalance {
                address: address.clone(),
                balance: *balance,
            })
            .collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));
        accounts
    }
}

/// Net effect of not-yet-committed `transactions` on `address`
pub fn pending_net_for(transactions: &[Transaction], address: &Address) -> i64 {
    transactions.iter().fold(0i64, |net, transaction| {
        let mut net = net;
        if &transaction.recipient == address {
            net = net.saturating_add(signed(transaction.amount));
        }
        if &transaction.sender == address {
            net = net.saturating_sub(signed(transaction.amount));
        }
        net
    })
}
