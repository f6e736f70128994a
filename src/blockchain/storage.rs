use std::path::Path;

use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Persistent copy of the committed chain, one entry per block keyed by
/// big-endian index so iteration order is chain order
pub struct BlockchainStorage {
    db: Db,
    blocks: Tree,
}

impl std::fmt::Debug for BlockchainStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainStorage")
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl BlockchainStorage {
    /// Opens (or creates) the database directory at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;

        Ok(Self { db, blocks })
    }

    /// Saves a block to the database
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.blocks.insert(block.index.to_be_bytes(), value)?;
        Ok(())
    }

    /// Gets all stored blocks in index order
    pub fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        for result in self.blocks.iter() {
            let (_, value) = result?;
            let block: Block = bincode::deserialize(&value)
                .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
            blocks.push(block);
        }

        Ok(blocks)
    }

    /// Replaces the whole stored chain with `chain` in one atomic batch
    pub fn replace_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        // Inserts below override these removals for indices the new chain reuses
        for key in self.blocks.iter().keys() {
            batch.remove(key?);
        }
        for block in chain {
            let value = bincode::serialize(block)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.insert(block.index.to_be_bytes().to_vec(), value);
        }

        self.blocks.apply_batch(batch)?;
        self.flush()
    }

    /// Number of stored blocks
    pub fn block_height(&self) -> usize {
        self.blocks.len()
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
