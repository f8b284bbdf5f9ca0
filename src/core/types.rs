use serde::Serialize;
use std::fmt;

use super::params::{GENESIS_DATA, GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
use crate::crypto::{block_digest, short_hash};
use crate::storage::{StoredBlock, Timestamp};

// ─── Block ──────────────────────────────────────────────────────────

/// One sealed record of the chain.
///
/// All fields are fixed at construction. `hash` is computed once in
/// [`Block::new`]; blocks rebuilt from storage keep the stored hash as-is,
/// so a tampered store only shows up through validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    index: u64,
    timestamp: Timestamp,
    data: String,
    previous_hash: String,
    hash: String,
}

impl Block {
    /// Seal a new block, computing its digest from the four content fields.
    pub(crate) fn new(index: u64, timestamp: Timestamp, data: String, previous_hash: String) -> Self {
        let hash = block_digest(index, &timestamp.to_string(), &data, &previous_hash);
        Block { index, timestamp, data, previous_hash, hash }
    }

    /// The genesis block: index 0, fixed payload, sentinel previous hash.
    pub(crate) fn genesis(timestamp: Timestamp) -> Self {
        Self::new(
            GENESIS_INDEX,
            timestamp,
            GENESIS_DATA.to_string(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Rebuild a block from a persisted record, trusting the stored hash.
    pub(crate) fn from_stored(record: StoredBlock) -> Self {
        Block {
            index: record.index,
            timestamp: record.timestamp,
            data: record.data,
            previous_hash: record.previous_hash,
            hash: record.hash,
        }
    }

    pub fn index(&self) -> u64 { self.index }
    pub fn timestamp(&self) -> &Timestamp { &self.timestamp }
    pub fn data(&self) -> &str { &self.data }
    pub fn previous_hash(&self) -> &str { &self.previous_hash }
    pub fn hash(&self) -> &str { &self.hash }

    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Digest recomputed from the current field values. Never written back.
    pub fn recompute_hash(&self) -> String {
        block_digest(self.index, &self.timestamp.to_string(), &self.data, &self.previous_hash)
    }
}

impl From<&Block> for StoredBlock {
    fn from(block: &Block) -> Self {
        StoredBlock {
            index: block.index,
            timestamp: block.timestamp.clone(),
            data: block.data.clone(),
            previous_hash: block.previous_hash.clone(),
            hash: block.hash.clone(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block #{} [{}] {:?}", self.index, short_hash(&self.hash), self.data)
    }
}
