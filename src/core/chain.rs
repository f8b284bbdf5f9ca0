use std::fmt;

use crate::core::params::now_timestamp;
use crate::core::types::*;
use crate::crypto::{block_digest, short_hash};
use crate::storage::{BlockStore, StorageError, StoredBlock};

// ─── Chain ──────────────────────────────────────────────────────────

/// The ordered block sequence and the store it is mirrored to.
///
/// Never empty: `open` either loads a persisted chain or synthesizes the
/// genesis block. Every mutation is written to the store before it becomes
/// visible in memory, so a failed write leaves both sides unchanged.
pub struct Chain<S: BlockStore> {
    blocks: Vec<Block>,
    store: S,
}

impl<S: BlockStore> fmt::Debug for Chain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.blocks.len())
            .field("tip", &self.latest_block().hash())
            .field("store", &self.store.location())
            .finish()
    }
}

impl<S: BlockStore> Chain<S> {
    /// Open a chain backed by `store`.
    ///
    /// A persisted chain is loaded with its stored hashes taken verbatim; a
    /// tampered store still opens and only `validate` reports it. An absent or
    /// empty store, whichever way the backend reports it, gets a fresh genesis
    /// block, persisted before returning.
    pub fn open(store: S) -> Result<Self, ChainError> {
        match store.load().map_err(ChainError::StoreUnreadable)? {
            Some(records) if !records.is_empty() => {
                let blocks: Vec<Block> = records.into_iter().map(Block::from_stored).collect();
                tracing::info!("📂 Loaded {} block(s) from {}", blocks.len(), store.location());
                Ok(Chain { blocks, store })
            }
            _ => {
                let genesis = Block::genesis(now_timestamp().into());
                persist(&store, std::slice::from_ref(&genesis))?;
                tracing::info!("🌱 Created genesis block {} at {}", short_hash(genesis.hash()), store.location());
                Ok(Chain { blocks: vec![genesis], store })
            }
        }
    }

    /// Append a block carrying `data`, linked to the current tip.
    ///
    /// The block is staged, the full sequence is persisted, and only then is
    /// the block committed to memory.
    pub fn append(&mut self, data: impl Into<String>) -> Result<&Block, ChainError> {
        let previous = self.latest_block();
        let block = Block::new(
            self.blocks.len() as u64,
            now_timestamp().into(),
            data.into(),
            previous.hash().to_string(),
        );

        let mut staged: Vec<StoredBlock> = self.blocks.iter().map(StoredBlock::from).collect();
        staged.push(StoredBlock::from(&block));
        self.store.save(&staged).map_err(|e| {
            tracing::error!("Failed to persist block #{}: {}", block.index(), e);
            ChainError::StoreWriteFailed(e)
        })?;

        tracing::info!("📦 Appended block #{} ({})", block.index(), short_hash(block.hash()));
        self.blocks.push(block);
        Ok(&self.blocks[self.blocks.len() - 1])
    }

    /// Replace the chain with a fresh genesis block when `confirmed`.
    ///
    /// Returns `Ok(false)` and touches nothing when not confirmed. Asking the
    /// user is the caller's job.
    pub fn reset(&mut self, confirmed: bool) -> Result<bool, ChainError> {
        if !confirmed {
            tracing::debug!("Reset not confirmed, chain left untouched");
            return Ok(false);
        }
        let genesis = Block::genesis(now_timestamp().into());
        persist(&self.store, std::slice::from_ref(&genesis))?;
        let discarded = self.blocks.len();
        self.blocks = vec![genesis];
        tracing::info!("🔄 Chain reset to genesis ({} block(s) discarded)", discarded);
        Ok(true)
    }

    /// Re-read the store and check every record.
    ///
    /// In-memory blocks are not consulted: the point is to catch edits made
    /// to the store behind this process's back.
    pub fn validate(&self) -> Result<Validation, ChainError> {
        let records = self.store.load().map_err(ChainError::StoreUnreadable)?;
        let result = match records {
            Some(records) => verify_records(&records),
            None => Validation::Invalid(IntegrityViolation::Empty),
        };
        match &result {
            Validation::Valid { blocks } => tracing::info!("✅ Chain valid ({} blocks)", blocks),
            Validation::Invalid(violation) => tracing::warn!("❌ Chain invalid: {}", violation),
        }
        Ok(result)
    }

    pub fn blocks(&self) -> &[Block] { &self.blocks }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> { self.blocks.iter() }

    pub fn len(&self) -> usize { self.blocks.len() }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn latest_block(&self) -> &Block { &self.blocks[self.blocks.len() - 1] }

    pub fn genesis(&self) -> &Block { &self.blocks[0] }

    pub fn store(&self) -> &S { &self.store }
}

impl<'a, S: BlockStore> IntoIterator for &'a Chain<S> {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter { self.blocks.iter() }
}

fn persist<S: BlockStore>(store: &S, blocks: &[Block]) -> Result<(), ChainError> {
    let records: Vec<StoredBlock> = blocks.iter().map(StoredBlock::from).collect();
    store.save(&records).map_err(|e| {
        tracing::error!("Failed to persist chain to {}: {}", store.location(), e);
        ChainError::StoreWriteFailed(e)
    })
}

// ─── Validation ─────────────────────────────────────────────────────

/// Check raw records in order, stopping at the first failure.
///
/// For each record the digest is recomputed from its own fields and compared
/// with the stored hash; every record after the first must also point at its
/// predecessor's stored hash.
pub fn verify_records(records: &[StoredBlock]) -> Validation {
    if records.is_empty() {
        return Validation::Invalid(IntegrityViolation::Empty);
    }
    for (i, record) in records.iter().enumerate() {
        let index = i as u64;
        let recomputed = block_digest(
            record.index,
            &record.timestamp.to_string(),
            &record.data,
            &record.previous_hash,
        );
        if recomputed != record.hash {
            return Validation::Invalid(IntegrityViolation::HashMismatch {
                index,
                stored: record.hash.clone(),
                recomputed,
            });
        }
        if i > 0 {
            let expected = &records[i - 1].hash;
            if &record.previous_hash != expected {
                return Validation::Invalid(IntegrityViolation::BrokenLink {
                    index,
                    previous_hash: record.previous_hash.clone(),
                    expected: expected.clone(),
                });
            }
        }
    }
    Validation::Valid { blocks: records.len() }
}

/// Outcome of [`Chain::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid { blocks: usize },
    Invalid(IntegrityViolation),
}

impl Validation {
    pub fn is_valid(&self) -> bool { matches!(self, Validation::Valid { .. }) }

    pub fn violation(&self) -> Option<&IntegrityViolation> {
        match self {
            Validation::Valid { .. } => None,
            Validation::Invalid(v) => Some(v),
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Valid { blocks } => write!(f, "valid ({} blocks)", blocks),
            Validation::Invalid(v) => write!(f, "invalid: {}", v),
        }
    }
}

/// The first inconsistency found in the persisted chain. Positions are
/// counted in store order, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// Stored hash does not match the digest of the record's own fields.
    HashMismatch { index: u64, stored: String, recomputed: String },
    /// `previous_hash` does not match the preceding record's stored hash.
    BrokenLink { index: u64, previous_hash: String, expected: String },
    /// The store holds no records at all.
    Empty,
}

impl IntegrityViolation {
    pub fn index(&self) -> Option<u64> {
        match self {
            IntegrityViolation::HashMismatch { index, .. } => Some(*index),
            IntegrityViolation::BrokenLink { index, .. } => Some(*index),
            IntegrityViolation::Empty => None,
        }
    }
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityViolation::HashMismatch { index, stored, recomputed } => write!(
                f,
                "hash mismatch at index {} (stored {}, recomputed {})",
                index, stored, recomputed
            ),
            IntegrityViolation::BrokenLink { index, previous_hash, expected } => write!(
                f,
                "broken link at index {} (previous_hash {}, expected {})",
                index, previous_hash, expected
            ),
            IntegrityViolation::Empty => write!(f, "store holds no blocks"),
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The store exists but could not be read or parsed.
    #[error("store unreadable: {0}")]
    StoreUnreadable(#[source] StorageError),
    /// Persisting a mutation failed; memory was left as it was.
    #[error("store write failed: {0}")]
    StoreWriteFailed(#[source] StorageError),
}
