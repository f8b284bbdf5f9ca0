//! Hashchain: an append-only sequence of hash-linked blocks, persisted after
//! every mutation and re-verified from the persisted store on demand.

pub mod core;
pub mod crypto;
pub mod storage;

pub use crate::core::chain::{verify_records, Chain, ChainError, IntegrityViolation, Validation};
pub use crate::core::types::Block;
pub use crate::storage::{BlockStore, JsonFileStore, MemoryStore, SledStore, StorageError, StoredBlock, Timestamp};
