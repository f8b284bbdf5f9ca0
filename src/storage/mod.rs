use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Key under which the sled backend keeps the serialized chain.
const SLED_CHAIN_KEY: &[u8] = b"chain";

/// One persisted block, exactly as it appears in the store.
///
/// The validator works on these raw records rather than on live blocks, so
/// every field is kept verbatim, including a possibly stale `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredBlock {
    pub index: u64,
    pub timestamp: Timestamp,
    pub data: String,
    pub previous_hash: String,
    pub hash: String,
}

/// Creation time of a block, opaque to validation.
///
/// Stores may hold it as a JSON string or a JSON number. It is kept in the
/// form it was read in and re-serialized the same way; the digest covers its
/// textual rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Text(text) => f.write_str(text),
            Timestamp::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<String> for Timestamp {
    fn from(text: String) -> Self { Timestamp::Text(text) }
}

impl From<&str> for Timestamp {
    fn from(text: &str) -> Self { Timestamp::Text(text.to_string()) }
}

/// Durable home of the whole chain.
///
/// `load` returns `Ok(None)` when nothing has been persisted yet (absent or
/// empty store) and an error when something is there but unreadable.
/// `save` replaces the full sequence; when it returns `Ok` the data is on disk.
pub trait BlockStore {
    fn load(&self) -> Result<Option<Vec<StoredBlock>>, StorageError>;
    fn save(&self, blocks: &[StoredBlock]) -> Result<(), StorageError>;
    /// Human-readable location, for logs and `info`.
    fn location(&self) -> String;
}

impl<S: BlockStore + ?Sized> BlockStore for Box<S> {
    fn load(&self) -> Result<Option<Vec<StoredBlock>>, StorageError> { (**self).load() }
    fn save(&self, blocks: &[StoredBlock]) -> Result<(), StorageError> { (**self).save(blocks) }
    fn location(&self) -> String { (**self).location() }
}

// ─── Codec ───────────────────────────────────────────────────────────

/// Serialize the chain as a pretty-printed JSON array of records.
pub fn encode_blocks(blocks: &[StoredBlock]) -> Result<String, StorageError> {
    serde_json::to_string_pretty(blocks).map_err(StorageError::Encode)
}

/// Parse a JSON array of records. Blank input and `[]` both mean "no chain".
pub fn decode_blocks(text: &str) -> Result<Option<Vec<StoredBlock>>, StorageError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let blocks: Vec<StoredBlock> = serde_json::from_str(text).map_err(StorageError::Parse)?;
    if blocks.is_empty() {
        Ok(None)
    } else {
        Ok(Some(blocks))
    }
}

// ─── JSON file ───────────────────────────────────────────────────────

/// Single JSON file holding the entire chain.
///
/// Saves write a sibling temp file, fsync it and rename it over the target,
/// so readers see either the old or the new chain, never a torn write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileStore { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl BlockStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<StoredBlock>>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };
        tracing::debug!("Read {} bytes from {}", text.len(), self.path.display());
        decode_blocks(&text)
    }

    fn save(&self, blocks: &[StoredBlock]) -> Result<(), StorageError> {
        let json = encode_blocks(blocks)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.temp_path();
        if let Err(e) = replace_file(&tmp, &self.path, json.as_bytes()) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(StorageError::Io(e));
        }
        tracing::debug!("Wrote {} blocks to {}", blocks.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String { self.path.display().to_string() }
}

/// Write `bytes` to `tmp`, fsync, then rename it over `target`.
fn replace_file(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, target)
}

// ─── Sled ────────────────────────────────────────────────────────────

/// The same JSON array kept as one blob in an embedded sled database.
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

impl SledStore {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        Ok(SledStore { db, path: path.as_ref().to_path_buf() })
    }
}

impl BlockStore for SledStore {
    fn load(&self) -> Result<Option<Vec<StoredBlock>>, StorageError> {
        match self.db.get(SLED_CHAIN_KEY)? {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;
                decode_blocks(text)
            }
            None => Ok(None),
        }
    }

    fn save(&self, blocks: &[StoredBlock]) -> Result<(), StorageError> {
        let json = encode_blocks(blocks)?;
        self.db.insert(SLED_CHAIN_KEY, json.as_bytes())?;
        self.db.flush()?;
        tracing::debug!("Wrote {} blocks to sled at {}", blocks.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String { format!("sled:{}", self.path.display()) }
}

// ─── Memory ──────────────────────────────────────────────────────────

/// In-process store holding the serialized JSON text. Goes through the same
/// codec as the durable backends, so raw edits behave like file edits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: RefCell<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_contents(text: impl Into<String>) -> Self {
        MemoryStore { contents: RefCell::new(Some(text.into())) }
    }

    /// Raw serialized text, if anything was saved.
    pub fn contents(&self) -> Option<String> { self.contents.borrow().clone() }

    /// Overwrite the raw text, bypassing the chain.
    pub fn set_contents(&self, text: impl Into<String>) {
        *self.contents.borrow_mut() = Some(text.into());
    }
}

impl BlockStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<StoredBlock>>, StorageError> {
        match self.contents.borrow().as_deref() {
            Some(text) => decode_blocks(text),
            None => Ok(None),
        }
    }

    fn save(&self, blocks: &[StoredBlock]) -> Result<(), StorageError> {
        let json = encode_blocks(blocks)?;
        *self.contents.borrow_mut() = Some(json);
        Ok(())
    }

    fn location(&self) -> String { "memory".to_string() }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed store: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("serialization error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64, data: &str) -> StoredBlock {
        StoredBlock {
            index,
            timestamp: "Mon Jan  1 09:05:03 2024".into(),
            data: data.into(),
            previous_hash: "0".into(),
            hash: format!("h{}", index),
        }
    }

    #[test]
    fn test_decode_blank_and_empty_array_mean_no_chain() {
        assert!(decode_blocks("").unwrap().is_none());
        assert!(decode_blocks("  \n").unwrap().is_none());
        assert!(decode_blocks("[]").unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode_blocks("{not json"), Err(StorageError::Parse(_))));
        assert!(matches!(decode_blocks("{\"index\": 0}"), Err(StorageError::Parse(_))));
        // missing `hash`
        let missing = r#"[{"index":0,"timestamp":"t","data":"d","previous_hash":"0"}]"#;
        assert!(matches!(decode_blocks(missing), Err(StorageError::Parse(_))));
        // sixth field
        let extra = r#"[{"index":0,"timestamp":"t","data":"d","previous_hash":"0","hash":"h","nonce":1}]"#;
        assert!(matches!(decode_blocks(extra), Err(StorageError::Parse(_))));
        // negative index
        let negative = r#"[{"index":-1,"timestamp":"t","data":"d","previous_hash":"0","hash":"h"}]"#;
        assert!(matches!(decode_blocks(negative), Err(StorageError::Parse(_))));
    }

    #[test]
    fn test_encoded_records_have_five_named_fields() {
        let json = encode_blocks(&[record(0, "Genesis Block")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let obj = value[0].as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["data", "hash", "index", "previous_hash", "timestamp"]);
        assert_eq!(obj["index"], serde_json::json!(0));
    }

    #[test]
    fn test_json_file_store_absent_then_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("chain.json"));
        assert!(store.load().unwrap().is_none());

        let blocks = vec![record(0, "Genesis Block"), record(1, "a")];
        store.save(&blocks).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), blocks);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_json_file_store_overwrites_whole_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        store.save(&[record(0, "Genesis Block"), record(1, "a"), record(2, "b")]).unwrap();
        store.save(&[record(0, "Genesis Block")]).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_json_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(&path, "[{\"index\": 0,").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StorageError::Parse(_))));
    }

    #[test]
    fn test_json_file_store_save_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let store = JsonFileStore::new(blocker.join("chain.json"));
        assert!(matches!(store.save(&[record(0, "Genesis Block")]), Err(StorageError::Io(_))));
    }

    #[test]
    fn test_json_file_store_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        // a non-empty directory where the file should go makes the rename fail
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupant"), "x").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.save(&[record(0, "Genesis Block")]), Err(StorageError::Io(_))));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_decode_numeric_timestamps() {
        let text = r#"[
            {"index":0,"timestamp":1700000000,"data":"Genesis Block","previous_hash":"0","hash":"a"},
            {"index":1,"timestamp":1700000000.5,"data":"x","previous_hash":"a","hash":"b"},
            {"index":2,"timestamp":"Mon Jan  1 09:05:03 2024","data":"y","previous_hash":"b","hash":"c"}
        ]"#;
        let blocks = decode_blocks(text).unwrap().unwrap();
        assert!(matches!(blocks[0].timestamp, Timestamp::Number(_)));
        assert_eq!(blocks[0].timestamp.to_string(), "1700000000");
        assert_eq!(blocks[1].timestamp.to_string(), "1700000000.5");
        assert_eq!(blocks[2].timestamp, Timestamp::from("Mon Jan  1 09:05:03 2024"));

        // numbers stay numbers on the way back out
        let encoded = encode_blocks(&blocks).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert!(value[0]["timestamp"].is_u64());
        assert!(value[1]["timestamp"].is_f64());
        assert!(value[2]["timestamp"].is_string());
        assert_eq!(decode_blocks(&encoded).unwrap().unwrap(), blocks);
    }

    #[test]
    fn test_decode_rejects_non_scalar_timestamp() {
        let text = r#"[{"index":0,"timestamp":null,"data":"d","previous_hash":"0","hash":"h"}]"#;
        assert!(matches!(decode_blocks(text), Err(StorageError::Parse(_))));
        let text = r#"[{"index":0,"timestamp":[1],"data":"d","previous_hash":"0","hash":"h"}]"#;
        assert!(matches!(decode_blocks(text), Err(StorageError::Parse(_))));
    }

    #[test]
    fn test_sled_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path().join("chain.db")).unwrap();
        assert!(store.load().unwrap().is_none());
        let blocks = vec![record(0, "Genesis Block"), record(1, "x")];
        store.save(&blocks).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), blocks);
        assert!(store.location().starts_with("sled:"));
    }

    #[test]
    fn test_sled_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        {
            let store = SledStore::open(&path).unwrap();
            store.save(&[record(0, "Genesis Block")]).unwrap();
        }
        let store = SledStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap().unwrap()[0].data, "Genesis Block");
    }

    #[test]
    fn test_memory_store_raw_edits_visible() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&[record(0, "Genesis Block")]).unwrap();
        let edited = store.contents().unwrap().replace("Genesis Block", "Edited");
        store.set_contents(edited);
        assert_eq!(store.load().unwrap().unwrap()[0].data, "Edited");

        let boxed: Box<dyn BlockStore> = Box::new(MemoryStore::with_contents("garbage"));
        assert!(boxed.load().is_err());
        assert_eq!(boxed.location(), "memory");
    }
}
