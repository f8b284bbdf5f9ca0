//! Hashchain chain parameters.
//! Everything that shapes the on-disk format or the genesis block lives here.

/// Payload of the genesis block. No other block is ever created without
/// caller-supplied data.
pub const GENESIS_DATA: &str = "Genesis Block";

/// Sentinel stored as `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Index of the genesis block.
pub const GENESIS_INDEX: u64 = 0;

/// `ctime`-style layout used for block timestamps, e.g. `Mon Jan  1 00:00:00 2024`.
pub const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Default data directory when `--data-dir` is not given.
pub const DEFAULT_DATA_DIR: &str = "hashchain_data";

/// File name of the JSON store inside the data directory.
pub const STORE_FILE_NAME: &str = "chain.json";

/// Directory name of the sled store inside the data directory.
pub const SLED_DIR_NAME: &str = "chain.db";

/// Current wall-clock time rendered with [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
