/// Length of a rendered SHA-256 digest in hex characters
pub const HASH_HEX_LEN: usize = 64;

/// `previous_hash` of the first entry in every election's chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Default cap on a decompressed snapshot archive, in MiB
pub const DEFAULT_MAX_SNAPSHOT_MB: u64 = 256;

/// Env var overriding [`DEFAULT_MAX_SNAPSHOT_MB`]
pub const MAX_SNAPSHOT_MB_ENV: &str = "VOTECHAIN_MAX_SNAPSHOT_MB";
