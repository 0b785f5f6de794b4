//! Protocol and policy constants. All monetary values in sables (1 SABLE = 10^8 sables).

pub const COIN: u64 = 100_000_000;

pub const MAX_BLOCK_SIZE: usize = 1_048_576;
pub const MAX_TX_SIZE: usize = 100_000;
pub const MAX_INPUTS: usize = 1000;
pub const MAX_OUTPUTS: usize = 1000;
pub const COINBASE_MATURITY: u64 = 100;
pub const MAX_COINBASE_DATA: usize = 100;
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

// --- Input sequence numbers ---

/// Sequence value that disables both lock-time override and relative locks.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Highest sequence value that still signals opt-in replaceability.
///
/// A transaction is replaceable when any input carries a sequence at or
/// below this value (BIP 125).
pub const MAX_RBF_SEQUENCE: u32 = 0xffff_fffd;

/// Bit 31: when set, the input's relative lock is disabled (BIP 68).
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Bit 22: when set, the relative lock is time-based rather than height-based.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Low 16 bits carry the relative lock value.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Time-based relative locks count in units of 2^9 = 512 seconds.
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;

// --- Mempool policy defaults ---

/// Minimum relay fee rate in sables per 1000 virtual bytes.
pub const DEFAULT_MIN_RELAY_FEE_RATE: u64 = 1000;

/// Fee rate step (sables/kvB) a replacement must add on top of the fees it
/// evicts, and the floor below which the rolling minimum fee snaps to zero.
pub const DEFAULT_INCREMENTAL_RELAY_FEE_RATE: u64 = 1000;

/// Default mempool size limit: 300 MB of dynamic usage.
pub const DEFAULT_MAX_MEMPOOL_BYTES: usize = 300 * 1024 * 1024;

/// Default mempool expiry: two weeks.
pub const DEFAULT_MEMPOOL_EXPIRY_SECS: u64 = 14 * 24 * 60 * 60;

pub const DEFAULT_ANCESTOR_LIMIT: u64 = 25;
pub const DEFAULT_ANCESTOR_SIZE_LIMIT: u64 = 101_000;
pub const DEFAULT_DESCENDANT_LIMIT: u64 = 25;
pub const DEFAULT_DESCENDANT_SIZE_LIMIT: u64 = 101_000;

/// Maximum number of pool entries a single replacement may evict
/// (direct conflicts plus their descendants).
pub const MAX_REPLACEMENT_CANDIDATES: usize = 100;

/// Rolling minimum fee half-life: 12 hours.
pub const ROLLING_FEE_HALFLIFE: u64 = 60 * 60 * 12;

/// Approximate cost in virtual bytes of later spending one output
/// (outpoint + signature + public key). Used for the dust threshold.
pub const OUTPUT_SPEND_SIZE: u64 = 148;

/// An output is dust when its value is below the fee to spend it at three
/// times the minimum relay rate.
pub const DUST_RELAY_MULTIPLIER: u64 = 3;
