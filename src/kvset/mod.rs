//! Kvset builder — assembles an immutable, on-media sorted key/value set.
//!
//! A *kvset* is the on-media form of one node's worth of sorted key/value
//! data: a key-block stream carrying keys plus per-key metadata (KMD), and
//! a value-block stream carrying the associated value bytes. This module
//! builds that pair of streams from a caller-driven sequence of key and
//! value commits; it does not decide *what* goes into a kvset (that's a
//! compaction/flush policy decision made by the owning engine) and it does
//! not read kvsets back (that's the engine's read path).
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      KvsetBuilder                         │
//! │                                                            │
//! │   add_key(key)                                             │
//! │     │                                                      │
//! │     ├─ add_ptomb(seq)───┐                                  │
//! │     └─ add_val/add_vref/add_nonval(seq, …) ─┐               │
//! │                                             │               │
//! │   ┌─────────────┐     KMD bytes     ┌───────▼────────┐     │
//! │   │ KmdBuffer    │◄──────────────────│  per-key stats │     │
//! │   │ (main+ptomb) │                   └────────────────┘     │
//! │   └──────┬───────┘                                          │
//! │          │ commit                                           │
//! │   ┌──────▼────────┐        value bytes      ┌─────────────┐│
//! │   │ KeyBlockWriter│                          │ValueBlock   ││
//! │   │ (component C) │                          │Writer (D)   ││
//! │   └──────┬────────┘                          └──────┬──────┘│
//! │          │ kblks                                    │ vblks │
//! │          ▼                                          ▼       │
//! │                    get_mblocks() → KvsetMblocks              │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`kmd`] | KMD accumulator — per-key metadata record encoding (component B) |
//! | [`kblock`] | Key-Block Writer — ascending-key-ordered cell framing (component C) |
//! | [`vblock`] | Value-Block Writer — value byte packing and block addressing (component D) |
//! | [`compress`] | Compression adapter — estimate/compress for out-of-line values (component E) |
//! | [`media_pool`] | Pluggable media-block namespace the writers allocate from |
//! | [`builder`] | Builder façade tying the above together (component A) |

#![allow(dead_code)]

pub mod builder;
pub mod compress;
pub mod kblock;
pub mod kmd;
pub mod media_pool;
pub mod vblock;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use builder::KvsetBuilder;
pub use compress::{CompressionAdapter, Lz4Adapter, NullAdapter};
pub use kblock::{KeyBlockError, KeyBlockWriter};
pub use media_pool::{FileMediaPool, MediaPool};
pub use vblock::{ValueBlockError, ValueBlockWriter};

// ------------------------------------------------------------------------------------------------
// Policy and identity types
// ------------------------------------------------------------------------------------------------

/// Maximum encoded key length, in bytes.
pub const KLEN_MAX: u32 = 1024;

/// Maximum encoded value length, in bytes.
pub const VLEN_MAX: u32 = 1024 * 1024;

/// Values at or below this length are stored inline in the KMD stream
/// instead of the value-block stream.
pub const SMALL_VALUE_THRESHOLD: u32 = 8;

/// Default target size of a flushed key block, in bytes.
pub const DEFAULT_KBLOCK_TARGET_SIZE: usize = 32 * 1024;

/// Default target size of a flushed value block, in bytes.
pub const DEFAULT_VBLOCK_TARGET_SIZE: usize = 1024 * 1024;

/// Policy inputs supplied by the owning engine for one builder instance.
///
/// Mirrors the shape of `EngineConfig` elsewhere in this codebase: a plain
/// data struct with a sane [`Default`], constructed by the caller rather
/// than parsed from a config file by this crate.
#[derive(Debug, Clone)]
pub struct KvsetPolicy {
    /// Maximum key length accepted by [`builder::KvsetBuilder::add_key`].
    pub klen_max: u32,
    /// Maximum value length accepted by the value-commit operations.
    pub vlen_max: u32,
    /// Values at or below this length are inlined into the KMD stream.
    pub small_value_threshold: u32,
    /// Whether the compression adapter should be consulted for
    /// out-of-line values.
    pub compression_enabled: bool,
    /// Target size, in bytes, of a flushed key block.
    pub kblock_target_size: usize,
    /// Target size, in bytes, of a flushed value block.
    pub vblock_target_size: usize,
}

impl Default for KvsetPolicy {
    fn default() -> Self {
        Self {
            klen_max: KLEN_MAX,
            vlen_max: VLEN_MAX,
            small_value_threshold: SMALL_VALUE_THRESHOLD,
            compression_enabled: true,
            kblock_target_size: DEFAULT_KBLOCK_TARGET_SIZE,
            vblock_target_size: DEFAULT_VBLOCK_TARGET_SIZE,
        }
    }
}

/// Age-group bucket used to look up media-class policy for newly allocated
/// blocks. The exact set of buckets is owner-defined; this crate only
/// threads the value through to the [`MediaPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeGroup {
    /// The topmost tier of the tree, closest to incoming writes.
    Root,
    /// An intermediate tier produced by compaction.
    Internal,
    /// The bottommost, coldest tier.
    Leaf,
}

/// Distinguishes a key block from a value block when asking a
/// [`MediaPool`] to apply media-class policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockClass {
    /// A key block (component C's output).
    Key,
    /// A value block (component D's output).
    Value,
}

/// Opaque identifier for a block allocated from a [`MediaPool`].
///
/// This crate treats block identifiers as opaque handles: it stores them
/// in order and hands the resulting list back to the caller, but never
/// interprets their bits. Allocation of the underlying media-block
/// namespace is the owner's responsibility, not this crate's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blk:{:#x}", self.0)
    }
}

// ------------------------------------------------------------------------------------------------
// Error taxonomy
// ------------------------------------------------------------------------------------------------

/// Errors produced while building a kvset.
///
/// Following this codebase's layering convention, each sub-writer owns its
/// own error enum and this top-level enum wraps them with `#[from]`.
#[derive(Debug, Error)]
pub enum KvsetError {
    /// The underlying allocator or writer ran out of memory.
    #[error("out of memory")]
    Oom,

    /// A key violated a structural constraint (empty, too long, or
    /// out of ascending order).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A sequence number was not strictly descending from the previous
    /// commit for the same key.
    #[error("sequence number {seq} is not less than previous {prev} for this key")]
    SeqnoOrder {
        /// The sequence number the caller attempted to commit.
        seq: u64,
        /// The previous sequence number observed for this key.
        prev: u64,
    },

    /// A value exceeded the configured maximum length.
    #[error("value length {len} exceeds vlen_max {max}")]
    ValueTooLarge {
        /// The value length the caller supplied.
        len: u32,
        /// The configured maximum.
        max: u32,
    },

    /// Inputs were internally inconsistent in a way that indicates a
    /// caller bug rather than bad data (e.g. a pre-compressed
    /// inline-vblock-hint reuse, which this crate's types otherwise make
    /// unrepresentable).
    #[error("internal invariant violation: {0}")]
    Bug(String),

    /// Propagated from the key-block writer.
    #[error(transparent)]
    KeyBlock(#[from] KeyBlockError),

    /// Propagated from the value-block writer.
    #[error(transparent)]
    ValueBlock(#[from] ValueBlockError),

    /// Propagated from the KMD encoding layer.
    #[error(transparent)]
    Encoding(#[from] crate::encoding::EncodingError),
}

// ------------------------------------------------------------------------------------------------
// Output type
// ------------------------------------------------------------------------------------------------

/// The tail of the single largest prefix tombstone observed by a capped
/// builder, recorded so the owner's retention subsystem can fast-path
/// "is this key covered by a later capped kvset's prefix tombstone?"
/// without opening the kvset.
#[derive(Debug, Clone)]
pub struct PrefixTombstoneTail {
    /// The prefix tombstone's key bytes.
    pub key: Vec<u8>,
    /// The sequence number the prefix tombstone was committed at.
    pub seq: u64,
}

/// The finished output of a [`builder::KvsetBuilder`]: the two block lists
/// plus the aggregate metadata the owner needs to register the new kvset.
#[derive(Debug, Clone)]
pub struct KvsetMblocks {
    /// Key blocks, in the order they were flushed.
    pub kblks: Vec<BlockId>,
    /// Value blocks, in the order they were flushed.
    pub vblks: Vec<BlockId>,
    /// Total bytes of live value data referenced from `vblks`.
    pub vused: u64,
    /// Minimum sequence number committed to this kvset.
    pub seqno_min: u64,
    /// Maximum sequence number committed to this kvset.
    pub seqno_max: u64,
    /// The tail of the largest prefix tombstone seen, if the builder was
    /// marked capped and at least one prefix tombstone was committed.
    pub last_ptomb: Option<PrefixTombstoneTail>,
}

/// Frames `data` as `[len_le: u32][data][crc32_le: u32]`, the checksummed
/// block layout both the key-block and value-block writers use when
/// handing bytes to a [`MediaPool`].
pub(crate) fn frame_block(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + data.len() + 4);
    framed.extend_from_slice(&(data.len() as u32).to_le_bytes());
    framed.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    framed.extend_from_slice(&hasher.finalize().to_le_bytes());
    framed
}

/// Merge statistics an owner may attach to a builder for bookkeeping;
/// this crate only stores and returns whatever is set, it never computes
/// or interprets these numbers itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// Number of keys read from the inputs being merged.
    pub keys_in: u64,
    /// Number of keys written to this kvset.
    pub keys_out: u64,
    /// Number of value commits read from the inputs being merged.
    pub vals_in: u64,
    /// Number of value commits written to this kvset.
    pub vals_out: u64,
}
