//! KMD accumulator (component B): encodes per-key metadata records into a
//! growable byte buffer that the key-block writer later consumes
//! verbatim.
//!
//! Every key carries two independent KMD streams — the main stream
//! (regular values, inline values, zero-length values, regular
//! tombstones) and the secondary/prefix-tombstone stream — because a
//! prefix tombstone logically applies to every key under it and must be
//! visible to a reader without decoding the main stream's per-key
//! records. [`kblock::KeyBlockWriter`](super::kblock::KeyBlockWriter)
//! decides how the two streams are placed relative to each other; this
//! module only produces the bytes.

use crate::encoding::{Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// KmdBuffer — geometric-growth byte accumulator
// ------------------------------------------------------------------------------------------------

/// A byte buffer that grows geometrically, reserving headroom before each
/// append so that a run of small records doesn't reallocate on every
/// call.
///
/// The growth policy — start at 16 KiB, double (or grow to exactly what's
/// needed if that's larger) whenever fewer than 256 bytes of headroom
/// remain — mirrors the reservation strategy used by the key-metadata
/// accumulator this crate's KMD format was modeled on.
#[derive(Debug, Default)]
pub struct KmdBuffer {
    buf: Vec<u8>,
}

impl KmdBuffer {
    const INITIAL_CAPACITY: usize = 16 * 1024;
    const HEADROOM: usize = 256;

    /// Create an empty buffer with no backing allocation yet.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The buffer's contents, ready to hand to a key-block writer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Drop all contents, keeping the backing allocation for reuse.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Ensure at least [`Self::HEADROOM`] bytes beyond the current length
    /// are available without a further reallocation.
    fn reserve(&mut self) {
        let needed = self.buf.len() + Self::HEADROOM;
        if self.buf.capacity() >= needed {
            return;
        }
        let new_cap = if self.buf.capacity() == 0 {
            Self::INITIAL_CAPACITY.max(needed)
        } else {
            (self.buf.capacity() * 2).max(needed)
        };
        let mut grown = Vec::with_capacity(new_cap);
        grown.extend_from_slice(&self.buf);
        self.buf = grown;
    }

    /// Append one record, reserving headroom first.
    pub fn append(&mut self, record: &KmdRecord) -> Result<(), EncodingError> {
        self.reserve();
        record.encode_to(&mut self.buf)
    }
}

// ------------------------------------------------------------------------------------------------
// KmdRecord — the six tagged record kinds
// ------------------------------------------------------------------------------------------------

/// One per-key-per-commit metadata record.
///
/// Wire format: `[tag: u8][seq: u64][fields…]`. Using an enum instead of a
/// shared struct with sentinel fields (as the original C implementation's
/// pointer-tagged union does) makes invalid combinations — like a
/// compressed length on a tombstone — unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmdRecord {
    /// An out-of-line value, stored uncompressed.
    Val {
        /// Sequence number this value was committed at.
        seq: u64,
        /// Index of the value block within this kvset's value-block list.
        vbidx: u32,
        /// Byte offset of the value within that block.
        vboff: u32,
        /// Length of the value in bytes.
        vlen: u32,
    },
    /// An out-of-line value, stored compressed.
    Cval {
        /// Sequence number this value was committed at.
        seq: u64,
        /// Index of the value block within this kvset's value-block list.
        vbidx: u32,
        /// Byte offset of the value within that block.
        vboff: u32,
        /// Length of the value as stored on media (compressed).
        complen: u32,
        /// Length of the value once decompressed.
        vlen: u32,
    },
    /// A small value, inlined directly into the KMD stream.
    Ival {
        /// Sequence number this value was committed at.
        seq: u64,
        /// The inline value bytes.
        value: Vec<u8>,
    },
    /// An explicit zero-length value.
    Zval {
        /// Sequence number this value was committed at.
        seq: u64,
    },
    /// A regular (point) tombstone.
    Tomb {
        /// Sequence number the tombstone was committed at.
        seq: u64,
    },
    /// A prefix tombstone, recorded in the secondary KMD stream.
    Ptomb {
        /// Sequence number the prefix tombstone was committed at.
        seq: u64,
    },
}

impl KmdRecord {
    /// The sequence number carried by every record kind.
    pub fn seq(&self) -> u64 {
        match self {
            KmdRecord::Val { seq, .. }
            | KmdRecord::Cval { seq, .. }
            | KmdRecord::Ival { seq, .. }
            | KmdRecord::Zval { seq }
            | KmdRecord::Tomb { seq }
            | KmdRecord::Ptomb { seq } => *seq,
        }
    }
}

const TAG_VAL: u8 = 0;
const TAG_CVAL: u8 = 1;
const TAG_IVAL: u8 = 2;
const TAG_ZVAL: u8 = 3;
const TAG_TOMB: u8 = 4;
const TAG_PTOMB: u8 = 5;

impl Encode for KmdRecord {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            KmdRecord::Val {
                seq,
                vbidx,
                vboff,
                vlen,
            } => {
                TAG_VAL.encode_to(buf)?;
                seq.encode_to(buf)?;
                vbidx.encode_to(buf)?;
                vboff.encode_to(buf)?;
                vlen.encode_to(buf)
            }
            KmdRecord::Cval {
                seq,
                vbidx,
                vboff,
                complen,
                vlen,
            } => {
                TAG_CVAL.encode_to(buf)?;
                seq.encode_to(buf)?;
                vbidx.encode_to(buf)?;
                vboff.encode_to(buf)?;
                complen.encode_to(buf)?;
                vlen.encode_to(buf)
            }
            KmdRecord::Ival { seq, value } => {
                TAG_IVAL.encode_to(buf)?;
                seq.encode_to(buf)?;
                value.encode_to(buf)
            }
            KmdRecord::Zval { seq } => {
                TAG_ZVAL.encode_to(buf)?;
                seq.encode_to(buf)
            }
            KmdRecord::Tomb { seq } => {
                TAG_TOMB.encode_to(buf)?;
                seq.encode_to(buf)
            }
            KmdRecord::Ptomb { seq } => {
                TAG_PTOMB.encode_to(buf)?;
                seq.encode_to(buf)
            }
        }
    }
}

impl Decode for KmdRecord {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, mut off) = u8::decode_from(buf)?;
        let (seq, n) = u64::decode_from(&buf[off..])?;
        off += n;
        match tag {
            TAG_VAL => {
                let (vbidx, n) = u32::decode_from(&buf[off..])?;
                off += n;
                let (vboff, n) = u32::decode_from(&buf[off..])?;
                off += n;
                let (vlen, n) = u32::decode_from(&buf[off..])?;
                off += n;
                Ok((
                    KmdRecord::Val {
                        seq,
                        vbidx,
                        vboff,
                        vlen,
                    },
                    off,
                ))
            }
            TAG_CVAL => {
                let (vbidx, n) = u32::decode_from(&buf[off..])?;
                off += n;
                let (vboff, n) = u32::decode_from(&buf[off..])?;
                off += n;
                let (complen, n) = u32::decode_from(&buf[off..])?;
                off += n;
                let (vlen, n) = u32::decode_from(&buf[off..])?;
                off += n;
                Ok((
                    KmdRecord::Cval {
                        seq,
                        vbidx,
                        vboff,
                        complen,
                        vlen,
                    },
                    off,
                ))
            }
            TAG_IVAL => {
                let (value, n) = Vec::<u8>::decode_from(&buf[off..])?;
                off += n;
                Ok((KmdRecord::Ival { seq, value }, off))
            }
            TAG_ZVAL => Ok((KmdRecord::Zval { seq }, off)),
            TAG_TOMB => Ok((KmdRecord::Tomb { seq }, off)),
            TAG_PTOMB => Ok((KmdRecord::Ptomb { seq }, off)),
            other => Err(EncodingError::InvalidTag {
                tag: other as u32,
                type_name: "KmdRecord",
            }),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// KeyStats — per-key counters fed to the key-block writer at commit time
// ------------------------------------------------------------------------------------------------

/// Running counters for the key currently being built.
///
/// Reset via [`KeyStats::reset`] whenever [`super::builder::KvsetBuilder::add_key`]
/// starts a new key.
#[derive(Debug, Clone, Copy)]
pub struct KeyStats {
    /// Number of value commits (including tombstones, per the original
    /// counting convention) seen for this key.
    pub nvals: u32,
    /// Number of regular-tombstone commits seen for this key.
    pub ntombs: u32,
    /// Number of prefix-tombstone commits seen for this key.
    pub nptombs: u32,
    /// Sum of all value lengths committed for this key (decompressed).
    pub tot_vlen: u64,
    /// Sum of value lengths in the main KMD stream's "c0" generation.
    pub c0_vlen: u64,
    /// Sum of value lengths in the main KMD stream's "c1" generation.
    pub c1_vlen: u64,
    /// Sequence number of the previous main-stream commit, or `u64::MAX`
    /// if none yet.
    pub seqno_prev: u64,
    /// Sequence number of the previous prefix-tombstone commit, or
    /// `u64::MAX` if none yet.
    pub seqno_prev_ptomb: u64,
}

impl Default for KeyStats {
    fn default() -> Self {
        Self {
            nvals: 0,
            ntombs: 0,
            nptombs: 0,
            tot_vlen: 0,
            c0_vlen: 0,
            c1_vlen: 0,
            seqno_prev: u64::MAX,
            seqno_prev_ptomb: u64::MAX,
        }
    }
}

impl KeyStats {
    /// Reset all counters for the start of a new key.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
