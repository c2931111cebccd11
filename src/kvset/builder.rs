//! Builder façade (component A): the public entry point that a flush or
//! compaction path drives to assemble one kvset.
//!
//! Callers drive the builder through a fixed protocol: [`KvsetBuilder::add_key`]
//! starts a new key, zero or more of [`KvsetBuilder::add_val`] /
//! [`KvsetBuilder::add_vref`] / [`KvsetBuilder::add_nonval`] commit versions
//! of it in strictly descending sequence-number order, and
//! [`KvsetBuilder::get_mblocks`] finishes the kvset and hands back its
//! block lists. Dropping a builder before calling `get_mblocks` releases
//! every block it had written so far — see the [`KeyBlockWriter`](super::kblock::KeyBlockWriter)
//! and [`ValueBlockWriter`](super::vblock::ValueBlockWriter) `Drop` impls,
//! which this façade relies on instead of an explicit destroy call.

use tracing::{info, trace};

use super::compress::CompressionAdapter;
use super::kblock::KeyBlockWriter;
use super::kmd::{KeyStats, KmdBuffer, KmdRecord};
use super::media_pool::MediaPool;
use super::vblock::ValueBlockWriter;
use super::{AgeGroup, KvsetError, KvsetMblocks, KvsetPolicy, MergeStats, PrefixTombstoneTail};

/// A value being committed for the current key.
///
/// Replaces the sentinel-pointer encoding (`TOMB_REG`/`TOMB_PFX` constants
/// aliased onto the value pointer) the on-disk format was originally
/// modeled on with a tagged enum, so the five cases the builder must
/// distinguish are checked exhaustively by the compiler rather than by a
/// chain of pointer comparisons.
pub enum Value<'a> {
    /// A regular (point) tombstone.
    Tombstone,
    /// A prefix tombstone, applying to every key under this one.
    PrefixTombstone,
    /// An explicit zero-length value.
    Zero,
    /// Value bytes not yet compressed; the builder may compress them
    /// before writing, subject to policy and the compression adapter's
    /// estimate.
    Raw(&'a [u8]),
    /// Value bytes already compressed by the caller; stored exactly as
    /// given, bypassing this builder's own compression decision.
    PreCompressed {
        /// The compressed bytes to store.
        bytes: &'a [u8],
        /// The length the value decompresses to.
        uncompressed_len: u32,
    },
}

/// A hint that `value` (which must be [`Value::Raw`]) is already present,
/// verbatim and uncompressed, at a known location in an upstream value
/// block — so the builder should record a reference to it instead of
/// writing a second copy.
///
/// Carrying no `complen` field makes "reuse a value that's actually
/// stored compressed" unrepresentable: that case has different addressing
/// semantics and must go through [`KvsetBuilder::add_vref`] instead.
pub struct VblockHint {
    /// Index of the upstream value block, in this kvset's value-block
    /// addressing space.
    pub block_index: u32,
    /// Byte offset of the value within that block.
    pub offset: u32,
}

/// A reference to a value that already exists — typically in an
/// earlier-generation value block this kvset is extending — described
/// entirely by its location, with no bytes attached.
///
/// Unlike [`KvsetBuilder::add_val`], committing a reference performs no
/// ordering check against the key's previous sequence number, mirroring
/// the reuse path's looser contract in the system this was modeled on.
pub struct ValueRef {
    /// Index of the value block the referenced value lives in.
    pub vbidx: u32,
    /// Byte offset of the value within that block.
    pub vboff: u32,
    /// Length of the value once decompressed.
    pub vlen: u32,
    /// On-media length if the referenced value is stored compressed, or
    /// `0` if it is stored uncompressed.
    pub complen: u32,
}

/// A non-value commit — presently only a regular tombstone recorded
/// without going through [`Value`].
///
/// Kept as its own operation (rather than folded into `add_val`) for
/// callers that already know the entry is a tombstone and want to skip
/// the five-way `add_val` dispatch; it counts identically to
/// `add_val(Value::Tombstone)` — both increment the tombstone count and
/// the value count.
pub enum NonValKind {
    /// A regular (point) tombstone.
    Tomb,
}

/// Assembles one kvset's key-block and value-block streams.
pub struct KvsetBuilder {
    kbw: KeyBlockWriter,
    vbw: ValueBlockWriter,
    policy: KvsetPolicy,
    compressor: Option<Box<dyn CompressionAdapter>>,
    compress_scratch: Vec<u8>,
    capped: bool,
    value_group_id: u64,
    merge_stats: MergeStats,

    current_key: Option<Vec<u8>>,
    kmd_main: KmdBuffer,
    kmd_ptomb: KmdBuffer,
    stats: KeyStats,

    seqno_min: u64,
    seqno_max: u64,
    vused: u64,
    last_ptomb: Option<PrefixTombstoneTail>,
}

impl KvsetBuilder {
    /// Create a builder that allocates key blocks from `key_pool` and
    /// value blocks from `value_pool`.
    ///
    /// `capped` marks this kvset as one whose single largest prefix
    /// tombstone the owner's retention subsystem needs to know about
    /// without opening the kvset (see [`KvsetMblocks::last_ptomb`]).
    /// `compressor`, when present, is consulted for every out-of-line
    /// value committed through [`Self::add_val`].
    pub fn create(
        key_pool: Box<dyn MediaPool>,
        value_pool: Box<dyn MediaPool>,
        policy: KvsetPolicy,
        value_group_id: u64,
        capped: bool,
        compressor: Option<Box<dyn CompressionAdapter>>,
    ) -> Result<Self, KvsetError> {
        let kblock_target = policy.kblock_target_size;
        let vblock_target = policy.vblock_target_size;
        Ok(Self {
            kbw: KeyBlockWriter::new(key_pool, AgeGroup::Root, kblock_target),
            vbw: ValueBlockWriter::new(value_pool, AgeGroup::Root, vblock_target),
            policy,
            compressor,
            compress_scratch: Vec::new(),
            capped,
            value_group_id,
            merge_stats: MergeStats::default(),
            current_key: None,
            kmd_main: KmdBuffer::new(),
            kmd_ptomb: KmdBuffer::new(),
            stats: KeyStats::default(),
            seqno_min: u64::MAX,
            seqno_max: 0,
            vused: 0,
            last_ptomb: None,
        })
    }

    /// The value-group identifier this builder was created with.
    pub fn value_group_id(&self) -> u64 {
        self.value_group_id
    }

    /// Update the age-group bucket used for subsequent block allocations
    /// on both the key-block and value-block writers.
    pub fn set_agegroup(&mut self, age_group: AgeGroup) {
        self.kbw.set_agegroup(age_group);
        self.vbw.set_agegroup(age_group);
    }

    /// Attach owner-computed merge statistics to this builder; stored and
    /// returned verbatim, never interpreted by this crate.
    pub fn set_merge_stats(&mut self, stats: MergeStats) {
        self.merge_stats = stats;
    }

    /// The per-key counters accumulated so far for the key currently being
    /// built, not yet flushed into a key-block cell.
    #[cfg(test)]
    pub(crate) fn current_stats(&self) -> KeyStats {
        self.stats
    }

    /// Start committing versions of a new key.
    ///
    /// Flushes the previous key's accumulated KMD records into the
    /// key-block writer, if any were committed.
    pub fn add_key(&mut self, key: &[u8]) -> Result<(), KvsetError> {
        if key.is_empty() || key.len() as u32 > self.policy.klen_max {
            return Err(KvsetError::InvalidKey(format!(
                "key length {} out of bounds (1..={})",
                key.len(),
                self.policy.klen_max
            )));
        }
        if let Some(prev_key) = self.current_key.take() {
            self.commit_current_key(prev_key)?;
        }
        self.current_key = Some(key.to_vec());
        self.stats.reset();
        trace!(key_len = key.len(), "started new key");
        Ok(())
    }

    /// Commit a value for the current key at sequence number `seq`.
    ///
    /// Except for [`Value::PrefixTombstone`] (which has its own
    /// sequence-number lineage), `seq` must be strictly less than the
    /// previous sequence number committed for this key.
    pub fn add_val(
        &mut self,
        seq: u64,
        value: Value<'_>,
        hint: Option<VblockHint>,
    ) -> Result<(), KvsetError> {
        self.require_current_key()?;
        match value {
            Value::Tombstone => {
                self.check_seqno_main(seq)?;
                self.kmd_main.append(&KmdRecord::Tomb { seq })?;
                self.stats.ntombs += 1;
                self.stats.nvals += 1;
                self.commit_main_seqno(seq);
            }
            Value::PrefixTombstone => {
                self.check_seqno_ptomb(seq)?;
                self.kmd_ptomb.append(&KmdRecord::Ptomb { seq })?;
                self.stats.nptombs += 1;
                self.stats.seqno_prev_ptomb = seq;
                self.seqno_track(seq);
                self.record_capped_ptomb(seq);
            }
            Value::Zero => {
                self.check_seqno_main(seq)?;
                self.kmd_main.append(&KmdRecord::Zval { seq })?;
                self.stats.nvals += 1;
                self.commit_main_seqno(seq);
            }
            Value::Raw(bytes) => {
                self.check_seqno_main(seq)?;
                self.check_vlen(bytes.len() as u32)?;
                if bytes.len() as u32 <= self.policy.small_value_threshold {
                    if hint.is_some() {
                        return Err(KvsetError::Bug(
                            "inline-vblock-hint supplied for a small (inlined) value".into(),
                        ));
                    }
                    self.kmd_main.append(&KmdRecord::Ival {
                        seq,
                        value: bytes.to_vec(),
                    })?;
                    self.stats.tot_vlen += bytes.len() as u64;
                    self.stats.c0_vlen += bytes.len() as u64;
                } else if let Some(hint) = hint {
                    self.kmd_main.append(&KmdRecord::Val {
                        seq,
                        vbidx: hint.block_index,
                        vboff: hint.offset,
                        vlen: bytes.len() as u32,
                    })?;
                    self.stats.tot_vlen += bytes.len() as u64;
                    self.stats.c1_vlen += bytes.len() as u64;
                } else {
                    self.commit_out_of_line(seq, bytes)?;
                }
                self.stats.nvals += 1;
                self.commit_main_seqno(seq);
            }
            Value::PreCompressed {
                bytes,
                uncompressed_len,
            } => {
                self.check_seqno_main(seq)?;
                self.check_vlen(uncompressed_len)?;
                if hint.is_some() {
                    return Err(KvsetError::Bug(
                        "inline-vblock-hint supplied alongside a pre-compressed value".into(),
                    ));
                }
                let (vbidx, vboff) = self.vbw.add_entry(bytes)?;
                self.kmd_main.append(&KmdRecord::Cval {
                    seq,
                    vbidx,
                    vboff,
                    complen: bytes.len() as u32,
                    vlen: uncompressed_len,
                })?;
                self.vused += bytes.len() as u64;
                self.stats.tot_vlen += uncompressed_len as u64;
                self.stats.c0_vlen += uncompressed_len as u64;
                self.stats.nvals += 1;
                self.commit_main_seqno(seq);
            }
        }
        Ok(())
    }

    /// Commit a reference to a value that already exists elsewhere (for
    /// example in an upstream value block this kvset is extending),
    /// without writing new value bytes.
    ///
    /// Performs no ordering check against the key's previous sequence
    /// number.
    pub fn add_vref(&mut self, seq: u64, vref: ValueRef) -> Result<(), KvsetError> {
        self.require_current_key()?;
        let om_len = if vref.complen > 0 { vref.complen } else { vref.vlen };
        if vref.complen > 0 {
            self.kmd_main.append(&KmdRecord::Cval {
                seq,
                vbidx: vref.vbidx,
                vboff: vref.vboff,
                complen: vref.complen,
                vlen: vref.vlen,
            })?;
        } else {
            self.kmd_main.append(&KmdRecord::Val {
                seq,
                vbidx: vref.vbidx,
                vboff: vref.vboff,
                vlen: vref.vlen,
            })?;
        }
        self.vused += om_len as u64;
        self.stats.nvals += 1;
        self.stats.tot_vlen += om_len as u64;
        self.stats.c1_vlen += om_len as u64;
        self.stats.seqno_prev = seq;
        self.seqno_track(seq);
        Ok(())
    }

    /// Commit a non-value record for the current key.
    pub fn add_nonval(&mut self, seq: u64, kind: NonValKind) -> Result<(), KvsetError> {
        self.require_current_key()?;
        match kind {
            NonValKind::Tomb => {
                self.check_seqno_main(seq)?;
                self.kmd_main.append(&KmdRecord::Tomb { seq })?;
                self.stats.ntombs += 1;
                self.stats.nvals += 1;
                self.commit_main_seqno(seq);
            }
        }
        Ok(())
    }

    /// Finish the current key (if any), the key-block writer, and the
    /// value-block writer, and return the assembled output.
    ///
    /// Consumes the builder: there is nothing left to commit to
    /// afterward.
    pub fn get_mblocks(mut self) -> Result<KvsetMblocks, KvsetError> {
        if let Some(key) = self.current_key.take() {
            self.commit_current_key(key)?;
        }
        let seqno_min = if self.seqno_min == u64::MAX {
            0
        } else {
            self.seqno_min
        };
        let seqno_max = self.seqno_max;

        let kblks = self.kbw.finish(seqno_min, seqno_max)?;
        let vblks = if kblks.is_empty() {
            // Every key committed dropped out entirely (for example, every
            // key was all-tombstones under a drop-tomb policy): there is
            // nothing for the value blocks to support. Destroy the
            // value-block writer unfinished rather than flushing an
            // orphaned stream — its `Drop` impl aborts whatever it had
            // written.
            drop(self.vbw);
            Vec::new()
        } else {
            self.vbw.finish()?
        };

        info!(
            kblks = kblks.len(),
            vblks = vblks.len(),
            vused = self.vused,
            seqno_min,
            seqno_max,
            "kvset builder finished"
        );

        Ok(KvsetMblocks {
            kblks,
            vblks,
            vused: self.vused,
            seqno_min,
            seqno_max,
            last_ptomb: self.last_ptomb,
        })
    }

    /// Merge `src`'s value-block stream into this builder's, for
    /// combining two independently-built value streams — for example two
    /// parallel spill workers that each accumulated part of the same
    /// kvset's out-of-line values.
    ///
    /// Finishes `src`'s value-block writer and appends its blocks onto
    /// this builder's in-progress list. `src`'s key-block writer is
    /// dropped unfinished: this operation assumes `src` was used purely
    /// as a value accumulator and never committed any keys of its own
    /// (any keys it did commit are discarded, matching the "destroy
    /// releases provisional blocks" contract of an unfinished writer).
    ///
    /// Returns the base index new `(block_index, offset)` pairs recorded
    /// against `src` must be translated by.
    pub fn merge_vblocks(&mut self, mut src: KvsetBuilder) -> Result<u32, KvsetError> {
        if let Some(key) = src.current_key.take() {
            src.commit_current_key(key)?;
        }
        let src_blocks = src.vbw.finish()?;
        let base = self.vbw.append_finished(src_blocks);
        self.vused += src.vused;
        self.seqno_min = self.seqno_min.min(src.seqno_min);
        self.seqno_max = self.seqno_max.max(src.seqno_max);
        info!(base_index = base, "merged value blocks from another builder");
        Ok(base)
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    fn require_current_key(&self) -> Result<(), KvsetError> {
        if self.current_key.is_none() {
            return Err(KvsetError::Bug(
                "value commit with no active key (call add_key first)".into(),
            ));
        }
        Ok(())
    }

    fn check_vlen(&self, len: u32) -> Result<(), KvsetError> {
        if len > self.policy.vlen_max {
            return Err(KvsetError::ValueTooLarge {
                len,
                max: self.policy.vlen_max,
            });
        }
        Ok(())
    }

    fn check_seqno_main(&self, seq: u64) -> Result<(), KvsetError> {
        if self.stats.seqno_prev != u64::MAX && seq > self.stats.seqno_prev {
            return Err(KvsetError::SeqnoOrder {
                seq,
                prev: self.stats.seqno_prev,
            });
        }
        Ok(())
    }

    fn check_seqno_ptomb(&self, seq: u64) -> Result<(), KvsetError> {
        if self.stats.seqno_prev_ptomb != u64::MAX && seq > self.stats.seqno_prev_ptomb {
            return Err(KvsetError::SeqnoOrder {
                seq,
                prev: self.stats.seqno_prev_ptomb,
            });
        }
        Ok(())
    }

    fn commit_main_seqno(&mut self, seq: u64) {
        debug_assert!(self.stats.seqno_prev == u64::MAX || seq <= self.stats.seqno_prev);
        self.stats.seqno_prev = seq;
        self.seqno_track(seq);
    }

    fn seqno_track(&mut self, seq: u64) {
        self.seqno_min = self.seqno_min.min(seq);
        self.seqno_max = self.seqno_max.max(seq);
    }

    fn record_capped_ptomb(&mut self, seq: u64) {
        if !self.capped {
            return;
        }
        let replace = match &self.last_ptomb {
            None => true,
            Some(prev) => seq > prev.seq,
        };
        if replace {
            // `current_key` is always `Some` here: this is only reached
            // from `add_val`, which requires an active key.
            if let Some(key) = &self.current_key {
                self.last_ptomb = Some(PrefixTombstoneTail {
                    key: key.clone(),
                    seq,
                });
            }
        }
    }

    fn commit_out_of_line(&mut self, seq: u64, bytes: &[u8]) -> Result<(), KvsetError> {
        let compressed = if self.policy.compression_enabled {
            self.try_compress(bytes)
        } else {
            None
        };

        if let Some(complen) = compressed {
            let (vbidx, vboff) = self.vbw.add_entry(&self.compress_scratch[..complen])?;
            self.kmd_main.append(&KmdRecord::Cval {
                seq,
                vbidx,
                vboff,
                complen: complen as u32,
                vlen: bytes.len() as u32,
            })?;
            self.vused += complen as u64;
        } else {
            let (vbidx, vboff) = self.vbw.add_entry(bytes)?;
            self.kmd_main.append(&KmdRecord::Val {
                seq,
                vbidx,
                vboff,
                vlen: bytes.len() as u32,
            })?;
            self.vused += bytes.len() as u64;
        }
        self.stats.tot_vlen += bytes.len() as u64;
        self.stats.c0_vlen += bytes.len() as u64;
        Ok(())
    }

    /// Returns `Some(complen)` if compression was attempted and the result
    /// fits within `VLEN_MAX`, discarding the result (falling back to
    /// uncompressed storage) otherwise. Aggressiveness of the estimator is
    /// a policy tuning knob, not a worth-it rule enforced here: a
    /// same-size or barely-smaller compressed result is still accepted as
    /// long as the estimator judged it worth attempting.
    fn try_compress(&mut self, bytes: &[u8]) -> Option<usize> {
        let compressor = self.compressor.as_mut()?;
        if compressor.estimate(bytes) == 0 {
            return None;
        }
        match compressor.compress(bytes, &mut self.compress_scratch) {
            Ok(n) if (n as u32) <= self.policy.vlen_max => Some(n),
            _ => None,
        }
    }

    fn commit_current_key(&mut self, key: Vec<u8>) -> Result<(), KvsetError> {
        if !self.kmd_ptomb.is_empty() {
            self.kbw.add_ptomb(&key, self.kmd_ptomb.as_slice(), &self.stats)?;
        }
        if !self.kmd_main.is_empty() {
            self.kbw.add_entry(&key, self.kmd_main.as_slice(), &self.stats)?;
        }
        self.kmd_main.clear();
        self.kmd_ptomb.clear();
        Ok(())
    }
}
