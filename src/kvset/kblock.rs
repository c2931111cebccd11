//! Key-Block Writer (component C): packs committed keys and their KMD
//! bytes into checksummed, size-bounded blocks in strictly ascending key
//! order.
//!
//! Cell layout: `[kind: u8][key_len: u32][key][stats: 36 bytes][kmd_len:
//! u32][kmd bytes]`, where `kind` distinguishes a prefix-tombstone cell
//! from a regular entry cell and `stats` is the caller's per-key counters
//! at commit time (`nvals`, `ntombs`, `nptombs`, `tot_vlen`, `c0_vlen`,
//! `c1_vlen`), carried alongside the KMD bytes rather than folded into
//! them. Cells accumulate in an in-progress block buffer that's flushed
//! as one checksummed frame (see [`super::frame_block`]) once it reaches
//! the configured target size — the same size-triggered framing this
//! codebase's SSTable writer uses for its data blocks.

use thiserror::Error;
use tracing::{debug, trace};

use super::kmd::KeyStats;
use super::media_pool::{MediaPool, MediaPoolError};
use super::{AgeGroup, BlockClass, BlockId, frame_block};

/// Errors produced by the key-block writer.
#[derive(Debug, Error)]
pub enum KeyBlockError {
    /// A key was committed out of the required ascending order.
    #[error("key out of order: {new:?} is not greater than previous key {prev:?}")]
    OutOfOrder {
        /// The key the caller attempted to commit.
        new: Vec<u8>,
        /// The most recently committed key.
        prev: Vec<u8>,
    },

    /// An entry was committed for a key whose only preceding cell in this
    /// block was not its prefix tombstone.
    #[error("entry for {0:?} must immediately follow its prefix tombstone, if any")]
    PtombEntryMismatch(Vec<u8>),

    /// The underlying media pool rejected an allocation or write.
    #[error("media pool error: {0}")]
    MediaPool(#[from] MediaPoolError),
}

const CELL_KIND_ENTRY: u8 = 0;
const CELL_KIND_PTOMB: u8 = 1;

/// Accumulates committed keys into flushed, checksummed key blocks.
pub struct KeyBlockWriter {
    pool: Box<dyn MediaPool>,
    age_group: AgeGroup,
    target_size: usize,
    current: Vec<u8>,
    kblks: Vec<BlockId>,
    last_key: Option<Vec<u8>>,
    last_was_ptomb: bool,
    finished: bool,
}

impl KeyBlockWriter {
    /// Create a writer that allocates blocks from `pool`, targeting
    /// `target_size` bytes per flushed block.
    pub fn new(pool: Box<dyn MediaPool>, age_group: AgeGroup, target_size: usize) -> Self {
        Self {
            pool,
            age_group,
            target_size,
            current: Vec::new(),
            kblks: Vec::new(),
            last_key: None,
            last_was_ptomb: false,
            finished: false,
        }
    }

    /// Update the age-group bucket used for subsequent block allocations.
    pub fn set_agegroup(&mut self, age_group: AgeGroup) {
        self.age_group = age_group;
    }

    /// Commit a prefix tombstone for `key`, carrying its KMD bytes and the
    /// per-key stats accumulated for it.
    ///
    /// Must be called before [`Self::add_entry`] for the same key, if
    /// both are committed.
    pub fn add_ptomb(&mut self, key: &[u8], kmd: &[u8], stats: &KeyStats) -> Result<(), KeyBlockError> {
        self.check_order(key, true)?;
        self.push_cell(CELL_KIND_PTOMB, key, kmd, stats)?;
        self.last_key = Some(key.to_vec());
        self.last_was_ptomb = true;
        Ok(())
    }

    /// Commit a regular entry for `key`, carrying its KMD bytes and the
    /// per-key stats accumulated for it.
    pub fn add_entry(&mut self, key: &[u8], kmd: &[u8], stats: &KeyStats) -> Result<(), KeyBlockError> {
        self.check_order(key, false)?;
        self.push_cell(CELL_KIND_ENTRY, key, kmd, stats)?;
        self.last_key = Some(key.to_vec());
        self.last_was_ptomb = false;
        Ok(())
    }

    fn check_order(&self, key: &[u8], is_ptomb: bool) -> Result<(), KeyBlockError> {
        let Some(prev) = &self.last_key else {
            return Ok(());
        };
        match key.cmp(prev.as_slice()) {
            std::cmp::Ordering::Greater => Ok(()),
            std::cmp::Ordering::Equal if !is_ptomb && self.last_was_ptomb => Ok(()),
            _ => Err(KeyBlockError::OutOfOrder {
                new: key.to_vec(),
                prev: prev.clone(),
            }),
        }
    }

    fn push_cell(&mut self, kind: u8, key: &[u8], kmd: &[u8], stats: &KeyStats) -> Result<(), KeyBlockError> {
        self.current.push(kind);
        self.current
            .extend_from_slice(&(key.len() as u32).to_le_bytes());
        self.current.extend_from_slice(key);
        self.current.extend_from_slice(&stats.nvals.to_le_bytes());
        self.current.extend_from_slice(&stats.ntombs.to_le_bytes());
        self.current.extend_from_slice(&stats.nptombs.to_le_bytes());
        self.current.extend_from_slice(&stats.tot_vlen.to_le_bytes());
        self.current.extend_from_slice(&stats.c0_vlen.to_le_bytes());
        self.current.extend_from_slice(&stats.c1_vlen.to_le_bytes());
        self.current
            .extend_from_slice(&(kmd.len() as u32).to_le_bytes());
        self.current.extend_from_slice(kmd);
        trace!(key_len = key.len(), kmd_len = kmd.len(), "committed cell");

        if self.current.len() >= self.target_size {
            self.flush_current()?;
        }
        Ok(())
    }

    fn flush_current(&mut self) -> Result<(), KeyBlockError> {
        if self.current.is_empty() {
            return Ok(());
        }
        let id = self.pool.alloc(BlockClass::Key, self.age_group)?;
        let framed = frame_block(&self.current);
        self.pool.write(id, &framed)?;
        self.current.clear();
        debug!(%id, "flushed key block");
        self.kblks.push(id);
        Ok(())
    }

    /// Flush any remaining cells, write a trailing frame recording
    /// `(seqno_min, seqno_max)`, and return the ordered block list.
    ///
    /// May return zero blocks if no keys were ever committed.
    pub fn finish(mut self, seqno_min: u64, seqno_max: u64) -> Result<Vec<BlockId>, KeyBlockError> {
        self.flush_current()?;
        if !self.kblks.is_empty() {
            let mut trailer = Vec::with_capacity(16);
            trailer.extend_from_slice(&seqno_min.to_le_bytes());
            trailer.extend_from_slice(&seqno_max.to_le_bytes());
            let id = self.pool.alloc(BlockClass::Key, self.age_group)?;
            self.pool.write(id, &frame_block(&trailer))?;
            self.kblks.push(id);
        }
        self.finished = true;
        debug!(blocks = self.kblks.len(), "key-block writer finished");
        Ok(std::mem::take(&mut self.kblks))
    }
}

impl Drop for KeyBlockWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for id in self.kblks.drain(..) {
            let _ = self.pool.abort(id);
        }
    }
}
