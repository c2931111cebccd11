//! Value-Block Writer (component D): packs out-of-line value bytes into
//! checksummed, size-bounded blocks and hands back `(block_index,
//! offset)` addresses for the KMD accumulator to record.
//!
//! Unlike the key-block writer there is no ordering constraint on values
//! — they arrive in whatever order the builder façade commits them, and
//! are packed back-to-back purely for space efficiency.

use thiserror::Error;
use tracing::{debug, trace};

use super::media_pool::{MediaPool, MediaPoolError};
use super::{AgeGroup, BlockClass, BlockId, frame_block};

/// Errors produced by the value-block writer.
#[derive(Debug, Error)]
pub enum ValueBlockError {
    /// The underlying media pool rejected an allocation or write.
    #[error("media pool error: {0}")]
    MediaPool(#[from] MediaPoolError),
}

/// Accumulates out-of-line value bytes into flushed, checksummed value
/// blocks.
pub struct ValueBlockWriter {
    pool: Box<dyn MediaPool>,
    age_group: AgeGroup,
    target_size: usize,
    current: Vec<u8>,
    vblks: Vec<BlockId>,
    finished: bool,
}

impl ValueBlockWriter {
    /// Create a writer that allocates blocks from `pool`, targeting
    /// `target_size` bytes per flushed block.
    pub fn new(pool: Box<dyn MediaPool>, age_group: AgeGroup, target_size: usize) -> Self {
        Self {
            pool,
            age_group,
            target_size,
            current: Vec::new(),
            vblks: Vec::new(),
            finished: false,
        }
    }

    /// Update the age-group bucket used for subsequent block allocations.
    pub fn set_agegroup(&mut self, age_group: AgeGroup) {
        self.age_group = age_group;
    }

    /// Number of blocks flushed so far (the index the in-progress block
    /// will receive once it's flushed).
    pub fn block_count(&self) -> u32 {
        self.vblks.len() as u32
    }

    /// Append `bytes`, returning `(block_index, offset)` identifying
    /// where they landed within this writer's own block sequence.
    pub fn add_entry(&mut self, bytes: &[u8]) -> Result<(u32, u32), ValueBlockError> {
        if !self.current.is_empty() && self.current.len() + bytes.len() > self.target_size {
            self.flush_current()?;
        }
        let block_index = self.vblks.len() as u32;
        let offset = self.current.len() as u32;
        self.current.extend_from_slice(bytes);
        trace!(block_index, offset, len = bytes.len(), "committed value");

        if self.current.len() >= self.target_size {
            self.flush_current()?;
        }
        Ok((block_index, offset))
    }

    fn flush_current(&mut self) -> Result<(), ValueBlockError> {
        if self.current.is_empty() {
            return Ok(());
        }
        let id = self.pool.alloc(BlockClass::Value, self.age_group)?;
        let framed = frame_block(&self.current);
        self.pool.write(id, &framed)?;
        self.current.clear();
        debug!(%id, "flushed value block");
        self.vblks.push(id);
        Ok(())
    }

    /// Flush any remaining bytes and return the ordered block list.
    pub fn finish(mut self) -> Result<Vec<BlockId>, ValueBlockError> {
        self.flush_current()?;
        self.finished = true;
        debug!(blocks = self.vblks.len(), "value-block writer finished");
        Ok(std::mem::take(&mut self.vblks))
    }

    /// Append an already-finished block list (typically obtained by
    /// calling [`Self::finish`] on another writer) onto this writer's own
    /// in-progress list.
    ///
    /// Returns the index at which the appended blocks now begin — callers
    /// that recorded `(block_index, offset)` pairs against the source
    /// writer must add this value to `block_index` to translate them into
    /// this writer's addressing space.
    pub fn append_finished(&mut self, blocks: Vec<BlockId>) -> u32 {
        let base_index = self.vblks.len() as u32;
        self.vblks.extend(blocks);
        base_index
    }

    /// Splice `src`'s finished block list onto the end of `dst`'s, for
    /// combining two independently-built value streams (for example, two
    /// parallel spill workers each producing part of the same kvset).
    ///
    /// Returns the index at which `src`'s blocks now begin within the
    /// merged sequence — callers that recorded `(block_index, offset)`
    /// pairs against `src` must add this value to `block_index` to
    /// translate them into the merged addressing space.
    pub fn blk_list_merge(dst: &mut Vec<BlockId>, src: Vec<BlockId>) -> u32 {
        let base_index = dst.len() as u32;
        dst.extend(src);
        base_index
    }
}

impl Drop for ValueBlockWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for id in self.vblks.drain(..) {
            let _ = self.pool.abort(id);
        }
    }
}
