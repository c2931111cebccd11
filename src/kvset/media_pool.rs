//! Media-block namespace: the owner-provided collaborator that the
//! key-block and value-block writers allocate, write, and abort blocks
//! through.
//!
//! Allocation of the underlying media-block namespace is explicitly out of
//! scope for this crate — it belongs to the surrounding storage engine,
//! which knows about media classes, space accounting, and physical
//! layout. [`MediaPool`] is the seam: writers only ever go through it.
//! [`FileMediaPool`] is a concrete, directory-backed implementation
//! provided so the crate is usable standalone (tests, benches, demos)
//! without requiring a full engine.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

use super::{AgeGroup, BlockClass, BlockId};

/// Errors produced by a [`MediaPool`] implementation.
#[derive(Debug, Error)]
pub enum MediaPoolError {
    /// The pool has no room left to allocate another block.
    #[error("media pool exhausted")]
    Exhausted,

    /// An I/O error occurred while writing or removing a block.
    #[error("media pool I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller referenced a block identifier the pool does not know
    /// about.
    #[error("unknown block id: {0}")]
    UnknownBlock(BlockId),
}

/// Allocates, writes, and releases blocks in the owner's media-block
/// namespace.
///
/// Implementations decide how identifiers are minted and where bytes
/// physically land; this crate never inspects a [`BlockId`]'s bits.
pub trait MediaPool: Send {
    /// Reserve a new block identifier for the given class and age group.
    /// The block holds no data until [`MediaPool::write`] is called.
    fn alloc(&mut self, class: BlockClass, age_group: AgeGroup) -> Result<BlockId, MediaPoolError>;

    /// Write the complete contents of `bytes` to `id`.
    ///
    /// A block is written exactly once; writers never append to an
    /// already-written block.
    fn write(&mut self, id: BlockId, bytes: &[u8]) -> Result<(), MediaPoolError>;

    /// Release a block that was allocated (and possibly written) but
    /// should not be part of the kvset's final output — for example
    /// because the builder was dropped before finishing.
    fn abort(&mut self, id: BlockId) -> Result<(), MediaPoolError>;
}

/// A [`MediaPool`] that stores each block as its own file inside a
/// directory.
///
/// Writes go to a temporary file which is synced and atomically renamed
/// into place, following this codebase's usual atomic-write pattern for
/// on-disk artifacts.
pub struct FileMediaPool {
    dir: PathBuf,
    next_id: u64,
}

impl FileMediaPool {
    /// Open (creating if necessary) a directory to hold allocated blocks.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MediaPoolError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next_id: 1 })
    }

    fn path_for(&self, id: BlockId) -> PathBuf {
        self.dir.join(format!("{:016x}.blk", id.0))
    }
}

impl MediaPool for FileMediaPool {
    fn alloc(&mut self, class: BlockClass, age_group: AgeGroup) -> Result<BlockId, MediaPoolError> {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        trace!(?class, ?age_group, %id, "allocated block");
        Ok(id)
    }

    fn write(&mut self, id: BlockId, bytes: &[u8]) -> Result<(), MediaPoolError> {
        let final_path = self.path_for(id);
        let tmp_path = final_path.with_extension("blk.tmp");
        write_atomic(&tmp_path, &final_path, bytes)?;
        debug!(%id, len = bytes.len(), "wrote block");
        Ok(())
    }

    fn abort(&mut self, id: BlockId) -> Result<(), MediaPoolError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%id, "aborted block");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Never written — allocation-only abort is a no-op.
                Ok(())
            }
            Err(e) => Err(MediaPoolError::Io(e)),
        }
    }
}

fn write_atomic(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut file: File = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp_path, final_path)?;
    Ok(())
}

/// An in-memory [`MediaPool`], useful for unit tests that don't need
/// real files.
#[cfg(test)]
pub(crate) struct MemMediaPool {
    blocks: std::collections::HashMap<BlockId, Vec<u8>>,
    next_id: u64,
}

#[cfg(test)]
impl MemMediaPool {
    pub(crate) fn new() -> Self {
        Self {
            blocks: std::collections::HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn get(&self, id: BlockId) -> Option<&[u8]> {
        self.blocks.get(&id).map(Vec::as_slice)
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
impl MediaPool for MemMediaPool {
    fn alloc(&mut self, _class: BlockClass, _age_group: AgeGroup) -> Result<BlockId, MediaPoolError> {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    fn write(&mut self, id: BlockId, bytes: &[u8]) -> Result<(), MediaPoolError> {
        self.blocks.insert(id, bytes.to_vec());
        Ok(())
    }

    fn abort(&mut self, id: BlockId) -> Result<(), MediaPoolError> {
        self.blocks.remove(&id);
        Ok(())
    }
}
