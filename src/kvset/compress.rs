//! Compression adapter (component E): a cheap worth-it estimate followed
//! by an actual compression pass for out-of-line values, with the result
//! discarded whenever it doesn't actually help.
//!
//! The estimate step exists so the builder never pays the cost of
//! compressing data that's already dense (already-compressed blobs,
//! encrypted payloads, small or high-entropy values): [`estimate`] is a
//! fast heuristic over a sample of the input and never itself compresses
//! anything.

use thiserror::Error;

/// Errors produced by a [`CompressionAdapter`].
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The underlying codec failed to compress the input.
    #[error("compression failed: {0}")]
    Codec(String),
}

/// Adapts a concrete compression codec to the builder's two-step
/// protocol: a cheap `estimate`, and a real `compress` only attempted
/// when the estimate says it's worthwhile.
pub trait CompressionAdapter: Send {
    /// Returns an upper bound on the compressed size, or `0` if this
    /// value isn't worth attempting to compress at all.
    ///
    /// Must not allocate proportionally to `src`'s length beyond a small
    /// fixed sample — this is meant to be cheap enough to call on every
    /// out-of-line value.
    fn estimate(&self, src: &[u8]) -> usize;

    /// Compress `src` into `scratch`, growing `scratch` as needed, and
    /// return the number of bytes written.
    ///
    /// `scratch` is reused across calls; implementations should grow it
    /// in page-sized increments and only shrink it by replacing it
    /// outright (never realloc-in-place) so a failed grow leaves the
    /// caller's old buffer untouched.
    fn compress(&mut self, src: &[u8], scratch: &mut Vec<u8>) -> Result<usize, CompressionError>;
}

const PAGE_SIZE: usize = 4096;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// Grow `scratch` to at least `min_len` bytes, page-aligned, replacing it
/// wholesale rather than reallocating in place so a caller holding the
/// old buffer by reference is never left with a torn state if this
/// function is later extended to a fallible allocator.
fn grow_scratch(scratch: &mut Vec<u8>, min_len: usize) {
    if scratch.capacity() >= min_len {
        return;
    }
    let new_cap = align_up(min_len, PAGE_SIZE);
    let mut grown = Vec::with_capacity(new_cap);
    grown.resize(new_cap, 0);
    *scratch = grown;
}

/// Estimates compressibility by sampling the input and measuring how many
/// distinct byte values appear — a crude but cheap proxy for entropy.
/// Dense/high-entropy samples (already compressed data, random-looking
/// binary) are reported as not worth compressing.
fn sample_worth_compressing(src: &[u8]) -> bool {
    const SAMPLE_LEN: usize = 512;
    if src.len() < 32 {
        return false;
    }
    let sample = &src[..src.len().min(SAMPLE_LEN)];
    let mut seen = [false; 256];
    let mut distinct = 0usize;
    for &b in sample {
        if !seen[b as usize] {
            seen[b as usize] = true;
            distinct += 1;
        }
    }
    // A near-uniform byte distribution (close to 256 distinct values in a
    // small sample) indicates high entropy; skip compressing it.
    let distinct_ratio = distinct as f64 / sample.len().min(256) as f64;
    distinct_ratio < 0.9
}

/// An [`CompressionAdapter`] backed by LZ4 block compression.
pub struct Lz4Adapter;

impl Lz4Adapter {
    /// Construct a new adapter. Stateless — provided as a constructor for
    /// symmetry with adapters that do carry state (e.g. a dictionary).
    pub fn new() -> Self {
        Self
    }
}

impl Default for Lz4Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for Lz4Adapter {
    fn estimate(&self, src: &[u8]) -> usize {
        if !sample_worth_compressing(src) {
            return 0;
        }
        lz4_flex::block::get_maximum_output_size(src.len())
    }

    fn compress(&mut self, src: &[u8], scratch: &mut Vec<u8>) -> Result<usize, CompressionError> {
        let bound = lz4_flex::block::get_maximum_output_size(src.len());
        grow_scratch(scratch, bound);
        lz4_flex::block::compress_into(src, scratch)
            .map_err(|e| CompressionError::Codec(e.to_string()))
    }
}

/// A [`CompressionAdapter`] that never considers anything worth
/// compressing, for callers running with compression disabled.
pub struct NullAdapter;

impl CompressionAdapter for NullAdapter {
    fn estimate(&self, _src: &[u8]) -> usize {
        0
    }

    fn compress(&mut self, _src: &[u8], _scratch: &mut Vec<u8>) -> Result<usize, CompressionError> {
        Err(CompressionError::Codec(
            "compress called on NullAdapter after estimate returned 0".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_adapter_always_estimates_zero() {
        let a = NullAdapter;
        assert_eq!(a.estimate(&vec![0u8; 1000]), 0);
    }

    #[test]
    fn repetitive_input_is_worth_compressing() {
        let a = Lz4Adapter::new();
        let data = vec![b'a'; 4096];
        assert!(a.estimate(&data) > 0);
    }

    #[test]
    fn compressing_repetitive_input_shrinks_it() {
        let mut a = Lz4Adapter::new();
        let data = vec![b'a'; 4096];
        let mut scratch = Vec::new();
        let n = a.compress(&data, &mut scratch).unwrap();
        assert!(n < data.len());
    }

    #[test]
    fn short_input_is_not_worth_compressing() {
        let a = Lz4Adapter::new();
        assert_eq!(a.estimate(b"hi"), 0);
    }

    #[test]
    fn high_entropy_sample_is_skipped() {
        let a = Lz4Adapter::new();
        // Fabricate a high-entropy sample: every byte value, several times.
        let mut data = Vec::new();
        for _ in 0..8 {
            data.extend(0u8..=255);
        }
        assert_eq!(a.estimate(&data), 0);
    }

    #[test]
    fn grow_scratch_is_page_aligned_and_preserves_nothing_but_capacity() {
        let mut scratch = Vec::new();
        grow_scratch(&mut scratch, 10);
        assert_eq!(scratch.capacity() % PAGE_SIZE, 0);
        assert!(scratch.capacity() >= 10);
    }
}
