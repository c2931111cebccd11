//! # kvset-builder
//!
//! Assembles one immutable, on-media kvset: the sorted key/value set a
//! flush or compaction path writes out as the unit of work for a
//! log-structured storage engine. A kvset is built once, written
//! forward-only, and never mutated again — callers drive the builder
//! through a fixed key-then-values protocol and get back the block lists
//! a higher-level component (ingest, compaction, manifest) then owns.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        KvsetBuilder (A)                        │
//! │  add_key / add_val / add_vref / add_nonval → get_mblocks        │
//! │                                                                  │
//! │   ┌───────────────┐      ┌────────────────┐    ┌─────────────┐ │
//! │   │ KmdBuffer (B)  │      │ KeyBlockWriter │    │ Compression│ │
//! │   │ per-key KMD    │ ───▶ │      (C)       │    │ Adapter (E) │ │
//! │   │ record stream  │      │  cells → media │    │  estimate / │ │
//! │   └───────────────┘      │      pool      │    │  compress   │ │
//! │                          └────────────────┘    └──────┬──────┘ │
//! │                                                        │        │
//! │                          ┌────────────────┐            │        │
//! │                          │ ValueBlockWriter◄───────────┘        │
//! │                          │      (D)       │                     │
//! │                          │  out-of-line   │                     │
//! │                          │ value packing  │                     │
//! │                          └────────────────┘                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`kvset::builder`] | Public façade driving one kvset's construction |
//! | [`kvset::kmd`] | Per-key metadata record accumulator |
//! | [`kvset::kblock`] | Key-block writer — ordered key cells plus KMD |
//! | [`kvset::vblock`] | Value-block writer — packed out-of-line value bytes |
//! | [`kvset::compress`] | Pluggable compression adapter with a worth-it estimate |
//! | [`kvset::media_pool`] | Block allocation/write seam the writers target |
//! | [`encoding`] | Zero-dependency `Encode`/`Decode` traits for on-media records |
//!
//! ## Key Features
//!
//! - **Strict per-key ordering** — sequence numbers within a key must
//!   arrive in descending order; the builder rejects anything else.
//! - **Five value-encoding cases** — tombstone, prefix tombstone,
//!   zero-length, inlined-small, and out-of-line (optionally compressed)
//!   values, modeled as a closed enum rather than sentinel pointers.
//! - **Worth-it compression** — a cheap sample-based estimate decides
//!   whether to attempt compression at all; a result no smaller than the
//!   input is discarded in favor of raw storage.
//! - **Pluggable media pool** — block allocation and write-out are a
//!   trait seam; this crate ships an in-memory pool for tests and a
//!   simple file-backed one, but owns neither allocation policy.
//! - **Drop-based cleanup** — dropping a builder before [`KvsetBuilder::get_mblocks`]
//!   releases every block it had written so far, with no explicit
//!   destroy call required.
//! - **Value-stream merging** — [`KvsetBuilder::merge_vblocks`] splices
//!   two independently-built value streams together, for combining
//!   parallel spill workers.
//!
//! ## Quick Start
//!
//! ```rust
//! use kvset_builder::kvset::builder::{KvsetBuilder, Value};
//! use kvset_builder::kvset::{FileMediaPool, KvsetPolicy, MediaPool};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let key_pool: Box<dyn MediaPool> =
//!     Box::new(FileMediaPool::new(dir.path().join("kblocks")).unwrap());
//! let value_pool: Box<dyn MediaPool> =
//!     Box::new(FileMediaPool::new(dir.path().join("vblocks")).unwrap());
//! let mut builder = KvsetBuilder::create(
//!     key_pool,
//!     value_pool,
//!     KvsetPolicy::default(),
//!     1,
//!     false,
//!     None,
//! )
//! .unwrap();
//!
//! builder.add_key(b"hello").unwrap();
//! builder.add_val(1, Value::Raw(b"world"), None).unwrap();
//!
//! let mblocks = builder.get_mblocks().unwrap();
//! assert_eq!(mblocks.kblks.len(), 1);
//! ```

pub mod encoding;
pub mod kvset;
