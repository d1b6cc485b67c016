//! # betree: a write-optimized, block-backed key-value index
//!
//! `betree` implements a persistent Bε-tree: a search tree whose interior
//! nodes buffer update messages next to their pivots, amortizing the cost
//! of pushing updates to leaves against whole batches instead of paying one
//! page write per update.
//!
//! ## Quick Start
//!
//! ```ignore
//! use betree::BeTree;
//!
//! let mut tree = BeTree::open("./data/orders")?;
//! tree.insert(42, 4200)?;
//! assert_eq!(tree.query(42)?, 4200);
//! tree.update(42, 4300)?;
//! tree.delete(42)?;
//! assert_eq!(tree.query(42)?, betree::KEY_NOT_FOUND);
//! tree.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Public API (BeTree)          │
//! ├──────────────────────────────────────────┤
//! │  Bε-tree: upsert buffers, pivot routing,  │
//! │  flush cascade, splits, root overflow     │
//! ├──────────────────────────────────────────┤
//! │  Block manager: M page buffers, LRU       │
//! │  residency, write-back on eviction        │
//! ├──────────────────────────────────────────┤
//! │  One file per page + `meta` file on disk  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Keys and values are fixed 32-bit unsigned integers; keys `0` and
//! `u32::MAX` are reserved (the latter is [`KEY_NOT_FOUND`]). Every node
//! occupies exactly one 4 KiB page, laid out little-endian and accessed
//! zero-copy in place.
//!
//! ## Semantics
//!
//! Mutations are *messages*: `insert` of a present key or `update`/`delete`
//! of an absent one is a logical error, but it surfaces only once the
//! message reaches its leaf, possibly many operations later. Queries see
//! buffered messages immediately; a tombstone in an interior buffer shadows
//! the leaf value below it.
//!
//! The tree is single-threaded and synchronous. All errors (logical
//! precondition violations, I/O failures, invariant violations) are fatal:
//! they propagate as [`eyre::Result`] errors and leave no recovery path.
//!
//! ## Module Overview
//!
//! - [`config`]: size parameters derived from the page size
//! - [`storage`]: LRU page index, block manager, on-disk metadata
//! - [`tree`]: node layouts and the tree operations themselves

pub mod config;
pub mod storage;
pub mod tree;

pub use tree::{BeTree, TreeStats, KEY_NOT_FOUND};
