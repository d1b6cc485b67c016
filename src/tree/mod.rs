//! # Bε-tree Index
//!
//! A write-optimized search tree over fixed-size pages. Interior nodes
//! buffer update messages next to their pivot array; leaves hold the live
//! key/value pairs. Updates land in the root buffer in O(1) and trickle
//! down in batches, amortizing each page write against many applied
//! updates; queries resolve against the newest buffered message on the
//! root-to-leaf path before ever reaching a leaf.
//!
//! ```text
//!                 [root: buffer | pivots]
//!                 /          |          \
//!     [interior: buf|piv]   ...         ...
//!        /        \
//!   [leaf: k/v]  [leaf: k/v]
//! ```
//!
//! ## Flushing
//!
//! When the root buffer fills, a full flush earmarks the messages bound for
//! the busiest child (the flush region), pushes them one level down, and
//! repeats greedily. A child too full to accept even the minimum batch is
//! drained first (descend), then refilled on the way back up (ascend),
//! propagating leaf and interior splits toward the root.
//!
//! ## Node Types
//!
//! - **Leaf** (`leaf`): counted parallel key/value arrays, unsorted between
//!   splits; message application with strict precondition checks.
//! - **Interior** (`interior`): upsert buffer + pivot block; flush-region
//!   bookkeeping and key routing.
//!
//! The tree itself (`tree`) orchestrates nodes strictly through the block
//! manager: every page access re-resolves id -> slot, so eviction can never
//! invalidate a held reference.

mod interior;
mod leaf;
mod tree;
mod upsert;

pub use interior::{InteriorNode, InteriorNodeMut};
pub use leaf::{LeafNode, LeafNodeMut};
pub use tree::{BeTree, TreeStats};
pub use upsert::{Upsert, UpsertKind, KEY_NOT_FOUND};
