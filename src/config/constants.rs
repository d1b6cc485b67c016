//! # Size Parameters
//!
//! This module centralizes every size parameter of the tree and its storage
//! substrate. All of them derive from the page size, and several depend on
//! each other; constants that must agree are co-located and pinned with
//! compile-time assertions so a change to one cannot silently invalidate
//! another.
//!
//! ## Derivation
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (8 bytes: parent id + leaf flag)
//!       │
//!       ├─> PIVOT_BLOCK_SIZE (128 bytes)
//!       │         │
//!       │         ├─> MAX_PIVOTS    = (128 - 4) / 8      = 15
//!       │         └─> MAX_CHILDREN  = MAX_PIVOTS + 1     = 16
//!       │
//!       ├─> MAX_UPSERTS   = (4096 - 8 - 128 - 8) / 16    = 247
//!       │         An interior node buffers this many pending messages.
//!       │
//!       └─> MAX_LEAF_PAIRS = (4096 - 8 - 4) / 8          = 510
//!                 A leaf holds this many key/value pairs.
//! ```
//!
//! ## Flush thresholds
//!
//! `INTERIOR_FLUSH_THRESHOLD` is the minimum batch a flush is allowed to
//! move into an interior child: one disk access is amortized against at
//! least this many applied updates. `LEAF_FLUSH_THRESHOLD` bounds a leaf
//! batch; because `MAX_UPSERTS < LEAF_FLUSH_THRESHOLD`, a leaf flush always
//! consumes the entire flush region in one step.
//!
//! ## Cache sizing
//!
//! `DEFAULT_CACHE_PAGES` bounds the resident working set. Every cross-page
//! step in the tree copies what it needs out of one page before opening the
//! next, so a single logical operation never requires two simultaneously
//! resident pages; the default of 16 keeps the whole root-to-leaf path of
//! any practically-sized tree (height up to roughly 14) cached across an
//! operation. `BeTree::open_with_cache` accepts other values, down to 2.

/// Size of one page/block, in bytes. One tree node occupies exactly one page.
pub const PAGE_SIZE: usize = 4096;

/// Pages resident in memory under the default cache configuration.
pub const DEFAULT_CACHE_PAGES: usize = 16;

/// Node header: parent id (4 bytes) + leaf flag (4 bytes), at page offset 0.
pub const NODE_HEADER_SIZE: usize = 8;

/// Bytes reserved at the tail of an interior page for the pivot block.
pub const PIVOT_BLOCK_SIZE: usize = 128;

/// Size of one buffered upsert message, in bytes.
pub const UPSERT_SIZE: usize = 16;

/// Maximum pivot keys per interior node.
pub const MAX_PIVOTS: usize = (PIVOT_BLOCK_SIZE - 4) / 8;

/// Maximum child pointers per interior node (always one more than pivots).
pub const MAX_CHILDREN: usize = MAX_PIVOTS + 1;

/// Maximum upsert messages buffered in an interior node.
pub const MAX_UPSERTS: usize =
    (PAGE_SIZE - NODE_HEADER_SIZE - PIVOT_BLOCK_SIZE - 8) / UPSERT_SIZE;

/// Maximum key/value pairs in a leaf node.
pub const MAX_LEAF_PAIRS: usize = (PAGE_SIZE - NODE_HEADER_SIZE - 4) / 8;

/// Minimum message batch an interior-to-interior flush may move.
pub const INTERIOR_FLUSH_THRESHOLD: usize = 11;

/// Maximum message batch an interior-to-leaf flush may move.
pub const LEAF_FLUSH_THRESHOLD: usize = 255;

const _: () = assert!(MAX_PIVOTS == 15);
const _: () = assert!(MAX_CHILDREN == 16);
const _: () = assert!(MAX_UPSERTS == 247);
const _: () = assert!(MAX_LEAF_PAIRS == 510);

const _: () = assert!(
    INTERIOR_FLUSH_THRESHOLD <= MAX_UPSERTS,
    "an interior flush batch must fit in a child buffer"
);

const _: () = assert!(
    MAX_UPSERTS < LEAF_FLUSH_THRESHOLD,
    "a flush region must never exceed one leaf batch"
);

// A leaf split leaves halves of MAX_LEAF_PAIRS / 2 pairs; the unapplied
// remainder of a flush batch (at most MAX_UPSERTS - 1 inserts) must fit in
// either half without a second split.
const _: () = assert!(
    MAX_LEAF_PAIRS / 2 + MAX_UPSERTS - 1 < MAX_LEAF_PAIRS,
    "a leaf flush must be satisfiable with at most one split"
);
