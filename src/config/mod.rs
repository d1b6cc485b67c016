mod constants;

pub use constants::{
    DEFAULT_CACHE_PAGES, INTERIOR_FLUSH_THRESHOLD, LEAF_FLUSH_THRESHOLD, MAX_CHILDREN,
    MAX_LEAF_PAIRS, MAX_PIVOTS, MAX_UPSERTS, NODE_HEADER_SIZE, PAGE_SIZE, PIVOT_BLOCK_SIZE,
    UPSERT_SIZE,
};
