//! # Tree Operations
//!
//! The `BeTree` owns a block manager and drives every structural operation:
//! ingress, point query, the full-flush cascade, splits, and root overflow.
//!
//! ## Ingress
//!
//! `insert`/`update`/`delete` append a timestamped message to the root
//! buffer. When the buffer is full they first run a full flush, which frees
//! at least one interior flush batch worth of space.
//!
//! ## Full Flush
//!
//! Phase 1 descends greedily: each node earmarks the messages bound for its
//! busiest child and pushes them down. A child without room for even the
//! minimum batch becomes the new cursor and is drained first. Phase 2
//! ascends from the deepest node visited, absorbing splits into pivot
//! arrays (splitting interior nodes as they fill, up to a fresh root) and
//! draining the regions ancestors still hold earmarked.
//!
//! When a split lands in a node that holds an earmarked region, that region
//! targeted the child that just split and may now straddle the new pivot.
//! The upper run is flushed to the new sibling immediately, restoring the
//! invariant that a flush region targets exactly one child; the wholesale
//! region move in `split_interior` relies on it.
//!
//! ## Page Discipline
//!
//! All node access goes `open_block -> frame -> view`, one page at a time;
//! data needed across pages is copied out first. No slot index or reference
//! is ever held across another block operation, so any call may evict any
//! page without invalidating state. A consequence is that single-digit
//! cache capacities (down to 2 pages) remain functional, just slow.
//!
//! ## Bootstrap
//!
//! A fresh tree pre-allocates an interior root over two empty leaves,
//! separated by a sentinel pivot above every legal key. Legal keys are
//! `1 ..= u32::MAX - 2`: id 0 is the root-parent sentinel and `u32::MAX`
//! doubles as `KEY_NOT_FOUND`.

use std::path::Path;

use eyre::{bail, ensure, eyre, Result};
use hashbrown::HashSet;
use tracing::{debug, trace, warn};

use crate::config::{
    DEFAULT_CACHE_PAGES, INTERIOR_FLUSH_THRESHOLD, LEAF_FLUSH_THRESHOLD, MAX_PIVOTS, MAX_UPSERTS,
};
use crate::storage::{node_kind, BlockManager, NodeHeader, NodeKind, TreeMeta};
use crate::tree::interior::{InteriorNode, InteriorNodeMut};
use crate::tree::leaf::{LeafNode, LeafNodeMut};
use crate::tree::upsert::{Upsert, UpsertKind, KEY_NOT_FOUND};

/// Pivot seeded between the two bootstrap leaves. Strictly greater than
/// every legal key, so it encodes +inf and never needs to move.
const PIVOT_SENTINEL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushResult {
    NoSplit,
    Split { split_key: u32, new_id: u32 },
    EnsureSpace { child_id: u32 },
}

/// Observability counters, mirrored from the block manager.
#[derive(Debug, Clone, Copy)]
pub struct TreeStats {
    pub num_reads: u64,
    pub num_writes: u64,
    pub resident_pages: usize,
}

pub struct BeTree {
    store: BlockManager,
    root_id: u32,
    next_timestamp: u32,
}

impl BeTree {
    /// Opens the tree stored under `path`, creating it if the directory
    /// holds no tree yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CACHE_PAGES)
    }

    /// Opens with an explicit page-cache capacity (2 is the practical
    /// minimum; the default suits trees up to roughly 14 levels).
    pub fn open_with_cache<P: AsRef<Path>>(path: P, cache_pages: usize) -> Result<Self> {
        let path = path.as_ref();

        if let Some(meta) = TreeMeta::load(path)? {
            let store = BlockManager::open(path, cache_pages, meta.num_blocks())?;
            debug!(root = meta.root_id(), "opened existing tree");
            return Ok(Self {
                store,
                root_id: meta.root_id(),
                next_timestamp: meta.next_timestamp(),
            });
        }

        let mut store = BlockManager::open(path, cache_pages, 0)?;
        let root_id = store.create_block()?;
        let left_id = store.create_block()?;
        let right_id = store.create_block()?;

        {
            let slot = store.open_block(root_id)?;
            let mut root = InteriorNodeMut::init(store.frame_mut(slot), 0)?;
            root.write_pivots(&[PIVOT_SENTINEL], &[left_id, right_id])?;
        }
        for leaf_id in [left_id, right_id] {
            let slot = store.open_block(leaf_id)?;
            LeafNodeMut::init(store.frame_mut(slot), root_id)?;
        }

        let mut tree = Self {
            store,
            root_id,
            next_timestamp: 1,
        };
        tree.flush()?;
        debug!(root = root_id, "created new tree");
        Ok(tree)
    }

    pub fn root_page(&self) -> u32 {
        self.root_id
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            num_reads: self.store.num_reads(),
            num_writes: self.store.num_writes(),
            resident_pages: self.store.resident_pages(),
        }
    }

    /// Inserts a key. The key must not be present; the violation surfaces
    /// once the message reaches its leaf.
    pub fn insert(&mut self, key: u32, value: u32) -> Result<()> {
        self.enqueue(key, UpsertKind::Insert, value)
    }

    /// Updates a present key; the absence check is deferred likewise.
    pub fn update(&mut self, key: u32, value: u32) -> Result<()> {
        self.enqueue(key, UpsertKind::Update, value)
    }

    /// Deletes a present key; the absence check is deferred likewise.
    pub fn delete(&mut self, key: u32) -> Result<()> {
        self.enqueue(key, UpsertKind::Delete, 0)
    }

    /// Point lookup. Returns [`KEY_NOT_FOUND`] for absent keys; never
    /// modifies the tree beyond cache recency and I/O counters.
    pub fn query(&mut self, key: u32) -> Result<u32> {
        let mut id = self.root_id;

        loop {
            let slot = self.store.open_block(id)?;
            let page = self.store.frame(slot);

            match node_kind(page)? {
                NodeKind::Leaf => {
                    let leaf = LeafNode::from_page(page)?;
                    return Ok(leaf.lookup(key).unwrap_or(KEY_NOT_FOUND));
                }
                NodeKind::Interior => {
                    let node = InteriorNode::from_page(page)?;

                    // A match in this buffer supersedes everything below:
                    // timestamps are assigned at ingress and messages only
                    // move downward.
                    if let Some(msg) = node.newest_message_for(key) {
                        return match msg.kind()? {
                            UpsertKind::Insert | UpsertKind::Update => Ok(msg.parameter()),
                            UpsertKind::Delete => Ok(KEY_NOT_FOUND),
                            UpsertKind::Invalid => {
                                bail!("invalid message observed while querying key {}", key)
                            }
                        };
                    }

                    let next = node.child_at(node.child_index(key));
                    ensure!(next != 0, "null child pointer while querying key {}", key);
                    id = next;
                }
            }
        }
    }

    /// Writes the metadata file and every dirty page back to disk.
    pub fn flush(&mut self) -> Result<()> {
        TreeMeta::new(self.root_id, self.store.num_blocks(), self.next_timestamp)
            .store(self.store.dir())?;
        self.store.flush_all()
    }

    /// Explicit shutdown; `Drop` performs the same flush best-effort.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn enqueue(&mut self, key: u32, kind: UpsertKind, parameter: u32) -> Result<()> {
        ensure!(
            key != 0 && key != KEY_NOT_FOUND,
            "key {} is reserved",
            key
        );

        // A single flush almost always frees root space; the retry covers
        // the rare cascade where every delivery on the chosen path was
        // deferred against an over-full child.
        let mut attempts = 0;
        while self.buffer_len_of(self.root_id)? == MAX_UPSERTS {
            ensure!(attempts < 4, "root buffer failed to drain");
            self.full_flush()?;
            attempts += 1;
        }

        let ts = self.next_timestamp;
        self.next_timestamp = ts
            .checked_add(1)
            .ok_or_else(|| eyre!("timestamp space exhausted"))?;

        let slot = self.store.open_block(self.root_id)?;
        let mut root = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
        root.push_upsert(Upsert::new(key, kind, parameter, ts))
    }

    /// Drains the root buffer downward as far as batching allows.
    fn full_flush(&mut self) -> Result<()> {
        trace!(root = self.root_id, "full flush");
        let mut cursor = self.root_id;
        let mut result;

        // Phase 1: descend, flushing greedily. A child too full to accept
        // the minimum batch becomes the cursor and is drained first.
        loop {
            {
                let slot = self.store.open_block(cursor)?;
                let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
                node.prepare_flush()?;
            }
            result = self.flush_one_level(cursor)?;
            match result {
                FlushResult::EnsureSpace { child_id } => cursor = child_id,
                _ => break,
            }
        }

        // Phase 2: ascend, absorbing splits and draining the regions the
        // ancestors still hold earmarked from the descent.
        loop {
            if let FlushResult::Split { split_key, new_id } = result {
                result = self.absorb_split(&mut cursor, split_key, new_id)?;
            }

            if self.flush_len_of(cursor)? > 0 {
                self.drain_region(cursor)?;
            }

            let parent = self.parent_of(cursor)?;
            if parent == 0 {
                if let FlushResult::Split { split_key, new_id } = result {
                    self.create_new_root(split_key, new_id)?;
                }
                return Ok(());
            }
            cursor = parent;
        }
    }

    /// Adds a child split to the cursor node: new pivot, re-uniformed flush
    /// region, and an interior split of the node itself when its pivot
    /// array fills. Returns the split to bubble further, if any.
    fn absorb_split(
        &mut self,
        cursor: &mut u32,
        split_key: u32,
        new_id: u32,
    ) -> Result<FlushResult> {
        let node_id = *cursor;

        let full = {
            let slot = self.store.open_block(node_id)?;
            let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            node.add_pivot(split_key, new_id)?
        };

        // An earmarked region here targeted the child that just split; send
        // the run now belonging to the new sibling down right away.
        if self.flush_len_of(node_id)? > 0 {
            let (lo, hi) = {
                let slot = self.store.open_block(node_id)?;
                let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
                node.partition_region(split_key)?
            };

            if hi > 0 {
                let size_before = self.buffer_len_of(node_id)?;
                {
                    let slot = self.store.open_block(node_id)?;
                    let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
                    node.set_flush_len(hi)?;
                }

                match self.flush_one_level(node_id)? {
                    FlushResult::NoSplit => {
                        let delivered = size_before - self.buffer_len_of(node_id)?;
                        if delivered == hi && lo > 0 {
                            let slot = self.store.open_block(node_id)?;
                            let mut node =
                                InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
                            node.set_flush_len(lo)?;
                        }
                    }
                    FlushResult::EnsureSpace { child_id } => {
                        // The sibling inherited a nearly full buffer; the
                        // whole region reverts to ordinary content and a
                        // later flush drains it.
                        trace!(node = node_id, child = child_id, "sibling drain deferred");
                        let slot = self.store.open_block(node_id)?;
                        InteriorNodeMut::from_page(self.store.frame_mut(slot))?
                            .set_flush_len(0)?;
                    }
                    FlushResult::Split { .. } => {
                        bail!("post-split sibling drain must not split")
                    }
                }
            }
        }

        if full {
            let (split_key, new_id) = self.split_interior(node_id)?;
            // The unflushed remainder may have moved to the sibling; keep
            // the cursor on whichever node still has work.
            if self.flush_len_of(node_id)? == 0 {
                *cursor = new_id;
            }
            Ok(FlushResult::Split { split_key, new_id })
        } else {
            Ok(FlushResult::NoSplit)
        }
    }

    /// Drains an earmarked region during the ascent. The target child was
    /// emptied by the descent, so the flush normally lands; if the child
    /// filled back up regardless, the region reverts to ordinary buffer
    /// content for a later flush. A split here is impossible: interior
    /// flushes never split and leaf regions are always consumed whole.
    fn drain_region(&mut self, node_id: u32) -> Result<()> {
        match self.flush_one_level(node_id)? {
            FlushResult::NoSplit => Ok(()),
            FlushResult::EnsureSpace { child_id } => {
                trace!(node = node_id, child = child_id, "ascent drain deferred");
                let slot = self.store.open_block(node_id)?;
                InteriorNodeMut::from_page(self.store.frame_mut(slot))?.set_flush_len(0)
            }
            FlushResult::Split { .. } => bail!("flush during ascent must not split"),
        }
    }

    /// Pushes the cursor's flush region one level down. The region's first
    /// message names the target child.
    fn flush_one_level(&mut self, node_id: u32) -> Result<FlushResult> {
        let child_id = {
            let slot = self.store.open_block(node_id)?;
            let node = InteriorNode::from_page(self.store.frame(slot))?;
            let head = node.region_head()?;
            let child = node.child_at(node.child_index(head.key()));
            ensure!(child != 0, "flush routed to a null child");
            child
        };

        let child_kind = {
            let slot = self.store.open_block(child_id)?;
            let header = NodeHeader::from_page(self.store.frame(slot))?;
            ensure!(
                header.parent_id() == node_id,
                "page {} has parent {}, but was flushed from {}",
                child_id,
                header.parent_id(),
                node_id
            );
            header.kind()
        };

        match child_kind {
            NodeKind::Leaf => self.flush_one_leaf(node_id, child_id),
            NodeKind::Interior => self.flush_one_interior(node_id, child_id),
        }
    }

    /// Moves messages into an interior child: the whole region when it
    /// fits, the minimum amortizable batch when it does not, and nothing if
    /// the child must be drained first.
    fn flush_one_interior(&mut self, node_id: u32, child_id: u32) -> Result<FlushResult> {
        let fs = self.flush_len_of(node_id)?;
        let child_len = {
            let slot = self.store.open_block(child_id)?;
            InteriorNode::from_page(self.store.frame(slot))?.buffer_len()
        };
        let empty = MAX_UPSERTS - child_len;

        let n = if empty >= fs {
            fs
        } else if empty >= INTERIOR_FLUSH_THRESHOLD {
            INTERIOR_FLUSH_THRESHOLD
        } else {
            return Ok(FlushResult::EnsureSpace { child_id });
        };

        // Oldest messages sit at the region tail; they go down first so the
        // undelivered remainder stays newest-first.
        let moved: Vec<Upsert> = {
            let slot = self.store.open_block(node_id)?;
            let node = InteriorNode::from_page(self.store.frame(slot))?;
            let ups = node.upserts();
            ups[ups.len() - n..].to_vec()
        };

        {
            let slot = self.store.open_block(child_id)?;
            let mut child = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            for msg in &moved {
                child.push_upsert(*msg)?;
            }
        }
        {
            let slot = self.store.open_block(node_id)?;
            let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            node.consume_flushed(n)?;
        }

        debug!(from = node_id, to = child_id, moved = n, "interior flush");
        Ok(FlushResult::NoSplit)
    }

    /// Applies the flush region to a leaf child, splitting it at most once.
    fn flush_one_leaf(&mut self, node_id: u32, child_id: u32) -> Result<FlushResult> {
        let fs = self.flush_len_of(node_id)?;
        let k = fs.min(LEAF_FLUSH_THRESHOLD);

        let mut pending: Vec<Upsert> = {
            let slot = self.store.open_block(node_id)?;
            let node = InteriorNode::from_page(self.store.frame(slot))?;
            let ups = node.upserts();
            ups[ups.len() - k..].to_vec()
        };

        let full = {
            let slot = self.store.open_block(child_id)?;
            let mut leaf = LeafNodeMut::from_page(self.store.frame_mut(slot))?;
            leaf.apply(&mut pending)?
        };

        let result = if full {
            let (split_key, new_id) = self.split_leaf(child_id)?;

            // Route each unapplied message to the half that owns its key;
            // relative (timestamp) order within a half is preserved.
            let (mut below, mut above): (Vec<Upsert>, Vec<Upsert>) =
                pending.into_iter().partition(|m| m.key() < split_key);

            {
                let slot = self.store.open_block(child_id)?;
                let mut leaf = LeafNodeMut::from_page(self.store.frame_mut(slot))?;
                ensure!(
                    !leaf.apply(&mut below)?,
                    "leaf overflow while draining a split remainder"
                );
            }
            {
                let slot = self.store.open_block(new_id)?;
                let mut leaf = LeafNodeMut::from_page(self.store.frame_mut(slot))?;
                ensure!(
                    !leaf.apply(&mut above)?,
                    "leaf overflow while draining a split remainder"
                );
            }

            FlushResult::Split { split_key, new_id }
        } else {
            FlushResult::NoSplit
        };

        {
            let slot = self.store.open_block(node_id)?;
            let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            node.consume_flushed(k)?;
        }

        debug!(from = node_id, to = child_id, moved = k, "leaf flush");
        Ok(result)
    }

    /// Sorts a full leaf and moves its upper half to a fresh sibling.
    /// Returns the sibling's first key and id.
    fn split_leaf(&mut self, leaf_id: u32) -> Result<(u32, u32)> {
        let (parent_id, mut pairs) = {
            let slot = self.store.open_block(leaf_id)?;
            let leaf = LeafNode::from_page(self.store.frame(slot))?;
            (leaf.parent_id(), leaf.pairs())
        };
        ensure!(pairs.len() >= 2, "splitting a leaf with fewer than two pairs");

        pairs.sort_unstable_by_key(|&(key, _)| key);
        let mid = pairs.len() / 2;
        let split_key = pairs[mid].0;

        let new_id = self.allocate_leaf(parent_id)?;
        {
            let slot = self.store.open_block(new_id)?;
            let mut sibling = LeafNodeMut::from_page(self.store.frame_mut(slot))?;
            sibling.write_pairs(&pairs[mid..])?;
        }
        {
            let slot = self.store.open_block(leaf_id)?;
            let mut leaf = LeafNodeMut::from_page(self.store.frame_mut(slot))?;
            leaf.write_pairs(&pairs[..mid])?;
        }

        debug!(leaf = leaf_id, sibling = new_id, split_key, "leaf split");
        Ok((split_key, new_id))
    }

    /// Splits a full interior node: upper pivots, pointers and matching
    /// buffer entries move to a fresh sibling; the middle pivot is dropped
    /// and returned as the split key.
    fn split_interior(&mut self, node_id: u32) -> Result<(u32, u32)> {
        let (parent_id, keys, children, msgs, fs) = {
            let slot = self.store.open_block(node_id)?;
            let node = InteriorNode::from_page(self.store.frame(slot))?;
            ensure!(
                node.pivot_count() == MAX_PIVOTS,
                "splitting an interior node that is not full"
            );
            let keys: Vec<u32> = (0..MAX_PIVOTS).map(|i| node.pivot_at(i)).collect();
            let children: Vec<u32> = (0..=MAX_PIVOTS).map(|i| node.child_at(i)).collect();
            (
                node.parent_id(),
                keys,
                children,
                node.upserts().to_vec(),
                node.flush_len(),
            )
        };

        let mid = (MAX_PIVOTS + 1) / 2;
        let split_key = keys[mid - 1];

        // Non-region messages move by key. The flush region targets one
        // child, which lands entirely on one side of the split, so the
        // whole region follows its first message.
        let n = msgs.len();
        let mut keep: Vec<Upsert> = Vec::new();
        let mut moved: Vec<Upsert> = Vec::new();
        for msg in &msgs[..n - fs] {
            if msg.key() >= split_key {
                moved.push(*msg);
            } else {
                keep.push(*msg);
            }
        }
        let (mut keep_fs, mut moved_fs) = (0, 0);
        if fs > 0 {
            let region = &msgs[n - fs..];
            if region[0].key() >= split_key {
                moved.extend_from_slice(region);
                moved_fs = fs;
            } else {
                keep.extend_from_slice(region);
                keep_fs = fs;
            }
        }

        let new_id = self.allocate_interior(parent_id)?;
        {
            let slot = self.store.open_block(new_id)?;
            let mut sibling = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            sibling.write_pivots(&keys[mid..], &children[mid..])?;
            sibling.write_buffer(&moved, moved_fs)?;
        }
        {
            let slot = self.store.open_block(node_id)?;
            let mut node = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            node.write_pivots(&keys[..mid - 1], &children[..mid])?;
            node.write_buffer(&keep, keep_fs)?;
        }

        for &child in &children[mid..] {
            let slot = self.store.open_block(child)?;
            NodeHeader::from_page_mut(self.store.frame_mut(slot))?.set_parent_id(new_id);
        }

        debug!(node = node_id, sibling = new_id, split_key, "interior split");
        Ok((split_key, new_id))
    }

    /// Installs a fresh root above the old one after it split.
    fn create_new_root(&mut self, split_key: u32, new_id: u32) -> Result<()> {
        let old_root = self.root_id;
        let new_root = self.allocate_interior(0)?;

        {
            let slot = self.store.open_block(new_root)?;
            let mut root = InteriorNodeMut::from_page(self.store.frame_mut(slot))?;
            root.write_pivots(&[split_key], &[old_root, new_id])?;
        }
        for child in [old_root, new_id] {
            let slot = self.store.open_block(child)?;
            NodeHeader::from_page_mut(self.store.frame_mut(slot))?.set_parent_id(new_root);
        }

        self.root_id = new_root;
        debug!(root = new_root, left = old_root, right = new_id, "new root");
        Ok(())
    }

    fn allocate_leaf(&mut self, parent_id: u32) -> Result<u32> {
        let id = self.store.create_block()?;
        let slot = self.store.open_block(id)?;
        LeafNodeMut::init(self.store.frame_mut(slot), parent_id)?;
        Ok(id)
    }

    fn allocate_interior(&mut self, parent_id: u32) -> Result<u32> {
        let id = self.store.create_block()?;
        let slot = self.store.open_block(id)?;
        InteriorNodeMut::init(self.store.frame_mut(slot), parent_id)?;
        Ok(id)
    }

    fn parent_of(&mut self, id: u32) -> Result<u32> {
        let slot = self.store.open_block(id)?;
        Ok(NodeHeader::from_page(self.store.frame(slot))?.parent_id())
    }

    fn flush_len_of(&mut self, id: u32) -> Result<usize> {
        let slot = self.store.open_block(id)?;
        Ok(InteriorNode::from_page(self.store.frame(slot))?.flush_len())
    }

    fn buffer_len_of(&mut self, id: u32) -> Result<usize> {
        let slot = self.store.open_block(id)?;
        Ok(InteriorNode::from_page(self.store.frame(slot))?.buffer_len())
    }

    /// Walks the whole tree and verifies its structural invariants: strict
    /// pivot order, key-range containment of pivots, buffered messages and
    /// leaf keys, buffer bounds, parent back-pointers, and single ownership
    /// of every page. Intended for tests and debugging; cost is a full
    /// sweep of the tree.
    pub fn check_invariants(&mut self) -> Result<()> {
        // (page, lower, upper, expected parent); bounds are half-open over
        // u64 so u32::MAX keys and +inf coexist.
        let mut queue: Vec<(u32, u64, u64, u32)> = vec![(self.root_id, 0, u64::MAX, 0)];
        let mut seen: HashSet<u32> = HashSet::new();

        while let Some((id, lower, upper, parent)) = queue.pop() {
            ensure!(seen.insert(id), "page {} referenced more than once", id);

            let slot = self.store.open_block(id)?;
            let page = self.store.frame(slot);
            let header = NodeHeader::from_page(page)?;
            ensure!(
                header.parent_id() == parent,
                "page {} has parent {}, expected {}",
                id,
                header.parent_id(),
                parent
            );

            match header.kind() {
                NodeKind::Leaf => {
                    let leaf = LeafNode::from_page(page)?;
                    for i in 0..leaf.len() {
                        let key = leaf.key_at(i) as u64;
                        ensure!(
                            key >= lower && key < upper,
                            "leaf {} key {} outside [{}, {})",
                            id,
                            key,
                            lower,
                            upper
                        );
                    }
                }
                NodeKind::Interior => {
                    let node = InteriorNode::from_page(page)?;
                    let np = node.pivot_count();
                    ensure!(np >= 1, "interior page {} has no pivots", id);
                    ensure!(
                        node.buffer_len() <= MAX_UPSERTS,
                        "interior page {} buffer overflow",
                        id
                    );
                    ensure!(
                        node.flush_len() == 0,
                        "interior page {} holds a flush region at rest",
                        id
                    );

                    for i in 0..np {
                        let pivot = node.pivot_at(i) as u64;
                        ensure!(
                            pivot >= lower && pivot <= upper,
                            "interior {} pivot {} outside [{}, {}]",
                            id,
                            pivot,
                            lower,
                            upper
                        );
                        if i > 0 {
                            ensure!(
                                node.pivot_at(i - 1) < node.pivot_at(i),
                                "interior {} pivots not strictly increasing",
                                id
                            );
                        }
                    }

                    for msg in node.upserts() {
                        let key = msg.key() as u64;
                        ensure!(
                            key >= lower && key < upper,
                            "interior {} buffers key {} outside [{}, {})",
                            id,
                            key,
                            lower,
                            upper
                        );
                        ensure!(
                            msg.kind()? != UpsertKind::Invalid,
                            "interior {} holds an invalid message at rest",
                            id
                        );
                    }

                    for i in 0..=np {
                        let child = node.child_at(i);
                        ensure!(child != 0, "interior {} has a null child pointer", id);
                        let child_lower = if i == 0 { lower } else { node.pivot_at(i - 1) as u64 };
                        let child_upper = if i == np { upper } else { node.pivot_at(i) as u64 };
                        queue.push((child, child_lower, child_upper, id));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for BeTree {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("flush on drop failed: {err:#}");
        }
    }
}
