//! # Interior Node Views
//!
//! Interior nodes carry two regions sharing the page body: a buffer of
//! pending upsert messages and a pivot block routing keys to children.
//!
//! ## Page Layout
//!
//! ```text
//! Offset  Size   Field
//! ------  -----  ------------------------------------
//! 0       8      NodeHeader (parent_id, is_leaf=0)
//! 8       4      buffer.size
//! 12      4      buffer.flush_size
//! 16      3952   buffer.entries[MAX_UPSERTS]   (16 B each)
//! 3968    4      pivots.size
//! 3972    60     pivots.keys[MAX_PIVOTS]
//! 4032    64     pivots.children[MAX_CHILDREN]
//! ```
//!
//! The layout fills the page exactly; this is pinned at compile time.
//!
//! ## Flush Region
//!
//! The trailing `flush_size` entries of the live buffer
//! (`entries[size - flush_size .. size]`) are the flush region: messages
//! earmarked for one specific child, sorted newest-timestamp-first.
//! `prepare_flush` builds the region by counting, partitioning in place and
//! sorting; outside a flush `flush_size` is 0.
//!
//! ## Routing
//!
//! With `n` pivots there are `n + 1` children; pivot `i` is the inclusive
//! lower bound of child `i + 1`, with implicit -inf / +inf sentinels at the
//! ends. `child_index` is the single routing primitive; off-by-one handling
//! lives here and nowhere else.

use eyre::{ensure, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{MAX_CHILDREN, MAX_PIVOTS, MAX_UPSERTS, NODE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::{NodeHeader, NodeKind};
use crate::tree::upsert::Upsert;

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct UpsertBuffer {
    size: U32<LittleEndian>,
    flush_size: U32<LittleEndian>,
    entries: [Upsert; MAX_UPSERTS],
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct PivotBlock {
    size: U32<LittleEndian>,
    keys: [U32<LittleEndian>; MAX_PIVOTS],
    children: [U32<LittleEndian>; MAX_CHILDREN],
}

const PIVOT_BLOCK_OFFSET: usize = NODE_HEADER_SIZE + size_of::<UpsertBuffer>();

const _: () = assert!(
    NODE_HEADER_SIZE + size_of::<UpsertBuffer>() + size_of::<PivotBlock>() == PAGE_SIZE,
    "interior layout must fill the page exactly"
);

impl PivotBlock {
    fn len(&self) -> usize {
        self.size.get() as usize
    }

    /// Index into `children` for `key`: the number of pivots at or below
    /// it. The tree never materializes a pivot-less interior node, so an
    /// empty pivot block here is a structural corruption.
    fn child_index(&self, key: u32) -> usize {
        let n = self.len();
        assert!(n >= 1, "interior node with no pivots");
        self.keys[..n].partition_point(|p| p.get() <= key)
    }
}

fn check_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );
    let header = NodeHeader::from_page(data)?;
    ensure!(
        header.kind() == NodeKind::Interior,
        "expected interior page, got {:?}",
        header.kind()
    );
    Ok(())
}

#[derive(Debug)]
pub struct InteriorNode<'a> {
    data: &'a [u8],
}

pub struct InteriorNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InteriorNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        check_page(data)?;
        Ok(Self { data })
    }

    fn buffer(&self) -> &UpsertBuffer {
        // Length and tag validated in from_page.
        UpsertBuffer::ref_from_bytes(&self.data[NODE_HEADER_SIZE..PIVOT_BLOCK_OFFSET]).unwrap()
    }

    fn pivots(&self) -> &PivotBlock {
        PivotBlock::ref_from_bytes(&self.data[PIVOT_BLOCK_OFFSET..]).unwrap()
    }

    pub fn parent_id(&self) -> u32 {
        NodeHeader::from_page(self.data).unwrap().parent_id()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer().size.get() as usize
    }

    pub fn flush_len(&self) -> usize {
        self.buffer().flush_size.get() as usize
    }

    /// The live buffer contents, flush region included.
    pub fn upserts(&self) -> &[Upsert] {
        &self.buffer().entries[..self.buffer_len()]
    }

    /// First (newest) message of the flush region; decides the flush target.
    pub fn region_head(&self) -> Result<Upsert> {
        let n = self.buffer_len();
        let fs = self.flush_len();
        ensure!(fs > 0 && fs <= n, "no flush region earmarked");
        Ok(self.buffer().entries[n - fs])
    }

    pub fn pivot_count(&self) -> usize {
        self.pivots().len()
    }

    pub fn pivot_at(&self, index: usize) -> u32 {
        self.pivots().keys[index].get()
    }

    pub fn child_at(&self, index: usize) -> u32 {
        self.pivots().children[index].get()
    }

    pub fn child_index(&self, key: u32) -> usize {
        self.pivots().child_index(key)
    }

    /// Scans the whole buffer for the newest message matching `key`.
    pub fn newest_message_for(&self, key: u32) -> Option<Upsert> {
        let mut best: Option<Upsert> = None;
        for msg in self.upserts() {
            if msg.key() == key && best.is_none_or(|b| msg.timestamp() >= b.timestamp()) {
                best = Some(*msg);
            }
        }
        best
    }
}

impl<'a> InteriorNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        check_page(data)?;
        Ok(Self { data })
    }

    /// Formats a page as an empty interior node.
    pub fn init(data: &'a mut [u8], parent_id: u32) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );

        let header = NodeHeader::from_page_mut(data)?;
        header.set_kind(NodeKind::Interior);
        header.set_parent_id(parent_id);

        let mut node = Self { data };
        {
            let buffer = node.buffer_mut();
            buffer.size = U32::new(0);
            buffer.flush_size = U32::new(0);
        }
        node.pivots_mut().size = U32::new(0);
        Ok(node)
    }

    fn buffer(&self) -> &UpsertBuffer {
        UpsertBuffer::ref_from_bytes(&self.data[NODE_HEADER_SIZE..PIVOT_BLOCK_OFFSET]).unwrap()
    }

    fn buffer_mut(&mut self) -> &mut UpsertBuffer {
        UpsertBuffer::mut_from_bytes(&mut self.data[NODE_HEADER_SIZE..PIVOT_BLOCK_OFFSET]).unwrap()
    }

    fn pivots(&self) -> &PivotBlock {
        PivotBlock::ref_from_bytes(&self.data[PIVOT_BLOCK_OFFSET..]).unwrap()
    }

    fn pivots_mut(&mut self) -> &mut PivotBlock {
        PivotBlock::mut_from_bytes(&mut self.data[PIVOT_BLOCK_OFFSET..]).unwrap()
    }

    /// Splits the page into the buffer (mutable) and the pivot block
    /// (read-only); `prepare_flush` routes while it partitions.
    fn parts_mut(&mut self) -> (&mut UpsertBuffer, &PivotBlock) {
        let (buf, piv) = self.data.split_at_mut(PIVOT_BLOCK_OFFSET);
        (
            UpsertBuffer::mut_from_bytes(&mut buf[NODE_HEADER_SIZE..]).unwrap(),
            PivotBlock::ref_from_bytes(piv).unwrap(),
        )
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer().size.get() as usize
    }

    pub fn flush_len(&self) -> usize {
        self.buffer().flush_size.get() as usize
    }

    pub fn upserts(&self) -> &[Upsert] {
        &self.buffer().entries[..self.buffer_len()]
    }

    pub fn pivot_count(&self) -> usize {
        self.pivots().len()
    }

    pub fn pivot_at(&self, index: usize) -> u32 {
        self.pivots().keys[index].get()
    }

    pub fn child_at(&self, index: usize) -> u32 {
        self.pivots().children[index].get()
    }

    pub fn child_index(&self, key: u32) -> usize {
        self.pivots().child_index(key)
    }

    /// Appends a message to the buffer. Only the root receives messages
    /// directly; every other node gets them through a flush.
    pub fn push_upsert(&mut self, msg: Upsert) -> Result<()> {
        let n = self.buffer_len();
        ensure!(n < MAX_UPSERTS, "upsert buffer overflow");

        let buffer = self.buffer_mut();
        buffer.entries[n] = msg;
        buffer.size = U32::new(n as u32 + 1);
        Ok(())
    }

    /// Replaces the whole buffer (split redistribution path).
    pub fn write_buffer(&mut self, msgs: &[Upsert], flush_len: usize) -> Result<()> {
        ensure!(
            msgs.len() <= MAX_UPSERTS,
            "{} messages exceed buffer capacity",
            msgs.len()
        );
        ensure!(flush_len <= msgs.len(), "flush region larger than buffer");

        let buffer = self.buffer_mut();
        buffer.entries[..msgs.len()].copy_from_slice(msgs);
        buffer.size = U32::new(msgs.len() as u32);
        buffer.flush_size = U32::new(flush_len as u32);
        Ok(())
    }

    /// Replaces the pivot block (split path). `children` must carry exactly
    /// one more entry than `keys`.
    pub fn write_pivots(&mut self, keys: &[u32], children: &[u32]) -> Result<()> {
        ensure!(keys.len() <= MAX_PIVOTS, "{} pivots exceed capacity", keys.len());
        ensure!(
            children.len() == keys.len() + 1,
            "pivot/pointer mismatch: {} keys, {} children",
            keys.len(),
            children.len()
        );

        let pivots = self.pivots_mut();
        for (i, &k) in keys.iter().enumerate() {
            pivots.keys[i] = U32::new(k);
        }
        for (i, &c) in children.iter().enumerate() {
            pivots.children[i] = U32::new(c);
        }
        pivots.size = U32::new(keys.len() as u32);
        Ok(())
    }

    /// Removes the `n` delivered messages from the buffer tail and clears
    /// the earmark; any undelivered region entries revert to ordinary
    /// buffer content.
    pub fn consume_flushed(&mut self, n: usize) -> Result<()> {
        let size = self.buffer_len();
        let fs = self.flush_len();
        ensure!(n <= fs && fs <= size, "flush accounting out of bounds");

        let buffer = self.buffer_mut();
        buffer.size = U32::new((size - n) as u32);
        buffer.flush_size = U32::new(0);
        Ok(())
    }

    /// Re-earmarks the trailing `n` buffer entries as the flush region.
    pub fn set_flush_len(&mut self, n: usize) -> Result<()> {
        ensure!(n <= self.buffer_len(), "flush region larger than buffer");
        self.buffer_mut().flush_size = U32::new(n as u32);
        Ok(())
    }

    /// Builds the flush region: counts messages per child, picks the child
    /// with the most (ties to the lowest index), partitions its messages to
    /// the buffer tail and sorts them newest-timestamp-first. Returns the
    /// region size.
    pub fn prepare_flush(&mut self) -> Result<usize> {
        ensure!(
            self.flush_len() == 0,
            "flush setup with a region already earmarked"
        );
        let n = self.buffer_len();
        ensure!(n > 0, "flush setup on an empty buffer");

        let (buffer, pivots) = self.parts_mut();
        let live = &mut buffer.entries[..n];

        let mut counts = [0usize; MAX_CHILDREN];
        for msg in live.iter() {
            counts[pivots.child_index(msg.key())] += 1;
        }

        let mut target = 0;
        for c in 1..=pivots.len() {
            if counts[c] > counts[target] {
                target = c;
            }
        }

        // Partition from the tail so the targeted messages end up trailing.
        let mut write = n;
        for cur in (0..n).rev() {
            if pivots.child_index(live[cur].key()) == target {
                write -= 1;
                live.swap(write, cur);
            }
        }
        debug_assert_eq!(n - write, counts[target]);

        live[write..].sort_unstable_by(|a, b| b.timestamp().cmp(&a.timestamp()));

        let count = n - write;
        buffer.flush_size = U32::new(count as u32);
        Ok(count)
    }

    /// Reorders the flush region so entries with `key >= split_key` occupy
    /// the extreme tail, newest-first within each run. Returns
    /// `(below, at_or_above)` counts. Used when the region's target child
    /// has split and the region may straddle the new pivot.
    pub fn partition_region(&mut self, split_key: u32) -> Result<(usize, usize)> {
        let n = self.buffer_len();
        let fs = self.flush_len();
        ensure!(fs > 0 && fs <= n, "no flush region earmarked");

        let buffer = self.buffer_mut();
        let region = &mut buffer.entries[n - fs..n];
        region.sort_unstable_by(|a, b| {
            (a.key() >= split_key)
                .cmp(&(b.key() >= split_key))
                .then_with(|| b.timestamp().cmp(&a.timestamp()))
        });

        let hi = region.iter().filter(|m| m.key() >= split_key).count();
        Ok((fs - hi, hi))
    }

    /// Inserts a pivot/pointer pair, shifting the tail right. Returns true
    /// when the pivot array is now full and the caller must split the node.
    pub fn add_pivot(&mut self, key: u32, child: u32) -> Result<bool> {
        ensure!(child != 0, "pivot must point at an allocated page");
        let n = self.pivot_count();
        ensure!(n < MAX_PIVOTS, "pivot overflow adding key {}", key);

        let pivots = self.pivots_mut();
        let pos = pivots.child_index(key);
        for j in (pos..n).rev() {
            pivots.keys[j + 1] = pivots.keys[j];
            pivots.children[j + 2] = pivots.children[j + 1];
        }
        pivots.keys[pos] = U32::new(key);
        pivots.children[pos + 1] = U32::new(child);
        pivots.size = U32::new(n as u32 + 1);

        Ok(n + 1 == MAX_PIVOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::upsert::UpsertKind;

    fn interior_page(pivot_keys: &[u32], children: &[u32]) -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut node = InteriorNodeMut::init(&mut data, 0).unwrap();
        node.write_pivots(pivot_keys, children).unwrap();
        data
    }

    fn msg(key: u32, ts: u32) -> Upsert {
        Upsert::new(key, UpsertKind::Insert, key, ts)
    }

    #[test]
    fn layout_fills_the_page() {
        assert_eq!(
            NODE_HEADER_SIZE + size_of::<UpsertBuffer>() + size_of::<PivotBlock>(),
            PAGE_SIZE
        );
    }

    #[test]
    fn child_index_respects_inclusive_lower_bounds() {
        let data = interior_page(&[10, 20, 30], &[2, 3, 4, 5]);
        let node = InteriorNode::from_page(&data).unwrap();

        assert_eq!(node.child_index(5), 0);
        assert_eq!(node.child_index(9), 0);
        assert_eq!(node.child_index(10), 1);
        assert_eq!(node.child_index(19), 1);
        assert_eq!(node.child_index(20), 2);
        assert_eq!(node.child_index(30), 3);
        assert_eq!(node.child_index(1000), 3);
    }

    #[test]
    fn push_upsert_appends_until_capacity() {
        let mut data = interior_page(&[10], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        for i in 0..MAX_UPSERTS as u32 {
            node.push_upsert(msg(i + 1, i + 1)).unwrap();
        }
        assert_eq!(node.buffer_len(), MAX_UPSERTS);
        assert!(node.push_upsert(msg(999, 999)).is_err());
    }

    #[test]
    fn newest_message_wins_by_timestamp() {
        let mut data = interior_page(&[10], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        node.push_upsert(Upsert::new(7, UpsertKind::Insert, 1, 1)).unwrap();
        node.push_upsert(Upsert::new(9, UpsertKind::Insert, 5, 2)).unwrap();
        node.push_upsert(Upsert::new(7, UpsertKind::Update, 2, 3)).unwrap();

        let node = InteriorNode::from_page(&data).unwrap();
        let best = node.newest_message_for(7).unwrap();
        assert_eq!(best.timestamp(), 3);
        assert_eq!(best.parameter(), 2);
        assert!(node.newest_message_for(8).is_none());
    }

    #[test]
    fn prepare_flush_picks_majority_child_and_sorts_region() {
        let mut data = interior_page(&[10, 20], &[2, 3, 4]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        // Child 1 (keys in [10, 20)) gets three messages, the others one each.
        node.push_upsert(msg(5, 1)).unwrap();
        node.push_upsert(msg(12, 2)).unwrap();
        node.push_upsert(msg(25, 3)).unwrap();
        node.push_upsert(msg(15, 4)).unwrap();
        node.push_upsert(msg(11, 5)).unwrap();

        let count = node.prepare_flush().unwrap();
        assert_eq!(count, 3);
        assert_eq!(node.flush_len(), 3);

        let ups = node.upserts();
        let region = &ups[ups.len() - 3..];
        let keys: Vec<u32> = region.iter().map(|m| m.key()).collect();
        let stamps: Vec<u32> = region.iter().map(|m| m.timestamp()).collect();
        assert_eq!(keys, vec![11, 15, 12]);
        assert_eq!(stamps, vec![5, 4, 2]);

        // The non-region prefix keeps exactly the other messages.
        let mut rest: Vec<u32> = ups[..2].iter().map(|m| m.key()).collect();
        rest.sort();
        assert_eq!(rest, vec![5, 25]);
    }

    #[test]
    fn prepare_flush_breaks_ties_toward_lowest_child() {
        let mut data = interior_page(&[10], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        node.push_upsert(msg(5, 1)).unwrap();
        node.push_upsert(msg(15, 2)).unwrap();

        node.prepare_flush().unwrap();
        assert_eq!(node.region_head_key(), 5);
    }

    impl InteriorNodeMut<'_> {
        fn region_head_key(&self) -> u32 {
            let n = self.buffer_len();
            let fs = self.flush_len();
            self.upserts()[n - fs].key()
        }
    }

    #[test]
    fn consume_flushed_drops_tail_and_clears_earmark() {
        let mut data = interior_page(&[10], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        for i in 1..=4 {
            node.push_upsert(msg(i, i)).unwrap();
        }
        node.prepare_flush().unwrap();
        assert_eq!(node.flush_len(), 4);

        node.consume_flushed(2).unwrap();
        assert_eq!(node.buffer_len(), 2);
        assert_eq!(node.flush_len(), 0);
    }

    #[test]
    fn partition_region_splits_runs_and_keeps_recency_order() {
        let mut data = interior_page(&[10], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        for (key, ts) in [(3u32, 1u32), (8, 2), (2, 3), (9, 4)] {
            node.push_upsert(msg(key, ts)).unwrap();
        }
        node.prepare_flush().unwrap();

        let (lo, hi) = node.partition_region(8).unwrap();
        assert_eq!((lo, hi), (2, 2));

        let ups = node.upserts();
        let keys: Vec<u32> = ups.iter().map(|m| m.key()).collect();
        let stamps: Vec<u32> = ups.iter().map(|m| m.timestamp()).collect();
        assert_eq!(keys, vec![2, 3, 9, 8]);
        assert_eq!(stamps, vec![3, 1, 4, 2]);
    }

    #[test]
    fn add_pivot_shifts_and_reports_full() {
        let mut data = interior_page(&[20], &[2, 3]);
        let mut node = InteriorNodeMut::from_page(&mut data).unwrap();

        assert!(!node.add_pivot(10, 4).unwrap());
        assert_eq!(node.pivot_at(0), 10);
        assert_eq!(node.pivot_at(1), 20);
        assert_eq!(node.child_at(0), 2);
        assert_eq!(node.child_at(1), 4);
        assert_eq!(node.child_at(2), 3);

        let mut full = false;
        for (i, key) in (30..).step_by(10).take(MAX_PIVOTS - 2).enumerate() {
            full = node.add_pivot(key, 5 + i as u32).unwrap();
        }
        assert!(full);
        assert_eq!(node.pivot_count(), MAX_PIVOTS);
        assert!(node.add_pivot(999, 99).is_err());
    }

    #[test]
    fn write_pivots_rejects_mismatched_children() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut node = InteriorNodeMut::init(&mut data, 0).unwrap();

        assert!(node.write_pivots(&[10, 20], &[1, 2]).is_err());
    }
}
