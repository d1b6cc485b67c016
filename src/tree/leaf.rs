//! # Leaf Node Views
//!
//! Leaf nodes hold the live key/value pairs. Their payload is a plain
//! counted pair of parallel arrays; order is unsorted in general and sorted
//! only at the moment of a split.
//!
//! ## Page Layout
//!
//! ```text
//! Offset  Size   Field
//! ------  -----  ---------------------------------
//! 0       8      NodeHeader (parent_id, is_leaf=1)
//! 8       4      size
//! 12      2040   keys[MAX_LEAF_PAIRS]
//! 2052    2040   values[MAX_LEAF_PAIRS]
//! 4092    4      unused
//! ```
//!
//! `keys[0..size)` / `values[0..size)` are the live data; trailing array
//! bytes are indeterminate.
//!
//! ## Message Application
//!
//! `apply` consumes a batch of buffered messages from the back of the
//! vector (oldest timestamp first) and reports when an insert fills the
//! leaf, leaving the unapplied remainder for the caller to route after the
//! split. Precondition violations surface the user's logical mistake:
//! inserting a present key or updating/deleting an absent one is an error,
//! checked here because this is the first point where leaf contents are
//! visible.

use eyre::{bail, ensure, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{MAX_LEAF_PAIRS, NODE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::{NodeHeader, NodeKind};
use crate::tree::upsert::{Upsert, UpsertKind};

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct LeafData {
    size: U32<LittleEndian>,
    keys: [U32<LittleEndian>; MAX_LEAF_PAIRS],
    values: [U32<LittleEndian>; MAX_LEAF_PAIRS],
}

const _: () = assert!(NODE_HEADER_SIZE + size_of::<LeafData>() <= PAGE_SIZE);

fn check_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );
    let header = NodeHeader::from_page(data)?;
    ensure!(
        header.kind() == NodeKind::Leaf,
        "expected leaf page, got {:?}",
        header.kind()
    );
    Ok(())
}

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        check_page(data)?;
        Ok(Self { data })
    }

    fn payload(&self) -> &LeafData {
        // Length and tag validated in from_page.
        LeafData::ref_from_bytes(&self.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + size_of::<LeafData>()])
            .unwrap()
    }

    pub fn parent_id(&self) -> u32 {
        NodeHeader::from_page(self.data).unwrap().parent_id()
    }

    pub fn len(&self) -> usize {
        self.payload().size.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_at(&self, index: usize) -> u32 {
        self.payload().keys[index].get()
    }

    pub fn value_at(&self, index: usize) -> u32 {
        self.payload().values[index].get()
    }

    /// Linear scan for `key`; the pairs are not sorted between splits.
    pub fn position_of(&self, key: u32) -> Option<usize> {
        let d = self.payload();
        let n = d.size.get() as usize;
        d.keys[..n].iter().position(|k| k.get() == key)
    }

    pub fn lookup(&self, key: u32) -> Option<u32> {
        self.position_of(key).map(|i| self.value_at(i))
    }

    /// Copies the live pairs out of the page.
    pub fn pairs(&self) -> Vec<(u32, u32)> {
        let d = self.payload();
        let n = d.size.get() as usize;
        (0..n)
            .map(|i| (d.keys[i].get(), d.values[i].get()))
            .collect()
    }
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        check_page(data)?;
        Ok(Self { data })
    }

    /// Formats a page as an empty leaf.
    pub fn init(data: &'a mut [u8], parent_id: u32) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );

        let header = NodeHeader::from_page_mut(data)?;
        header.set_kind(NodeKind::Leaf);
        header.set_parent_id(parent_id);

        let mut leaf = Self { data };
        leaf.payload_mut().size = U32::new(0);
        Ok(leaf)
    }

    fn payload(&self) -> &LeafData {
        LeafData::ref_from_bytes(&self.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + size_of::<LeafData>()])
            .unwrap()
    }

    fn payload_mut(&mut self) -> &mut LeafData {
        LeafData::mut_from_bytes(
            &mut self.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + size_of::<LeafData>()],
        )
        .unwrap()
    }

    pub fn len(&self) -> usize {
        self.payload().size.get() as usize
    }

    pub fn key_at(&self, index: usize) -> u32 {
        self.payload().keys[index].get()
    }

    pub fn value_at(&self, index: usize) -> u32 {
        self.payload().values[index].get()
    }

    pub fn position_of(&self, key: u32) -> Option<usize> {
        let d = self.payload();
        let n = d.size.get() as usize;
        d.keys[..n].iter().position(|k| k.get() == key)
    }

    /// Replaces the leaf contents with the given pairs.
    pub fn write_pairs(&mut self, pairs: &[(u32, u32)]) -> Result<()> {
        ensure!(
            pairs.len() <= MAX_LEAF_PAIRS,
            "{} pairs exceed leaf capacity",
            pairs.len()
        );

        let d = self.payload_mut();
        for (i, &(key, value)) in pairs.iter().enumerate() {
            d.keys[i] = U32::new(key);
            d.values[i] = U32::new(value);
        }
        d.size = U32::new(pairs.len() as u32);
        Ok(())
    }

    /// Applies buffered messages from the back of `pending` (oldest
    /// timestamp first), removing each as it lands. Returns `true` when an
    /// insert fills the leaf; the unapplied remainder stays in `pending`.
    pub fn apply(&mut self, pending: &mut Vec<Upsert>) -> Result<bool> {
        while let Some(msg) = pending.last().copied() {
            let key = msg.key();
            let pos = self.position_of(key);

            match msg.kind()? {
                UpsertKind::Insert => {
                    ensure!(pos.is_none(), "inserting an existing key: {}", key);
                    let n = self.len();
                    ensure!(n < MAX_LEAF_PAIRS, "leaf overflow inserting key {}", key);

                    let d = self.payload_mut();
                    d.keys[n] = U32::new(key);
                    d.values[n] = U32::new(msg.parameter());
                    d.size = U32::new(n as u32 + 1);
                    pending.pop();

                    if n + 1 == MAX_LEAF_PAIRS {
                        return Ok(true);
                    }
                }
                UpsertKind::Update => {
                    let Some(i) = pos else {
                        bail!("updating a nonexistent key: {}", key);
                    };
                    self.payload_mut().values[i] = U32::new(msg.parameter());
                    pending.pop();
                }
                UpsertKind::Delete => {
                    let Some(i) = pos else {
                        bail!("deleting a nonexistent key: {}", key);
                    };
                    let n = self.len();
                    let d = self.payload_mut();
                    for j in i + 1..n {
                        d.keys[j - 1] = d.keys[j];
                        d.values[j - 1] = d.values[j];
                    }
                    d.size = U32::new(n as u32 - 1);
                    pending.pop();
                }
                UpsertKind::Invalid => {
                    bail!("invalid upsert kind reached a leaf (key {})", key)
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::upsert::UpsertKind;

    fn leaf_page() -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        LeafNodeMut::init(&mut data, 1).unwrap();
        data
    }

    fn msg(key: u32, kind: UpsertKind, parameter: u32, ts: u32) -> Upsert {
        Upsert::new(key, kind, parameter, ts)
    }

    #[test]
    fn init_produces_empty_leaf() {
        let data = leaf_page();
        let leaf = LeafNode::from_page(&data).unwrap();

        assert_eq!(leaf.len(), 0);
        assert_eq!(leaf.parent_id(), 1);
        assert!(leaf.lookup(5).is_none());
    }

    #[test]
    fn from_page_rejects_interior_pages() {
        let data = vec![0u8; PAGE_SIZE];
        assert!(LeafNode::from_page(&data).is_err());
    }

    #[test]
    fn apply_insert_then_lookup() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();

        let mut pending = vec![
            msg(20, UpsertKind::Insert, 200, 2),
            msg(10, UpsertKind::Insert, 100, 1),
        ];
        let full = leaf.apply(&mut pending).unwrap();

        assert!(!full);
        assert!(pending.is_empty());

        let leaf = LeafNode::from_page(&data).unwrap();
        assert_eq!(leaf.lookup(10), Some(100));
        assert_eq!(leaf.lookup(20), Some(200));
    }

    #[test]
    fn apply_runs_oldest_first() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();

        // Newest first in the vector, as in a flush region.
        let mut pending = vec![
            msg(7, UpsertKind::Update, 3, 9),
            msg(7, UpsertKind::Update, 2, 5),
            msg(7, UpsertKind::Insert, 1, 1),
        ];
        leaf.apply(&mut pending).unwrap();

        let leaf = LeafNode::from_page(&data).unwrap();
        assert_eq!(leaf.lookup(7), Some(3));
    }

    #[test]
    fn apply_delete_shifts_tail() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();
        leaf.write_pairs(&[(1, 10), (2, 20), (3, 30)]).unwrap();

        let mut pending = vec![msg(2, UpsertKind::Delete, 0, 4)];
        leaf.apply(&mut pending).unwrap();

        let leaf = LeafNode::from_page(&data).unwrap();
        assert_eq!(leaf.len(), 2);
        assert_eq!(leaf.lookup(1), Some(10));
        assert!(leaf.lookup(2).is_none());
        assert_eq!(leaf.lookup(3), Some(30));
    }

    #[test]
    fn apply_reports_full_and_keeps_remainder() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();

        let pairs: Vec<(u32, u32)> = (1..MAX_LEAF_PAIRS as u32).map(|k| (k, k)).collect();
        leaf.write_pairs(&pairs).unwrap();

        let mut pending = vec![
            msg(9000, UpsertKind::Insert, 1, 8),
            msg(8000, UpsertKind::Insert, 1, 7),
        ];
        let full = leaf.apply(&mut pending).unwrap();

        assert!(full);
        assert_eq!(leaf.len(), MAX_LEAF_PAIRS);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key(), 9000);
    }

    #[test]
    fn apply_rejects_double_insert() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();
        leaf.write_pairs(&[(5, 50)]).unwrap();

        let mut pending = vec![msg(5, UpsertKind::Insert, 51, 2)];
        let err = leaf.apply(&mut pending).unwrap_err();
        assert!(err.to_string().contains("existing key"));
    }

    #[test]
    fn apply_rejects_update_of_absent_key() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();

        let mut pending = vec![msg(5, UpsertKind::Update, 51, 2)];
        assert!(leaf.apply(&mut pending).is_err());
    }

    #[test]
    fn apply_rejects_delete_of_absent_key() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();

        let mut pending = vec![msg(5, UpsertKind::Delete, 0, 2)];
        assert!(leaf.apply(&mut pending).is_err());
    }

    #[test]
    fn pairs_copies_live_prefix_only() {
        let mut data = leaf_page();
        let mut leaf = LeafNodeMut::from_page(&mut data).unwrap();
        leaf.write_pairs(&[(3, 30), (1, 10)]).unwrap();

        let leaf = LeafNode::from_page(&data).unwrap();
        assert_eq!(leaf.pairs(), vec![(3, 30), (1, 10)]);
    }
}
