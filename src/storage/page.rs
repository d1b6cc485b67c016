//! # Node Header Layout
//!
//! Every page begins with an 8-byte node header that ties the page into the
//! tree. The header is shared by both node layouts; the rest of the page is
//! one of two disjoint payloads selected by the leaf flag.
//!
//! ## Header Layout (8 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -------------------------------------------
//! 0       4     parent_id  Page id of the owning interior node; 0 marks
//!                          the tree root (page ids start at 1).
//! 4       4     is_leaf    0 = interior node, nonzero = leaf node.
//! ```
//!
//! ## Zero-Copy Access
//!
//! `NodeHeader` uses `zerocopy` for safe transmutation from raw page bytes;
//! headers are read and written in place in the block manager's slot
//! buffers without copying. All multi-byte fields are little-endian, so the
//! page image is portable across hosts.
//!
//! The two payload views live with the tree layer (`tree::leaf`,
//! `tree::interior`); this module only knows how to discriminate them.

use eyre::{ensure, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{NODE_HEADER_SIZE, PAGE_SIZE};

/// Discriminates the two payload layouts sharing a page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Interior,
    Leaf,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    parent_id: U32<LittleEndian>,
    is_leaf: U32<LittleEndian>,
}

const _: () = assert!(size_of::<NodeHeader>() == NODE_HEADER_SIZE);

impl NodeHeader {
    pub fn from_page(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            NODE_HEADER_SIZE
        );
        Self::ref_from_bytes(&data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn from_page_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            NODE_HEADER_SIZE
        );
        Self::mut_from_bytes(&mut data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn parent_id(&self) -> u32 {
        self.parent_id.get()
    }

    pub fn set_parent_id(&mut self, id: u32) {
        self.parent_id = U32::new(id);
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_leaf.get() != 0 {
            NodeKind::Leaf
        } else {
            NodeKind::Interior
        }
    }

    pub fn set_kind(&mut self, kind: NodeKind) {
        let flag = match kind {
            NodeKind::Leaf => 1,
            NodeKind::Interior => 0,
        };
        self.is_leaf = U32::new(flag);
    }
}

/// Reads the node kind off a full page image.
pub fn node_kind(data: &[u8]) -> Result<NodeKind> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );
    Ok(NodeHeader::from_page(data)?.kind())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_header_size_is_8_bytes() {
        assert_eq!(size_of::<NodeHeader>(), 8);
    }

    #[test]
    fn node_header_roundtrip_in_place() {
        let mut data = [0u8; PAGE_SIZE];

        {
            let header = NodeHeader::from_page_mut(&mut data).unwrap();
            header.set_parent_id(42);
            header.set_kind(NodeKind::Leaf);
        }

        assert_eq!(data[0], 42);
        assert_eq!(data[4], 1);

        let header = NodeHeader::from_page(&data).unwrap();
        assert_eq!(header.parent_id(), 42);
        assert_eq!(header.kind(), NodeKind::Leaf);
    }

    #[test]
    fn zeroed_page_reads_as_interior_root() {
        let data = [0u8; PAGE_SIZE];
        let header = NodeHeader::from_page(&data).unwrap();

        assert_eq!(header.parent_id(), 0);
        assert_eq!(header.kind(), NodeKind::Interior);
    }

    #[test]
    fn node_header_from_short_buffer_fails() {
        let data = [0u8; 4];
        let result = NodeHeader::from_page(&data);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("buffer too small"));
    }

    #[test]
    fn node_kind_requires_full_page() {
        let data = [0u8; 100];
        assert!(node_kind(&data).is_err());
    }

    #[test]
    fn is_leaf_any_nonzero_value_means_leaf() {
        let mut data = [0u8; PAGE_SIZE];
        data[4] = 0xAB;
        data[6] = 0x01;

        assert_eq!(node_kind(&data).unwrap(), NodeKind::Leaf);
    }
}
