//! # Tree Metadata File
//!
//! A tree directory holds one small `meta` file besides the numbered page
//! files. It records what cannot be rediscovered from the pages alone: the
//! current root, how many pages have been allocated, and the next message
//! timestamp. It is rewritten on every flush and validated on open.
//!
//! ## Layout (32 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  -----------------------------------------
//! 0       16    magic           "BeTree Index" + NUL padding
//! 16      4     version         Format version (currently 1)
//! 20      4     root_id         Page id of the tree root
//! 24      4     num_blocks      Highest allocated page id
//! 28      4     next_timestamp  Next upsert timestamp to assign
//! ```
//!
//! Persisting `next_timestamp` is what keeps message ordering monotone
//! across a close/reopen cycle; without it a reopened tree would stamp new
//! messages below ones still buffered in interior nodes.

use std::fs;
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const META_FILE_NAME: &str = "meta";
pub const META_MAGIC: &[u8; 16] = b"BeTree Index\x00\x00\x00\x00";
pub const CURRENT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TreeMeta {
    magic: [u8; 16],
    version: U32<LittleEndian>,
    root_id: U32<LittleEndian>,
    num_blocks: U32<LittleEndian>,
    next_timestamp: U32<LittleEndian>,
}

const _: () = assert!(size_of::<TreeMeta>() == 32);

impl TreeMeta {
    pub fn new(root_id: u32, num_blocks: u32, next_timestamp: u32) -> Self {
        Self {
            magic: *META_MAGIC,
            version: U32::new(CURRENT_VERSION),
            root_id: U32::new(root_id),
            num_blocks: U32::new(num_blocks),
            next_timestamp: U32::new(next_timestamp),
        }
    }

    pub fn root_id(&self) -> u32 {
        self.root_id.get()
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks.get()
    }

    pub fn next_timestamp(&self) -> u32 {
        self.next_timestamp.get()
    }

    /// Loads the metadata of an existing tree, or returns `None` when the
    /// directory holds no `meta` file yet.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(META_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(&path).wrap_err_with(|| format!("failed to read {:?}", path))?;
        ensure!(
            data.len() == size_of::<Self>(),
            "meta file has wrong size: {} != {}",
            data.len(),
            size_of::<Self>()
        );

        let meta = Self::read_from_bytes(&data[..])
            .map_err(|e| eyre::eyre!("failed to parse meta file: {:?}", e))?;

        ensure!(&meta.magic == META_MAGIC, "meta file magic mismatch");
        ensure!(
            meta.version.get() == CURRENT_VERSION,
            "unsupported meta version: {}",
            meta.version.get()
        );
        ensure!(meta.root_id() != 0, "meta file names no root page");

        Ok(Some(meta))
    }

    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = dir.join(META_FILE_NAME);
        fs::write(&path, self.as_bytes()).wrap_err_with(|| format!("failed to write {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn meta_roundtrip() {
        let dir = tempdir().unwrap();

        let meta = TreeMeta::new(7, 12, 99);
        meta.store(dir.path()).unwrap();

        let loaded = TreeMeta::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.root_id(), 7);
        assert_eq!(loaded.num_blocks(), 12);
        assert_eq!(loaded.next_timestamp(), 99);
    }

    #[test]
    fn load_missing_meta_returns_none() {
        let dir = tempdir().unwrap();
        assert!(TreeMeta::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = tempdir().unwrap();

        let mut bytes = TreeMeta::new(1, 3, 1).as_bytes().to_vec();
        bytes[0] ^= 0xFF;
        fs::write(dir.path().join(META_FILE_NAME), &bytes).unwrap();

        assert!(TreeMeta::load(dir.path()).is_err());
    }

    #[test]
    fn load_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(META_FILE_NAME), b"short").unwrap();

        assert!(TreeMeta::load(dir.path()).is_err());
    }
}
