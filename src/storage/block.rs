//! # Block Manager
//!
//! Owns the fixed array of in-memory page buffers and mediates all disk
//! I/O. Every page of the tree lives in its own backing file under the
//! tree's directory, named by its decimal page id; in memory a page
//! occupies one of `capacity` pre-allocated slot buffers assigned by the
//! LRU index.
//!
//! ## Slot Protocol
//!
//! ```text
//! open_block(id)
//!   ├── resident?  -> promote recency, return slot
//!   └── miss       -> LRU assigns a slot
//!         ├── victim named and dirty -> write victim's buffer to its file
//!         ├── zero-fill the slot
//!         └── read the page's backing file into it
//!             (a newly created page has an empty file and reads as zeros)
//! ```
//!
//! A slot index returned by `open_block` is only valid until the next call
//! that may evict; callers resolve a slot, use it through `frame` /
//! `frame_mut`, and re-resolve after any other block operation.
//!
//! ## Write-Back
//!
//! Frames carry a dirty flag set by mutable access. Clean victims are
//! dropped without I/O; dirty ones are written back before their slot is
//! reused, and `flush_all` writes every dirty resident (shutdown path).
//!
//! ## Failure Model
//!
//! Any I/O failure is fatal: errors propagate to the caller and no repair
//! is attempted. `num_reads` and `num_writes` count page-file transfers for
//! observability.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use tracing::trace;

use super::lru::LruCache;
use crate::config::PAGE_SIZE;

struct Frame {
    buf: Box<[u8; PAGE_SIZE]>,
    dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            buf: Box::new([0u8; PAGE_SIZE]),
            dirty: false,
        }
    }
}

pub struct BlockManager {
    dir: PathBuf,
    frames: Vec<Frame>,
    cache: LruCache,
    num_blocks: u32,
    num_reads: u64,
    num_writes: u64,
}

impl BlockManager {
    /// Opens a block store rooted at `dir`, creating the directory if
    /// needed. `num_blocks` is the highest page id already allocated (0 for
    /// a fresh store).
    pub fn open<P: AsRef<Path>>(dir: P, capacity: usize, num_blocks: u32) -> Result<Self> {
        ensure!(capacity >= 1, "cache capacity must be at least 1");

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create block store directory {:?}", dir))?;

        let frames = (0..capacity).map(|_| Frame::new()).collect();

        Ok(Self {
            dir,
            frames,
            cache: LruCache::new(capacity),
            num_blocks,
            num_reads: 0,
            num_writes: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Highest page id allocated so far.
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    pub fn num_writes(&self) -> u64 {
        self.num_writes
    }

    pub fn resident_pages(&self) -> usize {
        self.cache.len()
    }

    fn block_path(&self, id: u32) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Allocates a fresh page id and creates its (empty) backing file. The
    /// page becomes resident on first `open_block`; until written it reads
    /// as all zeros.
    pub fn create_block(&mut self) -> Result<u32> {
        let id = self
            .num_blocks
            .checked_add(1)
            .ok_or_else(|| eyre::eyre!("page id space exhausted"))?;

        File::create(self.block_path(id))
            .wrap_err_with(|| format!("failed to create backing file for page {}", id))?;

        self.num_blocks = id;
        Ok(id)
    }

    /// Removes a page's backing file. The core tree never frees pages; the
    /// capability exists for whole-tree teardown. The id must not be opened
    /// again afterwards.
    pub fn delete_block(&mut self, id: u32) -> Result<()> {
        fs::remove_file(self.block_path(id))
            .wrap_err_with(|| format!("failed to delete backing file for page {}", id))
    }

    /// Resolves a page id to its in-memory slot, reading it from disk (and
    /// possibly writing back an eviction victim) on a miss.
    pub fn open_block(&mut self, id: u32) -> Result<usize> {
        ensure!(
            id != 0 && id <= self.num_blocks,
            "page id {} out of range (allocated: {})",
            id,
            self.num_blocks
        );

        if let Some(slot) = self.cache.get(id) {
            return Ok(slot);
        }

        let (slot, evicted) = self.cache.put(id);
        if evicted != 0 && self.frames[slot].dirty {
            trace!(page = evicted, slot, "writing back evicted page");
            self.write_frame(evicted, slot)?;
        }

        self.frames[slot].buf.fill(0);
        self.frames[slot].dirty = false;
        self.read_frame(id, slot)?;

        Ok(slot)
    }

    /// Read access to a resolved slot.
    pub fn frame(&self, slot: usize) -> &[u8] {
        &self.frames[slot].buf[..]
    }

    /// Write access to a resolved slot; marks the page dirty.
    pub fn frame_mut(&mut self, slot: usize) -> &mut [u8] {
        self.frames[slot].dirty = true;
        &mut self.frames[slot].buf[..]
    }

    /// Writes every dirty resident page back to its file.
    pub fn flush_all(&mut self) -> Result<()> {
        let dirty: Vec<(u32, usize)> = self
            .cache
            .residents()
            .filter(|&(_, slot)| self.frames[slot].dirty)
            .collect();

        for (id, slot) in dirty {
            self.write_frame(id, slot)?;
            self.frames[slot].dirty = false;
        }
        Ok(())
    }

    fn write_frame(&mut self, id: u32, slot: usize) -> Result<()> {
        fs::write(self.block_path(id), &self.frames[slot].buf[..])
            .wrap_err_with(|| format!("failed to write page {} to disk", id))?;
        self.num_writes += 1;
        Ok(())
    }

    fn read_frame(&mut self, id: u32, slot: usize) -> Result<()> {
        let data = fs::read(self.block_path(id))
            .wrap_err_with(|| format!("failed to read page {} from disk", id))?;
        ensure!(
            data.len() <= PAGE_SIZE,
            "backing file for page {} exceeds page size: {}",
            id,
            data.len()
        );

        self.frames[slot].buf[..data.len()].copy_from_slice(&data);
        self.num_reads += 1;
        Ok(())
    }
}
