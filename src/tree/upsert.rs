//! The buffered update message and its kind tag.
//!
//! Every mutation of the tree travels as a 16-byte `Upsert` record stamped
//! with a monotonically increasing timestamp at ingress. The timestamp is
//! the sole ordering among messages for the same key; messages only move
//! downward, so a match found higher in the tree always supersedes anything
//! below it.

use eyre::{bail, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::UPSERT_SIZE;

/// Sentinel returned by `query` when no live value exists for a key.
/// Reserved: callers must never insert it as a value-bearing key.
pub const KEY_NOT_FOUND: u32 = u32::MAX;

/// Message kinds as stored on disk. `Invalid` is a tombstone used
/// transiently while compacting a buffer during an interior split; it never
/// survives to an observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UpsertKind {
    Insert = 0,
    Delete = 1,
    Update = 2,
    Invalid = 3,
}

impl UpsertKind {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(UpsertKind::Insert),
            1 => Ok(UpsertKind::Delete),
            2 => Ok(UpsertKind::Update),
            3 => Ok(UpsertKind::Invalid),
            _ => bail!("invalid upsert kind: {}", raw),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Upsert {
    key: U32<LittleEndian>,
    kind: U32<LittleEndian>,
    parameter: U32<LittleEndian>,
    timestamp: U32<LittleEndian>,
}

const _: () = assert!(size_of::<Upsert>() == UPSERT_SIZE);

impl Upsert {
    pub fn new(key: u32, kind: UpsertKind, parameter: u32, timestamp: u32) -> Self {
        Self {
            key: U32::new(key),
            kind: U32::new(kind as u32),
            parameter: U32::new(parameter),
            timestamp: U32::new(timestamp),
        }
    }

    pub fn key(&self) -> u32 {
        self.key.get()
    }

    pub fn kind(&self) -> Result<UpsertKind> {
        UpsertKind::from_raw(self.kind.get())
    }

    pub fn parameter(&self) -> u32 {
        self.parameter.get()
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp.get()
    }
}
