//! Close/reopen round-trips: every durable property of the tree must
//! survive a full shutdown of the process state.

use betree::{BeTree, KEY_NOT_FOUND};
use tempfile::tempdir;

#[test]
fn round_trip_preserves_every_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree");
    let size = 20_000u32;

    {
        let mut tree = BeTree::open(&path).unwrap();
        for i in 1..=size {
            tree.insert(i, i * 2).unwrap();
        }
        for i in (1..=size).step_by(7) {
            tree.update(i, i * 2 + 1).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = BeTree::open(&path).unwrap();
    for i in 1..=size {
        let expected = if (i - 1) % 7 == 0 { i * 2 + 1 } else { i * 2 };
        assert_eq!(tree.query(i).unwrap(), expected, "key {}", i);
    }
    tree.check_invariants().unwrap();
}

#[test]
fn reopen_and_continue_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree");

    {
        let mut tree = BeTree::open(&path).unwrap();
        for i in 1..=5_000u32 {
            tree.insert(i, i).unwrap();
        }
        tree.close().unwrap();
    }

    {
        let mut tree = BeTree::open(&path).unwrap();
        // New messages must order after everything buffered before the
        // reopen, including updates to keys still sitting in interior
        // buffers.
        for i in 1..=5_000u32 {
            tree.update(i, i + 1).unwrap();
        }
        for i in 5_001..=10_000u32 {
            tree.insert(i, i).unwrap();
        }
        for i in (2..=5_000u32).step_by(50) {
            tree.delete(i).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = BeTree::open(&path).unwrap();
    for i in 1..=5_000u32 {
        let expected = if i >= 2 && (i - 2) % 50 == 0 {
            KEY_NOT_FOUND
        } else {
            i + 1
        };
        assert_eq!(tree.query(i).unwrap(), expected, "key {}", i);
    }
    for i in 5_001..=10_000u32 {
        assert_eq!(tree.query(i).unwrap(), i, "key {}", i);
    }
    tree.check_invariants().unwrap();
}

#[test]
fn drop_flushes_like_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree");

    {
        let mut tree = BeTree::open(&path).unwrap();
        for i in 1..=1_000u32 {
            tree.insert(i, i + 7).unwrap();
        }
        // No explicit close; Drop must write the cache and metadata back.
    }

    let mut tree = BeTree::open(&path).unwrap();
    for i in 1..=1_000u32 {
        assert_eq!(tree.query(i).unwrap(), i + 7);
    }
}

#[test]
fn query_leaves_no_dirty_state_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree");

    {
        let mut tree = BeTree::open(&path).unwrap();
        for i in 1..=3_000u32 {
            tree.insert(i, i).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = BeTree::open(&path).unwrap();
    let before = tree.stats().num_writes;
    for i in 1..=3_000u32 {
        assert_eq!(tree.query(i).unwrap(), i);
    }
    tree.flush().unwrap();
    assert_eq!(
        tree.stats().num_writes,
        before,
        "queries must not dirty any page"
    );
}
