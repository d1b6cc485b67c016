//! # LRU Page Index
//!
//! A bounded map from page id to in-memory slot index with strict
//! least-recently-used eviction order. This is the residency index of the
//! block manager: it decides which of the fixed page buffers holds which
//! page, and which page gives up its buffer when a new one must come in.
//!
//! ## Why strict LRU?
//!
//! The tree's access pattern is a root-to-leaf walk repeated around a small
//! working set (root, descent path, current child, at most one sibling under
//! construction). Strict recency keeps exactly that path resident; there are
//! no scans that could sweep the cache, so approximations like second-chance
//! or SIEVE buy nothing here.
//!
//! ## Structure
//!
//! ```text
//! LruCache
//! ├── entries: Vec<Entry>          entry i owns slot i; prev/next weave the
//! │                                recency list through the vector
//! ├── map: HashMap<u32, usize>     page id -> entry/slot index
//! ├── head                         most recently used
//! └── tail                         least recently used (eviction victim)
//! ```
//!
//! Entries are appended until capacity is reached, so slot indices in use
//! always form the prefix `[0, len)`; afterwards the victim's entry (and
//! slot) is reused in place. Every operation is O(1).
//!
//! ## Recency
//!
//! - `get` promotes a hit to most-recently-used.
//! - `put` behaves like `get` when the id is resident; otherwise it assigns
//!   a slot (fresh or evicted) and the new entry becomes most-recently-used.
//!
//! Residents can be iterated (unordered) for the shutdown write-back.

use hashbrown::HashMap;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Entry {
    id: u32,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct LruCache {
    capacity: usize,
    entries: Vec<Entry>,
    map: HashMap<u32, usize>,
    head: usize,
    tail: usize,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "LRU capacity must be at least 1");
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            map: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the slot of a resident page and promotes it to
    /// most-recently-used.
    pub fn get(&mut self, id: u32) -> Option<usize> {
        let idx = *self.map.get(&id)?;
        self.detach(idx);
        self.push_front(idx);
        Some(idx)
    }

    /// Ensures `id` has a slot. Returns `(slot, evicted_id)` where
    /// `evicted_id` is 0 unless a resident page had to give up its slot
    /// (page ids are never 0).
    pub fn put(&mut self, id: u32) -> (usize, u32) {
        debug_assert!(id != 0, "page id 0 is reserved");

        if let Some(slot) = self.get(id) {
            return (slot, 0);
        }

        if self.entries.len() < self.capacity {
            let idx = self.entries.len();
            self.entries.push(Entry {
                id,
                prev: NIL,
                next: NIL,
            });
            self.push_front(idx);
            self.map.insert(id, idx);
            return (idx, 0);
        }

        let victim = self.tail;
        let evicted = self.entries[victim].id;
        self.map.remove(&evicted);
        self.detach(victim);

        self.entries[victim].id = id;
        self.push_front(victim);
        self.map.insert(id, victim);
        (victim, evicted)
    }

    /// Iterates the resident pages as `(id, slot)` pairs, in slot order.
    pub fn residents(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.entries.iter().enumerate().map(|(i, e)| (e.id, i))
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.entries[idx].prev, self.entries[idx].next);
        if prev != NIL {
            self.entries[prev].next = next;
        } else if self.head == idx {
            self.head = next;
        }
        if next != NIL {
            self.entries[next].prev = prev;
        } else if self.tail == idx {
            self.tail = prev;
        }
        self.entries[idx].prev = NIL;
        self.entries[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.entries[idx].prev = NIL;
        self.entries[idx].next = self.head;
        if self.head != NIL {
            self.entries[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_assigned_as_prefix_until_capacity() {
        let mut lru = LruCache::new(3);

        assert_eq!(lru.put(10), (0, 0));
        assert_eq!(lru.put(20), (1, 0));
        assert_eq!(lru.put(30), (2, 0));
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn get_miss_returns_none() {
        let mut lru = LruCache::new(2);
        assert!(lru.get(7).is_none());
    }

    #[test]
    fn put_existing_id_is_a_hit_without_eviction() {
        let mut lru = LruCache::new(2);

        lru.put(10);
        lru.put(20);
        assert_eq!(lru.put(10), (0, 0));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn eviction_picks_least_recently_used() {
        let mut lru = LruCache::new(2);

        lru.put(10);
        lru.put(20);

        // 10 is LRU; putting 30 must evict it and reuse slot 0.
        assert_eq!(lru.put(30), (0, 10));
        assert!(lru.get(10).is_none());
        assert_eq!(lru.get(20), Some(1));
        assert_eq!(lru.get(30), Some(0));
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut lru = LruCache::new(2);

        lru.put(10);
        lru.put(20);
        lru.get(10);

        // 20 is now LRU.
        assert_eq!(lru.put(30), (1, 20));
        assert_eq!(lru.get(10), Some(0));
    }

    #[test]
    fn put_hit_also_promotes() {
        let mut lru = LruCache::new(2);

        lru.put(10);
        lru.put(20);
        lru.put(10);

        assert_eq!(lru.put(30), (1, 20));
    }

    #[test]
    fn capacity_one_always_evicts() {
        let mut lru = LruCache::new(1);

        assert_eq!(lru.put(10), (0, 0));
        assert_eq!(lru.put(20), (0, 10));
        assert_eq!(lru.put(30), (0, 20));
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn residents_cover_every_slot_exactly_once() {
        let mut lru = LruCache::new(3);

        lru.put(10);
        lru.put(20);
        lru.put(30);
        lru.put(40); // evicts 10

        let mut seen: Vec<(u32, usize)> = lru.residents().collect();
        seen.sort();
        assert_eq!(seen, vec![(20, 1), (30, 2), (40, 0)]);
    }

    #[test]
    fn sustained_churn_keeps_one_slot_per_id() {
        let mut lru = LruCache::new(4);

        for id in 1..=100u32 {
            let (slot, evicted) = lru.put(id);
            assert!(slot < 4);
            if id > 4 {
                assert_eq!(evicted, id - 4);
            }
        }

        assert_eq!(lru.len(), 4);
        let mut ids: Vec<u32> = lru.residents().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec![97, 98, 99, 100]);
    }
}
