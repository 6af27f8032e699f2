//! Entry storage and the global recency list.
//!
//! Entries live in a slab addressed by [`EntryIdx`]. Each slot carries the
//! links for two orthogonal lists: the doubly-linked LRU list (owned here)
//! and the singly-linked hash chain of its bucket (owned by
//! [`Buckets`](crate::buckets::Buckets), which only reads and writes the
//! `chain` link through this type). Freed slots are recycled.

use bytes::Bytes;
use codec::RecordType;

/// Handle to a slot in the [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryIdx(usize);

/// One cached key and its (possibly pending) value.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub key: Vec<u8>,
    pub record_type: RecordType,
    /// `None` is a staged deletion.
    pub value: Option<Bytes>,
    pub dirty: bool,
}

impl Entry {
    /// Bytes this entry counts against the size budget.
    pub fn size(&self) -> usize {
        self.value.as_ref().map_or(0, Bytes::len)
    }

    pub fn matches(&self, key: &[u8], record_type: RecordType) -> bool {
        self.record_type == record_type && self.key == key
    }

    fn vacant() -> Self {
        Self {
            key: Vec::new(),
            record_type: RecordType::EMPTY,
            value: None,
            dirty: false,
        }
    }
}

#[derive(Debug)]
struct Node {
    entry: Entry,
    prev: Option<EntryIdx>,
    next: Option<EntryIdx>,
    chain: Option<EntryIdx>,
    in_lru: bool,
}

/// Slab of entries threaded by an LRU list (head = least recently used).
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
    free: Vec<EntryIdx>,
    head: Option<EntryIdx>,
    tail: Option<EntryIdx>,
    live: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Stores `entry` in a free slot. The entry starts on no list.
    pub fn alloc(&mut self, entry: Entry) -> EntryIdx {
        let node = Node {
            entry,
            prev: None,
            next: None,
            chain: None,
            in_lru: false,
        };
        self.live += 1;
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx.0] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                EntryIdx(self.nodes.len() - 1)
            }
        }
    }

    /// Unlinks the entry from the LRU list, frees its slot and returns it.
    ///
    /// The caller must already have removed it from its hash chain.
    pub fn release(&mut self, idx: EntryIdx) -> Entry {
        self.unlink(idx);
        let node = &mut self.nodes[idx.0];
        node.chain = None;
        self.free.push(idx);
        self.live -= 1;
        std::mem::replace(&mut node.entry, Entry::vacant())
    }

    pub fn entry(&self, idx: EntryIdx) -> &Entry {
        &self.nodes[idx.0].entry
    }

    pub fn entry_mut(&mut self, idx: EntryIdx) -> &mut Entry {
        &mut self.nodes[idx.0].entry
    }

    pub fn chain_next(&self, idx: EntryIdx) -> Option<EntryIdx> {
        self.nodes[idx.0].chain
    }

    pub fn set_chain_next(&mut self, idx: EntryIdx, next: Option<EntryIdx>) {
        self.nodes[idx.0].chain = next;
    }

    /// Least recently used entry.
    pub fn front(&self) -> Option<EntryIdx> {
        self.head
    }

    /// Links an unlinked entry at the most recently used end.
    pub fn push_back(&mut self, idx: EntryIdx) {
        debug_assert!(!self.nodes[idx.0].in_lru);
        let old_tail = self.tail;
        {
            let node = &mut self.nodes[idx.0];
            node.prev = old_tail;
            node.next = None;
            node.in_lru = true;
        }
        match old_tail {
            Some(t) => self.nodes[t.0].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Links an unlinked entry at the least recently used end.
    pub fn push_front(&mut self, idx: EntryIdx) {
        debug_assert!(!self.nodes[idx.0].in_lru);
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx.0];
            node.prev = None;
            node.next = old_head;
            node.in_lru = true;
        }
        match old_head {
            Some(h) => self.nodes[h.0].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// Takes the entry off the LRU list. No-op if it is not on it.
    pub fn unlink(&mut self, idx: EntryIdx) {
        let (prev, next) = {
            let node = &mut self.nodes[idx.0];
            if !node.in_lru {
                return;
            }
            node.in_lru = false;
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(p) => self.nodes[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.0].prev = prev,
            None => self.tail = prev,
        }
    }

    pub fn move_to_back(&mut self, idx: EntryIdx) {
        if self.tail != Some(idx) {
            self.unlink(idx);
            self.push_back(idx);
        }
    }

    pub fn move_to_front(&mut self, idx: EntryIdx) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Entries from least to most recently used.
    pub fn lru(&self) -> LruIter<'_> {
        LruIter {
            arena: self,
            current: self.head,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

pub(crate) struct LruIter<'a> {
    arena: &'a Arena,
    current: Option<EntryIdx>,
}

impl Iterator for LruIter<'_> {
    type Item = EntryIdx;

    fn next(&mut self) -> Option<EntryIdx> {
        let idx = self.current?;
        self.current = self.arena.nodes[idx.0].next;
        Some(idx)
    }
}
