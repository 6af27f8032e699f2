//! Fixed-width hash table of singly-linked chains over [`Arena`] slots.

use codec::RecordType;

use crate::arena::{Arena, EntryIdx};

/// Bucket index for `key` in namespace `record_type`.
///
/// A rolling `h * 33 + byte` over the key (bytes taken as signed), with the
/// record type added before the modulo.
pub(crate) fn bucket_of(key: &[u8], record_type: RecordType, width: usize) -> usize {
    let hash = key.iter().fold(0u32, |h, &b| {
        h.wrapping_shl(5)
            .wrapping_add(h)
            .wrapping_add(b as i8 as u32)
    });
    hash.wrapping_add(record_type.as_u32()) as usize % width
}

#[derive(Debug, Clone, Copy, Default)]
struct Chain {
    head: Option<EntryIdx>,
    tail: Option<EntryIdx>,
}

#[derive(Debug)]
pub(crate) struct Buckets {
    chains: Vec<Chain>,
}

impl Buckets {
    /// `width` must be non-zero.
    pub fn new(width: usize) -> Self {
        Self {
            chains: vec![Chain::default(); width],
        }
    }

    pub fn width(&self) -> usize {
        self.chains.len()
    }

    pub fn bucket(&self, key: &[u8], record_type: RecordType) -> usize {
        bucket_of(key, record_type, self.width())
    }

    pub fn find(
        &self,
        arena: &Arena,
        bucket: usize,
        key: &[u8],
        record_type: RecordType,
    ) -> Option<EntryIdx> {
        self.chain(arena, bucket)
            .find(|&idx| arena.entry(idx).matches(key, record_type))
    }

    pub fn push_front(&mut self, arena: &mut Arena, bucket: usize, idx: EntryIdx) {
        let chain = &mut self.chains[bucket];
        arena.set_chain_next(idx, chain.head);
        chain.head = Some(idx);
        if chain.tail.is_none() {
            chain.tail = Some(idx);
        }
    }

    pub fn push_back(&mut self, arena: &mut Arena, bucket: usize, idx: EntryIdx) {
        let chain = &mut self.chains[bucket];
        arena.set_chain_next(idx, None);
        match chain.tail {
            Some(t) => arena.set_chain_next(t, Some(idx)),
            None => chain.head = Some(idx),
        }
        chain.tail = Some(idx);
    }

    /// Removes `idx` from its chain. Returns `false` if it was not there.
    pub fn remove(&mut self, arena: &mut Arena, bucket: usize, idx: EntryIdx) -> bool {
        let mut prev = None;
        let mut cur = self.chains[bucket].head;
        while let Some(c) = cur {
            if c == idx {
                break;
            }
            prev = cur;
            cur = arena.chain_next(c);
        }
        if cur.is_none() {
            return false;
        }

        let next = arena.chain_next(idx);
        let chain = &mut self.chains[bucket];
        match prev {
            Some(p) => arena.set_chain_next(p, next),
            None => chain.head = next,
        }
        if chain.tail == Some(idx) {
            chain.tail = prev;
        }
        arena.set_chain_next(idx, None);
        true
    }

    /// Entries of one bucket, head first.
    pub fn chain<'a>(&self, arena: &'a Arena, bucket: usize) -> ChainIter<'a> {
        ChainIter {
            arena,
            current: self.chains[bucket].head,
        }
    }

    /// Every entry, bucket by bucket.
    pub fn iter<'a>(&'a self, arena: &'a Arena) -> impl Iterator<Item = EntryIdx> + 'a {
        (0..self.width()).flat_map(move |b| self.chain(arena, b))
    }

    pub fn clear(&mut self) {
        self.chains.iter_mut().for_each(|c| *c = Chain::default());
    }
}

pub(crate) struct ChainIter<'a> {
    arena: &'a Arena,
    current: Option<EntryIdx>,
}

impl Iterator for ChainIter<'_> {
    type Item = EntryIdx;

    fn next(&mut self) -> Option<EntryIdx> {
        let idx = self.current?;
        self.current = self.arena.chain_next(idx);
        Some(idx)
    }
}
