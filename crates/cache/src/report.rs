//! Operator listings of cached attribute entries.
//!
//! Only attribute entries holding a value are listed. "Active" entries are
//! clean; "modified" entries are dirty and not yet written below the cache.

use std::collections::BTreeMap;
use std::fmt;

use codec::AttrKey;
use store::DiskStore;

use crate::Cache;

/// Cached attributes of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLine {
    pub object: u32,
    pub attrs: usize,
    pub bytes: usize,
}

/// Cached attribute entries grouped by object, in object order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectReport {
    pub active: Vec<ObjectLine>,
    pub modified: Vec<ObjectLine>,
}

/// One cached attribute entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLine {
    pub key: AttrKey,
    pub bytes: usize,
    pub dirty: bool,
}

impl<S: DiskStore> Cache<S> {
    /// Attribute entries with a value, in bucket order.
    pub fn cached_attributes(&self) -> Vec<AttributeLine> {
        self.buckets
            .iter(&self.arena)
            .filter_map(|idx| {
                let entry = self.arena.entry(idx);
                if !entry.record_type.is_attribute() {
                    return None;
                }
                let bytes = entry.value.as_ref()?.len();
                Some(AttributeLine {
                    key: AttrKey::from_bytes(&entry.key)?,
                    bytes,
                    dirty: entry.dirty,
                })
            })
            .collect()
    }

    /// Per-object counts and sizes of cached attribute entries.
    pub fn cached_objects(&self) -> ObjectReport {
        let mut active: BTreeMap<u32, ObjectLine> = BTreeMap::new();
        let mut modified: BTreeMap<u32, ObjectLine> = BTreeMap::new();
        for line in self.cached_attributes() {
            let side = if line.dirty { &mut modified } else { &mut active };
            let obj = side.entry(line.key.object).or_insert(ObjectLine {
                object: line.key.object,
                attrs: 0,
                bytes: 0,
            });
            obj.attrs += 1;
            obj.bytes += line.bytes;
        }
        ObjectReport {
            active: active.into_values().collect(),
            modified: modified.into_values().collect(),
        }
    }
}

fn totals(lines: &[ObjectLine]) -> (usize, usize) {
    lines
        .iter()
        .fold((0, 0), |(a, b), l| (a + l.attrs, b + l.bytes))
}

impl fmt::Display for ObjectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Active Cache:", &self.active),
            ("Modified Active Cache:", &self.modified),
        ];
        for (title, lines) in sections {
            writeln!(f, "{}", title)?;
            writeln!(f, "Dbref      Attrs      Size")?;
            writeln!(f, "==========================")?;
            for l in lines {
                writeln!(f, "#{:<8} {:>6} {:>9}", l.object, l.attrs, l.bytes)?;
            }
            writeln!(f)?;
        }
        let (aco, asize) = totals(&self.active);
        let (maco, msize) = totals(&self.modified);
        writeln!(
            f,
            "Totals: active {} ({} attrs), modified active {} ({} attrs), total attrs {}",
            self.active.len(),
            aco,
            self.modified.len(),
            maco,
            aco + maco
        )?;
        write!(
            f,
            "Size: active {} bytes, modified active {} bytes",
            asize, msize
        )
    }
}

impl fmt::Display for AttributeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<8} {:>9} {:>8}{}",
            self.key.object,
            self.key.attr,
            self.bytes,
            if self.dirty { "  *" } else { "" }
        )
    }
}
