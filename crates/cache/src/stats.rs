use std::fmt;
use std::time::{Duration, Instant};

use pipeline::PipelineStats;

/// Running activity counters. Observational only.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Counters {
    pub writes: u64,
    pub reads: u64,
    pub dbreads: u64,
    pub dbwrites: u64,
    pub dels: u64,
    pub rhits: u64,
    pub whits: u64,
    pub fails: u64,
    pub syncs: u64,
    pub since: Instant,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            writes: 0,
            reads: 0,
            dbreads: 0,
            dbwrites: 0,
            dels: 0,
            rhits: 0,
            whits: 0,
            fails: 0,
            syncs: 0,
            since: Instant::now(),
        }
    }
}

/// Snapshot of cache activity since the last reset.
///
/// Reads and read hits are not counted while dumping or in standalone mode,
/// nor are write hits while dumping, so a snapshot pass does not skew the
/// working-set numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// `put` calls that went through the cache.
    pub writes: u64,
    /// `get` calls.
    pub reads: u64,
    /// Misses that consulted the pipeline or disk store.
    pub dbreads: u64,
    /// Values and deletions written below the cache.
    pub dbwrites: u64,
    /// `delete` calls.
    pub dels: u64,
    /// Reads answered from the cache.
    pub rhits: u64,
    /// Writes that replaced a cached entry.
    pub whits: u64,
    /// Reads of keys that exist nowhere.
    pub fails: u64,
    pub syncs: u64,
    /// Bytes of cached values.
    pub size: usize,
    pub budget: usize,
    pub entries: usize,
    pub dirty: usize,
    pub elapsed: Duration,
    pub pipeline: PipelineStats,
}

impl CacheStats {
    /// Percentage of writes that hit a cached entry.
    pub fn write_hit_ratio(&self) -> f64 {
        ratio(self.whits, self.writes)
    }

    /// Percentage of reads answered from the cache.
    pub fn read_hit_ratio(&self) -> f64 {
        ratio(self.rhits, self.reads)
    }
}

fn ratio(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cache Stats      Writes       Reads  (over {} seconds)",
            self.elapsed.as_secs()
        )?;
        writeln!(f, "Calls      {:>12}{:>12}", self.writes, self.reads)?;
        writeln!(f, "Cache Hits {:>12}{:>12}", self.whits, self.rhits)?;
        writeln!(f, "I/O        {:>12}{:>12}", self.dbwrites, self.dbreads)?;
        writeln!(f, "Failed     {:>12}{:>12}", "", self.fails)?;
        writeln!(
            f,
            "Hit ratio  {:>11.0}%{:>11.0}%",
            self.write_hit_ratio(),
            self.read_hit_ratio()
        )?;
        writeln!(f)?;
        writeln!(f, "Deletes    {:>12}", self.dels)?;
        writeln!(f, "Syncs      {:>12}", self.syncs)?;
        writeln!(
            f,
            "Entries    {:>12}  ({} dirty)",
            self.entries, self.dirty
        )?;
        writeln!(
            f,
            "Cache Size {:>12} bytes (budget {})",
            self.size, self.budget
        )?;
        write!(
            f,
            "Pipes      {:>12}  ({} dirty, {} hits, {} faults, {} evictions)",
            self.pipeline.resident,
            self.pipeline.dirty,
            self.pipeline.hits,
            self.pipeline.faults,
            self.pipeline.evictions
        )
    }
}
