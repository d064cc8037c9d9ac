use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::region::Region;

/// SAM-style status flags carried by an aligned read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReadFlags {
    /// Read is not mapped to the reference.
    pub unmapped: bool,
    /// Read is a PCR or optical duplicate.
    pub duplicate: bool,
    /// Read failed platform quality checks.
    pub qc_fail: bool,
    /// Alignment is secondary.
    pub secondary: bool,
    /// Alignment is supplementary.
    pub supplementary: bool,
    /// The mate of a paired read is unmapped.
    pub mate_unmapped: bool,
}

/// An aligned sequencing read with its qualities and flags.
///
/// Reads are totally ordered by `(region, name, sequence)` so merged
/// per-sample lists have a stable order regardless of source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlignedRead {
    name: Arc<str>,
    region: Region,
    sequence: Arc<[u8]>,
    base_qualities: Arc<[u8]>,
    mapping_quality: u8,
    flags: ReadFlags,
}

impl AlignedRead {
    /// Construct a read from its mapped region, sequence, and qualities.
    pub fn new(
        name: impl Into<Arc<str>>,
        region: Region,
        sequence: impl Into<Arc<[u8]>>,
        base_qualities: impl Into<Arc<[u8]>>,
        mapping_quality: u8,
        flags: ReadFlags,
    ) -> Self {
        Self {
            name: name.into(),
            region,
            sequence: sequence.into(),
            base_qualities: base_qualities.into(),
            mapping_quality,
            flags,
        }
    }

    /// Read name (identity within its region).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped reference region.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Read sequence as uppercase ASCII.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Per-base Phred quality scores.
    pub fn base_qualities(&self) -> &[u8] {
        &self.base_qualities
    }

    /// Phred-scaled mapping quality.
    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    /// Status flags.
    pub fn flags(&self) -> ReadFlags {
        self.flags
    }
}

impl PartialOrd for AlignedRead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlignedRead {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region
            .cmp(&other.region)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Per-sample collections of mapped reads, each kept in sorted order.
#[derive(Debug, Clone, Default)]
pub struct ReadMap {
    samples: BTreeMap<String, Vec<AlignedRead>>,
}

impl ReadMap {
    /// An empty read map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample's reads, sorting them.
    pub fn insert(&mut self, sample: impl Into<String>, mut reads: Vec<AlignedRead>) {
        reads.sort();
        self.samples.insert(sample.into(), reads);
    }

    /// Iterate `(sample, reads)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AlignedRead>)> {
        self.samples.iter()
    }

    /// All reads across samples.
    pub fn reads(&self) -> impl Iterator<Item = &AlignedRead> {
        self.samples.values().flatten()
    }

    /// True iff no sample has reads.
    pub fn is_empty(&self) -> bool {
        self.samples.values().all(Vec::is_empty)
    }

    /// True iff any read overlaps `region`.
    pub fn has_overlapped(&self, region: &Region) -> bool {
        self.reads().any(|read| read.region().overlaps(region))
    }

    /// The overlapping read with the smallest begin position.
    pub fn leftmost_overlapped(&self, region: &Region) -> Option<&AlignedRead> {
        self.reads()
            .filter(|read| read.region().overlaps(region))
            .min_by_key(|read| read.region().begin())
    }

    /// The overlapping read with the greatest end position.
    pub fn rightmost_overlapped(&self, region: &Region) -> Option<&AlignedRead> {
        self.reads()
            .filter(|read| read.region().overlaps(region))
            .max_by_key(|read| read.region().end())
    }
}

/// A composable set of read-level acceptance predicates applied between
/// fetching and candidate generation.
#[derive(Debug, Clone)]
pub struct ReadFilterSet {
    require_mapped: bool,
    reject_duplicates: bool,
    reject_qc_fail: bool,
    require_primary: bool,
    require_mapped_mate: bool,
    min_mapping_quality: u8,
}

impl Default for ReadFilterSet {
    fn default() -> Self {
        Self {
            require_mapped: true,
            reject_duplicates: true,
            reject_qc_fail: true,
            require_primary: true,
            require_mapped_mate: false,
            min_mapping_quality: 0,
        }
    }
}

impl ReadFilterSet {
    /// The default filter stack: mapped, non-duplicate, QC-passing, primary.
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter set that accepts everything.
    pub fn permissive() -> Self {
        Self {
            require_mapped: false,
            reject_duplicates: false,
            reject_qc_fail: false,
            require_primary: false,
            require_mapped_mate: false,
            min_mapping_quality: 0,
        }
    }

    /// Require a minimum mapping quality.
    pub fn with_min_mapping_quality(mut self, min: u8) -> Self {
        self.min_mapping_quality = min;
        self
    }

    /// Require the mate of paired reads to be mapped.
    pub fn with_mapped_mate(mut self) -> Self {
        self.require_mapped_mate = true;
        self
    }

    /// Whether `read` passes every predicate in the set.
    pub fn passes(&self, read: &AlignedRead) -> bool {
        let flags = read.flags();
        if self.require_mapped && flags.unmapped {
            return false;
        }
        if self.reject_duplicates && flags.duplicate {
            return false;
        }
        if self.reject_qc_fail && flags.qc_fail {
            return false;
        }
        if self.require_primary && (flags.secondary || flags.supplementary) {
            return false;
        }
        if self.require_mapped_mate && flags.mate_unmapped {
            return false;
        }
        read.mapping_quality() >= self.min_mapping_quality
    }

    /// Retain only passing reads.
    pub fn filter(&self, reads: Vec<AlignedRead>) -> Vec<AlignedRead> {
        reads.into_iter().filter(|r| self.passes(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(name: &str, begin: u32, end: u32) -> AlignedRead {
        AlignedRead::new(
            name,
            Region::new("chr1", begin, end),
            vec![b'A'; (end - begin) as usize],
            vec![30u8; (end - begin) as usize],
            60,
            ReadFlags::default(),
        )
    }

    #[test]
    fn reads_order_by_region_then_name() {
        let mut reads = vec![read("b", 5, 15), read("a", 5, 15), read("z", 0, 10)];
        reads.sort();
        let names: Vec<_> = reads.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["z", "a", "b"]);
    }

    #[test]
    fn read_map_overlap_queries() {
        let mut map = ReadMap::new();
        map.insert("s1", vec![read("a", 0, 10), read("b", 20, 30)]);
        map.insert("s2", vec![read("c", 5, 25)]);
        let region = Region::new("chr1", 8, 22);
        assert!(map.has_overlapped(&region));
        assert_eq!(map.leftmost_overlapped(&region).unwrap().name(), "a");
        assert_eq!(map.rightmost_overlapped(&region).unwrap().name(), "b");
        assert!(!map.has_overlapped(&Region::new("chr1", 40, 50)));
    }

    #[test]
    fn default_filters_reject_flagged_reads() {
        let filters = ReadFilterSet::new().with_min_mapping_quality(20);
        let mut ok = read("a", 0, 10);
        assert!(filters.passes(&ok));
        ok.mapping_quality = 10;
        assert!(!filters.passes(&ok));

        let mut dup = read("b", 0, 10);
        dup.flags.duplicate = true;
        assert!(!filters.passes(&dup));
        assert!(ReadFilterSet::permissive().passes(&dup));
    }
}
