use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::read::AlignedRead;
use crate::region::Region;

use super::bam::BamReadFileFactory;
use super::reader::{ReadFileFactory, ReadFileReader, ReadIoError, SampleName};

/// Open/closed partition of the managed readers. The open map is keyed by
/// `(file_size, path)`, so iteration (and eviction) proceeds smallest file
/// first: small files are the cheapest to reopen later.
struct ReaderState {
    open: BTreeMap<(u64, PathBuf), Box<dyn ReadFileReader>>,
    closed: BTreeSet<PathBuf>,
}

impl ReaderState {
    fn is_open(&self, path: &Path) -> bool {
        !self.closed.contains(path)
    }
}

/// Sample- and region-indexed cache over many indexed read files, subject
/// to a hard open-file budget.
///
/// Construction scans every file's metadata once (opening transiently) and
/// then keeps the `max_open_files` smallest files open. Queries touch only
/// the files whose samples and indexed regions can satisfy them, opening
/// and evicting readers as needed. Concurrent queries are serialised by an
/// internal mutex; the invariants (partition, budget, size ordering) hold
/// at every step.
pub struct ReadManager {
    max_open_files: usize,
    samples: Vec<SampleName>,
    reader_paths_containing_sample: HashMap<SampleName, Vec<PathBuf>>,
    possible_regions_in_readers: HashMap<PathBuf, HashMap<Arc<str>, Vec<Region>>>,
    file_sizes: HashMap<PathBuf, u64>,
    factory: Box<dyn ReadFileFactory>,
    state: Mutex<ReaderState>,
}

impl ReadManager {
    /// Manage the given BAM files with at most `max_open_files` open.
    pub fn new(paths: Vec<PathBuf>, max_open_files: usize) -> Result<Self, ReadIoError> {
        Self::with_factory(paths, max_open_files, Box::new(BamReadFileFactory))
    }

    /// Manage files opened through a custom factory (used by tests to
    /// register mock files).
    pub fn with_factory(
        paths: Vec<PathBuf>,
        max_open_files: usize,
        factory: Box<dyn ReadFileFactory>,
    ) -> Result<Self, ReadIoError> {
        assert!(max_open_files >= 1, "at least one reader must fit");
        let mut file_sizes = HashMap::with_capacity(paths.len());
        let mut reader_paths_containing_sample: HashMap<SampleName, Vec<PathBuf>> = HashMap::new();
        let mut possible_regions_in_readers: HashMap<PathBuf, HashMap<Arc<str>, Vec<Region>>> =
            HashMap::new();

        for path in &paths {
            file_sizes.insert(path.clone(), factory.file_size(path)?);
            let reader = factory.open(path)?;
            let regions = match reader.mapped_regions() {
                Some(regions) => regions,
                None => {
                    let contigs = reader
                        .mapped_contigs()
                        .unwrap_or_else(|| reader.reference_contigs());
                    spanning_regions(&contigs, reader.as_ref())
                }
            };
            let by_contig = possible_regions_in_readers.entry(path.clone()).or_default();
            for region in regions {
                by_contig
                    .entry(Arc::clone(region.contig()))
                    .or_default()
                    .push(region);
            }
            for sample in reader.extract_samples() {
                reader_paths_containing_sample
                    .entry(sample)
                    .or_default()
                    .push(path.clone());
            }
            // Reader closes on drop; only metadata is kept.
        }

        let mut samples: Vec<SampleName> =
            reader_paths_containing_sample.keys().cloned().collect();
        samples.sort();

        let mut manager = Self {
            max_open_files,
            samples,
            reader_paths_containing_sample,
            possible_regions_in_readers,
            file_sizes,
            factory,
            state: Mutex::new(ReaderState {
                open: BTreeMap::new(),
                closed: paths.iter().cloned().collect(),
            }),
        };
        manager.open_initial_files(&paths)?;
        Ok(manager)
    }

    fn open_initial_files(&mut self, paths: &[PathBuf]) -> Result<(), ReadIoError> {
        let mut by_size: Vec<PathBuf> = paths.to_vec();
        by_size.sort_by_key(|p| (self.file_sizes[p], p.clone()));
        by_size.truncate(self.max_open_files);
        let mut state = self.state.lock().expect("read manager state");
        for path in by_size {
            let reader = self.factory.open(&path)?;
            state.open.insert((self.file_sizes[&path], path.clone()), reader);
            state.closed.remove(&path);
        }
        Ok(())
    }

    /// All samples across the managed files, sorted.
    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    /// Number of managed files.
    pub fn num_files(&self) -> usize {
        self.file_sizes.len()
    }

    /// Number of distinct samples.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Number of currently open readers.
    pub fn num_open_readers(&self) -> usize {
        self.state.lock().expect("read manager state").open.len()
    }

    /// Paths of the open readers, smallest file first.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .expect("read manager state")
            .open
            .keys()
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Whether the open/closed bookkeeping is consistent with the budget.
    pub fn good(&self) -> bool {
        let state = self.state.lock().expect("read manager state");
        state.open.len() <= self.max_open_files
            && state.open.len() + state.closed.len() == self.num_files()
    }

    /// Whether any read of the given samples overlaps `region`.
    pub fn has_reads(
        &self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<bool, ReadIoError> {
        let mut found = false;
        self.visit_candidate_readers(samples, region, &mut |reader| {
            found = reader.has_reads(samples, region)?;
            Ok(found)
        })?;
        Ok(found)
    }

    /// Whether any read of any sample overlaps `region`.
    pub fn has_reads_in(&self, region: &Region) -> Result<bool, ReadIoError> {
        self.has_reads(&self.samples.clone(), region)
    }

    /// Number of reads of the given samples overlapping `region`.
    pub fn count_reads(
        &self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<usize, ReadIoError> {
        let mut total = 0usize;
        self.visit_candidate_readers(samples, region, &mut |reader| {
            total += reader.count_reads(samples, region)?;
            Ok(false)
        })?;
        Ok(total)
    }

    /// Number of reads of any sample overlapping `region`.
    pub fn count_reads_in(&self, region: &Region) -> Result<usize, ReadIoError> {
        self.count_reads(&self.samples.clone(), region)
    }

    /// Fetch reads per sample, merged across files into sorted lists.
    /// Every requested sample is present in the result, possibly empty.
    pub fn fetch_reads(
        &self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<BTreeMap<SampleName, Vec<AlignedRead>>, ReadIoError> {
        let mut result: BTreeMap<SampleName, Vec<AlignedRead>> = samples
            .iter()
            .map(|sample| (sample.clone(), Vec::new()))
            .collect();
        self.visit_candidate_readers(samples, region, &mut |reader| {
            for (sample, reads) in reader.fetch_reads(samples, region)? {
                if let Some(existing) = result.get_mut(&sample) {
                    merge_sorted(existing, reads);
                }
            }
            Ok(false)
        })?;
        Ok(result)
    }

    /// Fetch reads of every sample overlapping `region`.
    pub fn fetch_reads_in(
        &self,
        region: &Region,
    ) -> Result<BTreeMap<SampleName, Vec<AlignedRead>>, ReadIoError> {
        self.fetch_reads(&self.samples.clone(), region)
    }

    /// The prefix of `region` holding at most `max_reads` pooled read start
    /// positions: the cut falls directly after the `max_reads`-th start.
    pub fn find_covered_subregion(
        &self,
        samples: &[SampleName],
        region: &Region,
        max_reads: usize,
    ) -> Result<Region, ReadIoError> {
        if samples.is_empty() || region.is_empty() {
            return Ok(region.clone());
        }
        let mut positions: Vec<u32> = Vec::new();
        self.visit_candidate_readers(samples, region, &mut |reader| {
            // One extra position per reader distinguishes "fits exactly"
            // from "more to come".
            positions.extend(reader.extract_read_positions(samples, region, max_reads + 1)?);
            Ok(false)
        })?;
        positions.sort_unstable();
        if positions.len() <= max_reads {
            return Ok(region.clone());
        }
        if max_reads == 0 {
            return Ok(region.head());
        }
        let last_included = positions[max_reads - 1];
        let first_excluded = positions[max_reads];
        let end = if last_included < first_excluded {
            last_included + 1
        } else {
            // The cut position is tied; it must be excluded entirely.
            last_included
        };
        let end = end.clamp(region.begin(), region.end());
        Ok(Region::new(
            Arc::clone(region.contig()),
            region.begin(),
            end,
        ))
    }

    // scheduling

    fn could_reader_contain_region(&self, path: &Path, region: &Region) -> bool {
        self.possible_regions_in_readers
            .get(path)
            .and_then(|by_contig| by_contig.get(region.contig()))
            .is_some_and(|regions| regions.iter().any(|r| r.overlaps(region)))
    }

    fn candidate_paths(&self, samples: &[SampleName], region: &Region) -> Vec<PathBuf> {
        let mut result: Vec<PathBuf> = Vec::new();
        for sample in samples {
            let Some(paths) = self.reader_paths_containing_sample.get(sample) else {
                continue;
            };
            for path in paths {
                if !result.contains(path) && self.could_reader_contain_region(path, region) {
                    result.push(path.clone());
                }
            }
        }
        result
    }

    /// Run `visit` over every candidate reader for the query, opening
    /// closed readers in batches as budget allows. The visitor returns
    /// `true` to stop early.
    fn visit_candidate_readers(
        &self,
        samples: &[SampleName],
        region: &Region,
        visit: &mut dyn FnMut(&mut dyn ReadFileReader) -> Result<bool, ReadIoError>,
    ) -> Result<(), ReadIoError> {
        let mut candidates = self.candidate_paths(samples, region);
        let mut state = self.state.lock().expect("read manager state");
        while !candidates.is_empty() {
            let (open_now, closed): (Vec<PathBuf>, Vec<PathBuf>) = candidates
                .into_iter()
                .partition(|path| state.is_open(path));
            for path in &open_now {
                let key = (self.file_sizes[path], path.clone());
                let reader = state.open.get_mut(&key).expect("open reader");
                if visit(reader.as_mut())? {
                    return Ok(());
                }
            }
            if closed.is_empty() {
                return Ok(());
            }
            self.open_readers(&mut state, &closed)?;
            candidates = closed;
        }
        Ok(())
    }

    /// Open as many of `paths` as fit, evicting the smallest open readers
    /// to make room. When more files are requested than can ever be open,
    /// the trailing portion is opened now and the rest waits for the next
    /// scheduling round.
    fn open_readers(
        &self,
        state: &mut ReaderState,
        paths: &[PathBuf],
    ) -> Result<(), ReadIoError> {
        let available = self.max_open_files - state.open.len();
        let first_open = if paths.len() <= available {
            0
        } else {
            let to_close = (paths.len() - available).min(state.open.len());
            for _ in 0..to_close {
                let ((_, path), _) = state.open.pop_first().expect("open reader to evict");
                state.closed.insert(path);
            }
            paths.len() - (available + to_close)
        };
        for path in &paths[first_open..] {
            debug_assert!(state.open.len() < self.max_open_files);
            let reader = self.factory.open(path)?;
            state.open.insert((self.file_sizes[path], path.clone()), reader);
            state.closed.remove(path);
        }
        Ok(())
    }
}

fn spanning_regions(contigs: &[Arc<str>], reader: &dyn ReadFileReader) -> Vec<Region> {
    contigs
        .iter()
        .map(|contig| {
            let size = reader.reference_size(contig).unwrap_or(u32::MAX);
            Region::new(Arc::clone(contig), 0, size)
        })
        .collect()
}

fn merge_sorted(dst: &mut Vec<AlignedRead>, src: Vec<AlignedRead>) {
    if src.is_empty() {
        return;
    }
    if dst.is_empty() {
        *dst = src;
        return;
    }
    let mut merged = Vec::with_capacity(dst.len() + src.len());
    let mut lhs = std::mem::take(dst).into_iter().peekable();
    let mut rhs = src.into_iter().peekable();
    loop {
        match (lhs.peek(), rhs.peek()) {
            (Some(l), Some(r)) => {
                if l <= r {
                    merged.push(lhs.next().expect("peeked"));
                } else {
                    merged.push(rhs.next().expect("peeked"));
                }
            }
            (Some(_), None) => merged.push(lhs.next().expect("peeked")),
            (None, Some(_)) => merged.push(rhs.next().expect("peeked")),
            (None, None) => break,
        }
    }
    *dst = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadFlags;

    #[test]
    fn merge_sorted_interleaves() {
        let read = |begin: u32, name: &str| {
            AlignedRead::new(
                name,
                Region::new("chr1", begin, begin + 10),
                vec![b'A'; 10],
                vec![30; 10],
                60,
                ReadFlags::default(),
            )
        };
        let mut dst = vec![read(0, "a"), read(20, "c")];
        merge_sorted(&mut dst, vec![read(10, "b"), read(30, "d")]);
        let begins: Vec<u32> = dst.iter().map(|r| r.region().begin()).collect();
        assert_eq!(begins, vec![0, 10, 20, 30]);
    }
}
