#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cormorant::read::{AlignedRead, ReadFlags};
use cormorant::readio::{ReadFileFactory, ReadFileReader, ReadIoError, SampleName};
use cormorant::region::Region;

/// Description of one fake read file registered with [`MockReadFactory`].
#[derive(Clone)]
pub struct MockFileSpec {
    pub size: u64,
    pub sample: SampleName,
    pub contig: Arc<str>,
    pub contig_size: u32,
    pub mapped_regions: Vec<Region>,
    pub reads: Vec<AlignedRead>,
}

impl MockFileSpec {
    pub fn new(size: u64, sample: &str, contig: &str, contig_size: u32) -> Self {
        Self {
            size,
            sample: sample.to_string(),
            contig: Arc::from(contig),
            contig_size,
            mapped_regions: Vec::new(),
            reads: Vec::new(),
        }
    }

    pub fn with_mapped_region(mut self, begin: u32, end: u32) -> Self {
        self.mapped_regions
            .push(Region::new(Arc::clone(&self.contig), begin, end));
        self
    }

    pub fn with_read_starts(mut self, starts: &[u32], read_len: u32) -> Self {
        for (index, &begin) in starts.iter().enumerate() {
            self.reads.push(make_read(
                &format!("{}-read{}", self.sample, index),
                Arc::clone(&self.contig),
                begin,
                begin + read_len,
            ));
        }
        self.reads.sort();
        self
    }
}

/// Read factory serving in-memory files with declared sizes.
#[derive(Default)]
pub struct MockReadFactory {
    files: HashMap<PathBuf, MockFileSpec>,
}

impl MockReadFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, spec: MockFileSpec) -> PathBuf {
        let path = PathBuf::from(path);
        self.files.insert(path.clone(), spec);
        path
    }
}

impl ReadFileFactory for MockReadFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn ReadFileReader>, ReadIoError> {
        let spec = self.files.get(path).ok_or_else(|| ReadIoError::Open {
            path: path.to_path_buf(),
            source: "unregistered mock file".into(),
        })?;
        Ok(Box::new(MockReader { spec: spec.clone() }))
    }

    fn file_size(&self, path: &Path) -> Result<u64, ReadIoError> {
        self.files
            .get(path)
            .map(|spec| spec.size)
            .ok_or_else(|| ReadIoError::Metadata {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unregistered"),
            })
    }
}

struct MockReader {
    spec: MockFileSpec,
}

impl MockReader {
    fn matching(&self, samples: &[SampleName], region: &Region) -> Vec<AlignedRead> {
        if !samples.contains(&self.spec.sample) || region.contig() != &self.spec.contig {
            return Vec::new();
        }
        self.spec
            .reads
            .iter()
            .filter(|read| read.region().overlaps(region))
            .cloned()
            .collect()
    }
}

impl ReadFileReader for MockReader {
    fn mapped_regions(&self) -> Option<Vec<Region>> {
        if self.spec.mapped_regions.is_empty() {
            None
        } else {
            Some(self.spec.mapped_regions.clone())
        }
    }

    fn mapped_contigs(&self) -> Option<Vec<Arc<str>>> {
        None
    }

    fn reference_contigs(&self) -> Vec<Arc<str>> {
        vec![Arc::clone(&self.spec.contig)]
    }

    fn reference_size(&self, contig: &str) -> Option<u32> {
        (self.spec.contig.as_ref() == contig).then_some(self.spec.contig_size)
    }

    fn extract_samples(&self) -> Vec<SampleName> {
        vec![self.spec.sample.clone()]
    }

    fn has_reads(&mut self, samples: &[SampleName], region: &Region) -> Result<bool, ReadIoError> {
        Ok(!self.matching(samples, region).is_empty())
    }

    fn count_reads(
        &mut self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<usize, ReadIoError> {
        Ok(self.matching(samples, region).len())
    }

    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<HashMap<SampleName, Vec<AlignedRead>>, ReadIoError> {
        let mut result = HashMap::new();
        result.insert(self.spec.sample.clone(), self.matching(samples, region));
        Ok(result)
    }

    fn extract_read_positions(
        &mut self,
        samples: &[SampleName],
        region: &Region,
        max: usize,
    ) -> Result<Vec<u32>, ReadIoError> {
        Ok(self
            .matching(samples, region)
            .into_iter()
            .map(|read| read.region().begin())
            .take(max)
            .collect())
    }
}

/// A plain mapped read with uniform qualities.
pub fn make_read(name: &str, contig: Arc<str>, begin: u32, end: u32) -> AlignedRead {
    AlignedRead::new(
        name,
        Region::new(contig, begin, end),
        vec![b'A'; (end - begin) as usize],
        vec![30u8; (end - begin) as usize],
        60,
        ReadFlags::default(),
    )
}
