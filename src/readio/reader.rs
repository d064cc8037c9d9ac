use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::read::AlignedRead;
use crate::region::Region;

/// Sample identifier as found in read file metadata.
pub type SampleName = String;

/// Fatal I/O failures surfaced to the pipeline driver; never retried.
#[derive(Debug, Error)]
pub enum ReadIoError {
    /// A read file could not be opened.
    #[error("failed to open read file {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// File metadata (size) could not be read.
    #[error("failed to stat read file {path}: {source}")]
    Metadata {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The requested contig does not exist in a file's header.
    #[error("contig '{contig}' not present in {path}")]
    UnknownContig {
        /// Requested contig.
        contig: String,
        /// File path.
        path: PathBuf,
    },

    /// A region fetch failed mid-query.
    #[error("failed to fetch reads from {path}: {source}")]
    Fetch {
        /// File path.
        path: PathBuf,
        /// Backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Capability contract for one indexed read file.
///
/// Region metadata narrows which files a query must touch: a file reports
/// its mapped regions, or failing that its mapped contigs, or failing that
/// the caller assumes reads may lie anywhere on its reference contigs.
pub trait ReadFileReader: Send {
    /// Regions the index declares reads for, if the backend can tell.
    fn mapped_regions(&self) -> Option<Vec<Region>>;

    /// Contigs the index declares reads on, if the backend can tell.
    fn mapped_contigs(&self) -> Option<Vec<Arc<str>>>;

    /// All contigs of the file's reference, in header order.
    fn reference_contigs(&self) -> Vec<Arc<str>>;

    /// Size of a reference contig, if present.
    fn reference_size(&self, contig: &str) -> Option<u32>;

    /// Samples contained in the file.
    fn extract_samples(&self) -> Vec<SampleName>;

    /// Whether any read of the given samples overlaps `region`.
    fn has_reads(&mut self, samples: &[SampleName], region: &Region) -> Result<bool, ReadIoError>;

    /// Number of reads of the given samples overlapping `region`.
    fn count_reads(&mut self, samples: &[SampleName], region: &Region)
        -> Result<usize, ReadIoError>;

    /// Fetch reads per sample, each list sorted.
    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<HashMap<SampleName, Vec<AlignedRead>>, ReadIoError>;

    /// Up to `max` read start positions of the given samples in `region`.
    fn extract_read_positions(
        &mut self,
        samples: &[SampleName],
        region: &Region,
        max: usize,
    ) -> Result<Vec<u32>, ReadIoError>;
}

/// Opens readers and reports file sizes; the read manager's only window
/// onto the filesystem, so tests can register in-memory files.
pub trait ReadFileFactory: Send + Sync {
    /// Open the file at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn ReadFileReader>, ReadIoError>;

    /// On-disk size of `path`, used for eviction ordering.
    fn file_size(&self, path: &Path) -> Result<u64, ReadIoError>;
}
