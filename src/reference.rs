use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::region::Region;

/// Errors raised when a reference sequence cannot be served.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// The requested contig is not part of the reference.
    #[error("unknown contig '{contig}' in reference '{reference}'")]
    UnknownContig {
        /// Requested contig name.
        contig: String,
        /// Name of the reference genome queried.
        reference: String,
    },

    /// The requested region runs past the end of its contig.
    #[error("region {region} exceeds contig size {size}")]
    RegionOutOfBounds {
        /// Offending region.
        region: Region,
        /// Size of the contig.
        size: u32,
    },
}

/// Capability contract for reference genome access.
///
/// FASTA parsing and caching live behind this boundary; the core only needs
/// names, sizes, and raw subsequences.
pub trait ReferenceGenome: std::fmt::Debug + Send + Sync {
    /// Human-readable name of the genome (e.g. the file stem).
    fn reference_name(&self) -> &str;

    /// All contig names, in reference order.
    fn contig_names(&self) -> Vec<Arc<str>>;

    /// Size of the named contig, if present.
    fn contig_size(&self, contig: &str) -> Option<u32>;

    /// The bases covered by `region`.
    fn sequence(&self, region: &Region) -> Result<Vec<u8>, ReferenceError>;
}

/// A reference genome held entirely in memory, for tests and small demos.
#[derive(Debug, Clone)]
pub struct InMemoryReference {
    name: String,
    contigs: BTreeMap<Arc<str>, Arc<[u8]>>,
    order: Vec<Arc<str>>,
}

impl InMemoryReference {
    /// Build a reference from `(contig, sequence)` pairs.
    pub fn new(
        name: impl Into<String>,
        contigs: impl IntoIterator<Item = (Arc<str>, Arc<[u8]>)>,
    ) -> Self {
        let mut map = BTreeMap::new();
        let mut order = Vec::new();
        for (contig, sequence) in contigs {
            if map.insert(Arc::clone(&contig), sequence).is_none() {
                order.push(contig);
            }
        }
        Self {
            name: name.into(),
            contigs: map,
            order,
        }
    }

    /// Convenience constructor for a single-contig reference.
    pub fn with_contig(
        name: impl Into<String>,
        contig: impl Into<Arc<str>>,
        sequence: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self::new(name, [(contig.into(), sequence.into())])
    }
}

impl ReferenceGenome for InMemoryReference {
    fn reference_name(&self) -> &str {
        &self.name
    }

    fn contig_names(&self) -> Vec<Arc<str>> {
        self.order.clone()
    }

    fn contig_size(&self, contig: &str) -> Option<u32> {
        self.contigs.get(contig).map(|seq| seq.len() as u32)
    }

    fn sequence(&self, region: &Region) -> Result<Vec<u8>, ReferenceError> {
        let sequence =
            self.contigs
                .get(region.contig().as_ref())
                .ok_or_else(|| ReferenceError::UnknownContig {
                    contig: region.contig().to_string(),
                    reference: self.name.clone(),
                })?;
        if region.end() as usize > sequence.len() {
            return Err(ReferenceError::RegionOutOfBounds {
                region: region.clone(),
                size: sequence.len() as u32,
            });
        }
        Ok(sequence[region.begin() as usize..region.end() as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_subsequences() {
        let reference = InMemoryReference::with_contig("toy", "chr1", b"ACGTACGT".to_vec());
        assert_eq!(reference.contig_size("chr1"), Some(8));
        let seq = reference.sequence(&Region::new("chr1", 2, 6)).unwrap();
        assert_eq!(seq, b"GTAC");
    }

    #[test]
    fn rejects_unknown_contig_and_overrun() {
        let reference = InMemoryReference::with_contig("toy", "chr1", b"ACGT".to_vec());
        assert!(matches!(
            reference.sequence(&Region::new("chr2", 0, 1)),
            Err(ReferenceError::UnknownContig { .. })
        ));
        assert!(matches!(
            reference.sequence(&Region::new("chr1", 0, 5)),
            Err(ReferenceError::RegionOutOfBounds { .. })
        ));
    }
}
