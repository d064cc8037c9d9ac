use std::collections::HashSet;
use std::sync::Arc;

use crate::allele::Allele;
use crate::reference::{ReferenceError, ReferenceGenome};
use crate::region::Region;

/// A candidate haplotype: a realised sequence over a reference region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Haplotype {
    region: Region,
    sequence: Vec<u8>,
}

impl Haplotype {
    pub(crate) fn new(region: Region, sequence: Vec<u8>) -> Self {
        Self { region, sequence }
    }

    /// The region the haplotype spans.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// The haplotype sequence.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }
}

/// Branching structure over mutually exclusive alleles.
///
/// Each branch is an ordered list of non-overlapping alleles; extending with
/// an allele appends it to every compatible branch and forks the branches it
/// conflicts with, so each mutually exclusive site multiplies the number of
/// haplotypes. Kept flat rather than as an explicit tree: the operations the
/// generator needs (extend, clear by region, splice, extract) all act on
/// whole branches.
#[derive(Debug, Clone)]
pub struct HaplotypeTree {
    contig: Arc<str>,
    reference: Arc<dyn ReferenceGenome>,
    branches: Vec<Vec<Allele>>,
}

impl HaplotypeTree {
    /// An empty tree over `contig`.
    pub fn new(contig: impl Into<Arc<str>>, reference: Arc<dyn ReferenceGenome>) -> Self {
        Self {
            contig: contig.into(),
            reference,
            branches: vec![Vec::new()],
        }
    }

    /// True iff no allele has been added.
    pub fn is_empty(&self) -> bool {
        self.branches.iter().all(Vec::is_empty)
    }

    /// Number of distinct haplotypes currently represented.
    pub fn num_haplotypes(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.branches.len()
        }
    }

    /// Region covering every allele in the tree.
    pub fn encompassing_region(&self) -> Option<Region> {
        let mut result: Option<Region> = None;
        for allele in self.branches.iter().flatten() {
            result = Some(match result {
                None => allele.region().clone(),
                Some(region) => region.encompass(allele.region()),
            });
        }
        result
    }

    /// Add `allele` to every branch, forking branches that already carry an
    /// allele overlapping it.
    pub fn extend_with(&mut self, allele: &Allele) {
        let mut forked: Vec<Vec<Allele>> = Vec::new();
        for branch in &mut self.branches {
            if branch
                .iter()
                .all(|a| !a.region().overlaps(allele.region()))
            {
                insert_sorted(branch, allele.clone());
            } else {
                let mut fork: Vec<Allele> = branch
                    .iter()
                    .filter(|a| !a.region().overlaps(allele.region()))
                    .cloned()
                    .collect();
                insert_sorted(&mut fork, allele.clone());
                forked.push(fork);
            }
        }
        self.branches.append(&mut forked);
        self.dedup_branches();
    }

    /// Remove every allele overlapping `region` from all branches.
    pub fn clear_region(&mut self, region: &Region) {
        for branch in &mut self.branches {
            branch.retain(|a| !a.region().overlaps(region));
        }
        self.dedup_branches();
        if self.branches.is_empty() || self.is_empty() {
            self.clear();
        }
    }

    /// Reset to the empty tree.
    pub fn clear(&mut self) {
        self.branches = vec![Vec::new()];
    }

    /// Multiply branches by held-out alleles sharing one region. Branches
    /// already carrying an allele overlapping that region are kept as they
    /// are.
    pub fn splice(&mut self, alleles: &[Allele]) {
        let Some(site) = alleles.first().map(|a| a.region().clone()) else {
            return;
        };
        let mut next: Vec<Vec<Allele>> = Vec::with_capacity(self.branches.len() * alleles.len());
        for branch in &self.branches {
            if branch.iter().any(|a| a.region().overlaps(&site)) {
                next.push(branch.clone());
                continue;
            }
            for allele in alleles {
                let mut fork = branch.clone();
                insert_sorted(&mut fork, allele.clone());
                next.push(fork);
            }
        }
        self.branches = next;
        self.dedup_branches();
    }

    /// Materialise the branch sequences over `region`. Alleles not fully
    /// contained in the window are ignored; duplicate sequences collapse.
    pub fn extract_haplotypes(&self, region: &Region) -> Result<Vec<Haplotype>, ReferenceError> {
        let reference_sequence = self.reference.sequence(region)?;
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut haplotypes = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            let mut sequence = Vec::with_capacity(reference_sequence.len());
            let mut cursor = region.begin();
            for allele in branch {
                if !region.contains(allele.region()) {
                    continue;
                }
                let site = allele.region();
                sequence.extend_from_slice(
                    &reference_sequence
                        [(cursor - region.begin()) as usize..(site.begin() - region.begin()) as usize],
                );
                sequence.extend_from_slice(allele.sequence());
                cursor = site.end();
            }
            sequence.extend_from_slice(&reference_sequence[(cursor - region.begin()) as usize..]);
            if seen.insert(sequence.clone()) {
                haplotypes.push(Haplotype::new(region.clone(), sequence));
            }
        }
        Ok(haplotypes)
    }

    fn dedup_branches(&mut self) {
        let mut seen: HashSet<Vec<Allele>> = HashSet::with_capacity(self.branches.len());
        self.branches.retain(|branch| seen.insert(branch.clone()));
    }
}

fn insert_sorted(branch: &mut Vec<Allele>, allele: Allele) {
    let at = branch
        .iter()
        .position(|a| *a > allele)
        .unwrap_or(branch.len());
    branch.insert(at, allele);
}

/// Extend `tree` with each allele in turn.
pub fn extend_tree(alleles: &[Allele], tree: &mut HaplotypeTree) {
    for allele in alleles {
        tree.extend_with(allele);
    }
}

/// Extend `tree` allele by allele, stopping after the haplotype count first
/// exceeds `limit`. Returns the number of alleles consumed; a value short of
/// `alleles.len()` means the extension was cut off.
pub fn extend_tree_until(alleles: &[Allele], tree: &mut HaplotypeTree, limit: usize) -> usize {
    for (index, allele) in alleles.iter().enumerate() {
        tree.extend_with(allele);
        if tree.num_haplotypes() > limit {
            return index + 1;
        }
    }
    alleles.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::InMemoryReference;

    fn reference() -> Arc<dyn ReferenceGenome> {
        Arc::new(InMemoryReference::with_contig(
            "toy",
            "chr1",
            b"ACGTACGTACGTACGTACGT".to_vec(),
        ))
    }

    fn allele(begin: u32, end: u32, seq: &str) -> Allele {
        Allele::new(
            Region::new("chr1", begin, end),
            seq.as_bytes().to_vec(),
        )
    }

    #[test]
    fn biallelic_sites_double_haplotypes() {
        let mut tree = HaplotypeTree::new("chr1", reference());
        assert_eq!(tree.num_haplotypes(), 0);
        tree.extend_with(&allele(2, 3, "G"));
        tree.extend_with(&allele(2, 3, "T"));
        assert_eq!(tree.num_haplotypes(), 2);
        tree.extend_with(&allele(6, 7, "G"));
        tree.extend_with(&allele(6, 7, "C"));
        assert_eq!(tree.num_haplotypes(), 4);
    }

    #[test]
    fn clear_region_collapses_branches() {
        let mut tree = HaplotypeTree::new("chr1", reference());
        tree.extend_with(&allele(2, 3, "G"));
        tree.extend_with(&allele(2, 3, "T"));
        tree.extend_with(&allele(6, 7, "G"));
        tree.extend_with(&allele(6, 7, "C"));
        tree.clear_region(&Region::new("chr1", 6, 7));
        assert_eq!(tree.num_haplotypes(), 2);
        tree.clear_region(&Region::new("chr1", 0, 10));
        assert!(tree.is_empty());
    }

    #[test]
    fn splice_multiplies_unoccupied_branches() {
        let mut tree = HaplotypeTree::new("chr1", reference());
        tree.extend_with(&allele(2, 3, "G"));
        tree.extend_with(&allele(2, 3, "T"));
        tree.splice(&[allele(6, 7, "G"), allele(6, 7, "C")]);
        assert_eq!(tree.num_haplotypes(), 4);
        // A second splice at the same site leaves occupied branches alone.
        tree.splice(&[allele(6, 7, "A")]);
        assert_eq!(tree.num_haplotypes(), 4);
    }

    #[test]
    fn extracted_sequences_substitute_alleles() {
        let mut tree = HaplotypeTree::new("chr1", reference());
        // Reference is ACGTACGT...; substitute position 2 and insert at 4.
        tree.extend_with(&allele(2, 3, "T"));
        tree.extend_with(&allele(4, 4, "GG"));
        let haplotypes = tree
            .extract_haplotypes(&Region::new("chr1", 0, 8))
            .unwrap();
        assert_eq!(haplotypes.len(), 1);
        assert_eq!(haplotypes[0].sequence(), b"ACTTGGACGT");
    }

    #[test]
    fn extension_respects_limits() {
        let mut tree = HaplotypeTree::new("chr1", reference());
        let alleles: Vec<Allele> = (0..6)
            .flat_map(|i| {
                let begin = 2 * i;
                vec![allele(begin, begin + 1, "A"), allele(begin, begin + 1, "C")]
            })
            .collect();
        let consumed = extend_tree_until(&alleles, &mut tree, 8);
        assert!(consumed < alleles.len());
        assert!(tree.num_haplotypes() > 8);
        assert!(tree.num_haplotypes() <= 16);
    }
}
