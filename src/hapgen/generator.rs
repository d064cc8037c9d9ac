use std::sync::Arc;

use thiserror::Error;

use crate::allele::{decompose, Allele, Variant};
use crate::read::ReadMap;
use crate::reference::{ReferenceError, ReferenceGenome};
use crate::region::Region;

use super::allele_set::{extract_regions, mutually_exclusive_regions, AlleleFlatSet};
use super::haplotype::{extend_tree, extend_tree_until, Haplotype, HaplotypeTree};
use super::walker::{max_included, GenomeWalker, IndicatorPolicy};

/// How aggressively haplotype-tree state is carried across active regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaggingPolicy {
    /// Rebuild the tree for every active region.
    None,
    /// Carry indicators only when a read links them to the novel region.
    Conservative,
    /// Carry indicators whenever reads extend past the active region.
    Aggressive,
}

/// Bounds on the haplotype tree at different stages of an advancement step.
#[derive(Debug, Clone, Copy)]
pub struct HaplotypeLimits {
    /// Preferred working size; lagged walks aim to stay under this.
    pub target: usize,
    /// Extension bound past which holdouts are extracted.
    pub holdout: usize,
    /// Hard bound; exceeding it fails the active region.
    pub overflow: usize,
}

impl Default for HaplotypeLimits {
    fn default() -> Self {
        Self {
            target: 128,
            holdout: 2048,
            overflow: 16384,
        }
    }
}

/// Generator policies, built with chained setters.
#[derive(Debug, Clone)]
pub struct Policies {
    /// Lagging mode.
    pub lagging: LaggingPolicy,
    /// Tree size limits.
    pub haplotype_limits: HaplotypeLimits,
    /// Maximum number of holdout extraction episodes in flight.
    pub max_holdout_depth: usize,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            lagging: LaggingPolicy::None,
            haplotype_limits: HaplotypeLimits::default(),
            max_holdout_depth: 20,
        }
    }
}

impl Policies {
    /// Set the lagging policy.
    pub fn with_lagging(mut self, lagging: LaggingPolicy) -> Self {
        self.lagging = lagging;
        self
    }

    /// Set the target haplotype count.
    pub fn with_target_limit(mut self, n: usize) -> Self {
        self.haplotype_limits.target = n;
        if self.haplotype_limits.holdout < n {
            self.haplotype_limits.holdout = n;
        }
        if self.haplotype_limits.overflow < self.haplotype_limits.holdout {
            self.haplotype_limits.overflow = self.haplotype_limits.holdout;
        }
        self
    }

    /// Set the holdout extraction bound.
    pub fn with_holdout_limit(mut self, n: usize) -> Self {
        self.haplotype_limits.holdout = n;
        self
    }

    /// Set the hard overflow bound.
    pub fn with_overflow_limit(mut self, n: usize) -> Self {
        self.haplotype_limits.overflow = n;
        self
    }

    /// Set the maximum holdout depth.
    pub fn with_max_holdout_depth(mut self, n: usize) -> Self {
        self.max_holdout_depth = n;
        self
    }
}

/// Errors fatal to the current active region.
#[derive(Debug, Error)]
pub enum HaplotypeGeneratorError {
    /// The haplotype tree exceeded the overflow limit under every holdout
    /// strategy available.
    #[error("haplotype overflow in {region}: {size} haplotypes")]
    Overflow {
        /// Region being materialised when the limit was hit.
        region: Region,
        /// Tree size at failure.
        size: usize,
    },

    /// The generator was constructed with no candidate variants.
    #[error("no candidate variants were supplied")]
    NoCandidates,

    /// Reference access failed while rendering haplotypes.
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// One step's output: the haplotypes over the active region. An empty
/// haplotype list with a region past the rightmost allele ends the stream.
#[derive(Debug, Clone)]
pub struct HaplotypePacket {
    /// Haplotypes over the padded haplotype region.
    pub haplotypes: Vec<Haplotype>,
    /// The active region the haplotypes were generated for.
    pub active_region: Region,
}

#[derive(Debug, Clone)]
struct HoldoutFrame {
    alleles: Vec<Allele>,
    region: Region,
}

/// Lazy producer of candidate haplotypes over a moving active region.
///
/// Drives a [`HaplotypeTree`] over the candidate allele set, bounding
/// combinatorial growth with a LIFO stack of holdout frames and optionally
/// re-using tree state across regions (lagging). One [`generate`]
/// (Self::generate) call advances one step.
#[derive(Debug)]
pub struct HaplotypeGenerator {
    policies: Policies,
    min_flank_pad: u32,
    reference: Arc<dyn ReferenceGenome>,
    tree: HaplotypeTree,
    default_walker: GenomeWalker,
    holdout_walker: GenomeWalker,
    lagged_walker: Option<GenomeWalker>,
    alleles: AlleleFlatSet,
    reads: Arc<ReadMap>,
    active_region: Region,
    next_active_region: Option<Region>,
    rightmost_allele: Allele,
    holdouts: Vec<HoldoutFrame>,
    holdout_region: Option<Region>,
}

impl HaplotypeGenerator {
    /// Build a generator over decomposed candidate variants.
    pub fn new(
        reference: Arc<dyn ReferenceGenome>,
        candidates: &[Variant],
        reads: Arc<ReadMap>,
        policies: Policies,
        min_flank_pad: u32,
    ) -> Result<Self, HaplotypeGeneratorError> {
        if candidates.is_empty() {
            return Err(HaplotypeGeneratorError::NoCandidates);
        }
        let limits = &policies.haplotype_limits;
        assert!(
            limits.target <= limits.holdout && limits.holdout <= limits.overflow,
            "haplotype limits must be ordered: target <= holdout <= overflow"
        );
        let contig = Arc::clone(candidates[0].region().contig());
        let alleles = AlleleFlatSet::new(decompose(candidates));
        let rightmost_allele = alleles.rightmost().expect("non-empty alleles").clone();
        let active_region = alleles
            .leftmost()
            .expect("non-empty alleles")
            .region()
            .head()
            .shift(-1);
        let included = max_included(limits.target);
        let lagged_walker = match policies.lagging {
            LaggingPolicy::None => None,
            LaggingPolicy::Conservative => Some(GenomeWalker::new(
                included,
                IndicatorPolicy::SharedWithNovel,
            )),
            LaggingPolicy::Aggressive => Some(GenomeWalker::new(
                included,
                IndicatorPolicy::LinkableToNovel,
            )),
        };
        Ok(Self {
            policies,
            min_flank_pad,
            reference: Arc::clone(&reference),
            tree: HaplotypeTree::new(contig, reference),
            default_walker: GenomeWalker::new(included, IndicatorPolicy::IncludeNone),
            holdout_walker: GenomeWalker::new(included, IndicatorPolicy::IncludeAll),
            lagged_walker,
            alleles,
            reads,
            active_region,
            next_active_region: None,
            rightmost_allele,
            holdouts: Vec::new(),
            holdout_region: None,
        })
    }

    /// The current active region.
    pub fn active_region(&self) -> &Region {
        &self.active_region
    }

    /// Advance one step and return the next haplotype packet.
    pub fn generate(&mut self) -> Result<HaplotypePacket, HaplotypeGeneratorError> {
        if self.alleles.is_empty() {
            return Ok(HaplotypePacket {
                haplotypes: Vec::new(),
                active_region: self.active_region.clone(),
            });
        }
        if self.in_holdout_mode() && self.can_reintroduce_holdouts() {
            self.reintroduce_holdouts();
            if self.tree.num_haplotypes() > self.policies.haplotype_limits.overflow {
                return Err(HaplotypeGeneratorError::Overflow {
                    region: self.active_region.clone(),
                    size: self.tree.num_haplotypes(),
                });
            }
            self.active_region = self
                .tree
                .encompassing_region()
                .unwrap_or_else(|| self.active_region.clone());
            self.next_active_region = None;
        } else {
            self.update_next_active_region();
            let next = self
                .next_active_region
                .clone()
                .expect("next active region was just computed");
            if next.is_after(self.rightmost_allele.region()) {
                return Ok(HaplotypePacket {
                    haplotypes: Vec::new(),
                    active_region: next,
                });
            }
            self.progress(next.clone());

            let novel_region = if self.tree.is_empty() {
                next.clone()
            } else {
                next.right_overhang(&self.active_region)
            };
            let novel_alleles = self.alleles.overlapped(&novel_region);
            let consumed = extend_tree_until(
                &novel_alleles,
                &mut self.tree,
                self.policies.haplotype_limits.holdout,
            );
            if consumed < novel_alleles.len() {
                self.next_active_region = None;
                if self.can_extract_holdouts() {
                    self.extract_holdouts(novel_region.clone());
                    self.tree.clear_region(&novel_region);

                    self.update_next_active_region();
                    self.active_region = self
                        .next_active_region
                        .take()
                        .expect("next active region was just computed");

                    let new_novel = self.alleles.overlapped(&self.active_region);
                    let consumed = extend_tree_until(
                        &new_novel,
                        &mut self.tree,
                        self.policies.haplotype_limits.overflow,
                    );
                    if consumed < new_novel.len() {
                        return Err(HaplotypeGeneratorError::Overflow {
                            region: self.active_region.clone(),
                            size: self.tree.num_haplotypes(),
                        });
                    }
                } else {
                    let consumed_after = extend_tree_until(
                        &novel_alleles[consumed..],
                        &mut self.tree,
                        self.policies.haplotype_limits.overflow,
                    );
                    self.active_region = self
                        .tree
                        .encompassing_region()
                        .unwrap_or_else(|| next.clone());
                    if consumed + consumed_after < novel_alleles.len() {
                        return Err(HaplotypeGeneratorError::Overflow {
                            region: self.active_region.clone(),
                            size: self.tree.num_haplotypes(),
                        });
                    }
                }
            } else {
                self.active_region = next;
                self.next_active_region = None;
            }
        }

        let haplotype_region = self.calculate_haplotype_region();
        let haplotypes = self.tree.extract_haplotypes(&haplotype_region)?;
        if !self.is_lagging_enabled() {
            self.tree.clear();
        }
        Ok(HaplotypePacket {
            haplotypes,
            active_region: self.active_region.clone(),
        })
    }

    /// The region the next [`generate`](Self::generate) call would
    /// materialise; unavailable in holdout mode.
    pub fn peek_next_active_region(&mut self) -> Option<Region> {
        if self.in_holdout_mode() {
            return None;
        }
        self.update_next_active_region();
        self.next_active_region.clone()
    }

    /// Drop all tree and holdout state, keeping the remaining alleles.
    pub fn clear_progress(&mut self) {
        self.tree.clear();
        self.next_active_region = None;
        self.holdouts.clear();
        self.holdout_region = None;
    }

    /// Restart generation from `region`.
    pub fn jump(&mut self, region: Region) {
        self.clear_progress();
        self.progress(region);
    }

    /// Whether removing haplotypes externally could change upcoming
    /// decisions.
    pub fn removal_has_impact(&self) -> bool {
        if self.in_holdout_mode() {
            return true;
        }
        if !self.is_lagging_enabled()
            || self.active_region.contains(self.rightmost_allele.region())
        {
            return false;
        }
        let walker = self.lagged_walker.as_ref().expect("lagging enabled");
        let max_lagged = walker.walk(&self.active_region, &self.reads, &self.alleles);
        max_lagged.overlaps(&self.active_region)
    }

    /// Upper bound on the number of haplotypes whose removal could matter.
    pub fn max_removal_impact(&self) -> usize {
        if self.in_holdout_mode() {
            return self.tree.num_haplotypes();
        }
        if !self.is_lagging_enabled()
            || self.active_region.contains(self.rightmost_allele.region())
        {
            return 0;
        }
        let walker = self.lagged_walker.as_ref().expect("lagging enabled");
        let max_lagged = walker.walk(&self.active_region, &self.reads, &self.alleles);
        if !max_lagged.overlaps(&self.active_region) {
            return 0;
        }
        let novel_region = max_lagged.right_overhang(&self.active_region);
        let num_novel = self.alleles.count_overlapped(&novel_region);
        if num_novel == 0 {
            return 0;
        }
        let max_new_haplotypes = saturating_exp2(num_novel / 2).max(1);
        let leftover = self.policies.haplotype_limits.target / max_new_haplotypes;
        let current = self.tree.num_haplotypes();
        if current > leftover {
            current - leftover
        } else {
            current
        }
    }

    // advancement internals

    fn is_lagging_enabled(&self) -> bool {
        self.lagged_walker.is_some()
    }

    fn in_holdout_mode(&self) -> bool {
        !self.holdouts.is_empty()
    }

    fn update_next_active_region(&mut self) {
        if self.next_active_region.is_some() {
            return;
        }
        if self.is_lagging_enabled() || self.in_holdout_mode() {
            self.update_lagged_next_active_region();
        } else {
            self.next_active_region = Some(self.default_walker.walk(
                &self.active_region,
                &self.reads,
                &self.alleles,
            ));
        }
    }

    fn update_lagged_next_active_region(&mut self) {
        if self.active_region.contains(self.rightmost_allele.region()) {
            self.next_active_region = Some(self.rightmost_allele.region().tail().shift(2));
            return;
        }
        let max_lagged_region = if self.in_holdout_mode() {
            self.holdout_walker
                .walk(&self.active_region, &self.reads, &self.alleles)
        } else {
            let walker = self.lagged_walker.as_ref().expect("lagging enabled");
            walker.walk(&self.active_region, &self.reads, &self.alleles)
        };
        if !self.active_region.overlaps(&max_lagged_region) {
            self.next_active_region = Some(max_lagged_region);
            return;
        }

        // Dry-run lagging decisions on a scratch tree.
        let target = self.policies.haplotype_limits.target;
        let overflow = self.policies.haplotype_limits.overflow;
        let mut test_tree = self.tree.clone();

        if self.active_region.begins_before(&max_lagged_region) {
            let novel_region = max_lagged_region.right_overhang(&self.active_region);
            let novel_alleles = self.alleles.overlapped(&novel_region);
            let consumed = extend_tree_until(&novel_alleles, &mut test_tree, target);
            if consumed == novel_alleles.len() {
                // The whole lag fits; the walker estimate is superseded.
                self.next_active_region =
                    Some(test_tree.encompassing_region().unwrap_or(novel_region));
                return;
            }
            test_tree.clear_region(&novel_region);

            let passed_region = self.active_region.left_overhang(&max_lagged_region);
            let passed_alleles = self.alleles.overlapped(&passed_region);
            if can_remove_entire_passed_region(&max_lagged_region, &passed_alleles) {
                test_tree.clear_region(&passed_region);
            } else if requires_staged_removal(&passed_alleles) {
                let first_removal_region = passed_region.expand_rhs(-1);
                test_tree.clear_region(&first_removal_region);
                test_tree.clear_region(&first_removal_region.tail());
            } else {
                test_tree.clear_region(&passed_region.expand_rhs(-1));
            }
        }

        let novel_region = max_lagged_region.right_overhang(&self.active_region);
        let novel_alleles = self.alleles.overlapped(&novel_region);
        if novel_alleles.is_empty() {
            self.next_active_region = Some(novel_region);
            return;
        }
        let mut novel_regions = mutually_exclusive_regions(&novel_alleles);

        if let Some(indicator_region) = self.active_region.overlapped_region(&max_lagged_region) {
            let indicator_alleles = self.alleles.overlapped(&indicator_region);
            let indicator_regions = mutually_exclusive_regions(&indicator_alleles);
            let boundary_site_is_shared = indicator_regions
                .last()
                .is_some_and(|last| novel_regions.first() == Some(last));
            if boundary_site_is_shared {
                debug_assert!(novel_regions[0].is_empty());
                novel_regions.remove(0);
            }
            if !self.in_holdout_mode() {
                // Shed leading indicators until the scratch tree is under
                // the target.
                for region in &indicator_regions {
                    if test_tree.num_haplotypes() < target {
                        break;
                    }
                    test_tree.clear_region(region);
                }
            }
        }

        let mut num_novel_regions_added = 0usize;
        for region in &novel_regions {
            let interacting: Vec<Allele> = novel_alleles
                .iter()
                .filter(|a| region.contains(a.region()))
                .cloned()
                .collect();
            let consumed = extend_tree_until(&interacting, &mut test_tree, overflow);
            if consumed < interacting.len() {
                test_tree.clear();
                break;
            }
            num_novel_regions_added += 1;
            if test_tree.num_haplotypes() > target {
                if num_novel_regions_added > 1 {
                    test_tree.clear_region(region);
                    num_novel_regions_added -= 1;
                    let previous = &novel_regions[num_novel_regions_added - 1];
                    if previous.is_empty() {
                        // Insertions cleared alongside the dropped site are
                        // re-added.
                        let insertions: Vec<Allele> = novel_alleles
                            .iter()
                            .filter(|a| previous.contains(a.region()))
                            .cloned()
                            .collect();
                        extend_tree(&insertions, &mut test_tree);
                    }
                }
                break;
            } else if test_tree.num_haplotypes() == target {
                break;
            }
        }

        self.next_active_region = if !test_tree.is_empty() {
            test_tree.encompassing_region()
        } else {
            Some(novel_region)
        };
        if self.next_active_region.as_ref() == Some(&self.active_region) {
            self.next_active_region = Some(self.default_walker.walk(
                &self.active_region,
                &self.reads,
                &self.alleles,
            ));
        }
    }

    fn progress(&mut self, to: Region) {
        if to == self.active_region {
            return;
        }
        self.next_active_region = Some(to.clone());
        if self.in_holdout_mode() {
            return;
        }
        if self.active_region.begins_before(&to) {
            let passed_region = self.active_region.left_overhang(&to);
            let passed_alleles = self.alleles.overlapped(&passed_region);
            if passed_alleles.is_empty() {
                return;
            }
            if can_remove_entire_passed_region(&to, &passed_alleles) {
                self.alleles.erase_overlapped(&passed_region);
                self.tree.clear_region(&passed_region);
            } else if requires_staged_removal(&passed_alleles) {
                // Insertions abutting the passed region belong to the next
                // active region and must survive; the position alleles at
                // the boundary must not. Remove in two stages.
                let first_removal_region = passed_region.expand_rhs(-1);
                self.alleles.erase_overlapped(&first_removal_region);
                self.tree.clear_region(&first_removal_region);

                let second_removal_region = first_removal_region.tail();
                self.alleles.erase_overlapped(&second_removal_region);
                self.tree.clear_region(&second_removal_region);
            } else {
                let removal_region = passed_region.expand_rhs(-1);
                self.alleles.erase_overlapped(&removal_region);
                self.tree.clear_region(&removal_region);
            }
        } else if to.is_after(&self.active_region) {
            self.tree.clear();
        }
    }

    // holdout machinery

    fn can_extract_holdouts(&self) -> bool {
        self.holdouts.len() < self.policies.max_holdout_depth
    }

    fn extract_holdouts(&mut self, novel_region: Region) {
        debug_assert!(self.can_extract_holdouts());
        let mut active_alleles = self.alleles.contained(&novel_region);
        if active_alleles.is_empty() {
            // Nothing fully contained to hold out; the caller falls back to
            // the overflow-bounded extension.
            return;
        }

        let site_regions = extract_regions(&active_alleles);
        let mut interaction_counts: Vec<(Region, usize)> = site_regions
            .into_iter()
            .map(|region| {
                let count = active_alleles
                    .iter()
                    .filter(|a| a.region().overlaps(&region))
                    .count();
                (region, count)
            })
            .collect();
        interaction_counts.sort_by_key(|(_, count)| *count);

        let mut new_holdouts: Vec<Allele> = Vec::new();
        let mut walk_cursor = novel_region;
        loop {
            let Some((chosen_region, _)) = interaction_counts.pop() else {
                break;
            };
            let frame_alleles: Vec<Allele> = active_alleles
                .iter()
                .filter(|a| a.region() == &chosen_region)
                .cloned()
                .collect();
            debug_assert!(!frame_alleles.is_empty());
            new_holdouts.extend(frame_alleles.iter().cloned());
            self.holdouts.push(HoldoutFrame {
                alleles: frame_alleles,
                region: chosen_region.clone(),
            });
            active_alleles.retain(|a| a.region() != &chosen_region);

            let remaining = AlleleFlatSet::new(active_alleles.iter().cloned());
            walk_cursor = self
                .default_walker
                .walk(&walk_cursor.head(), &self.reads, &remaining);
            if !requires_more_holdouts(
                &active_alleles,
                &walk_cursor,
                self.policies.haplotype_limits.holdout,
            ) {
                break;
            }
        }

        new_holdouts.sort();
        let frame_region = new_holdouts
            .iter()
            .skip(1)
            .fold(new_holdouts[0].region().clone(), |acc, a| {
                acc.encompass(a.region())
            });
        self.holdout_region = Some(match self.holdout_region.take() {
            Some(region) => region.encompass(&frame_region),
            None => frame_region,
        });
        self.alleles.erase_all(&new_holdouts);
    }

    fn can_reintroduce_holdouts(&self) -> bool {
        let Some(holdout_region) = &self.holdout_region else {
            return true;
        };
        if !self.active_region.ends_before(holdout_region) {
            return true;
        }
        let pending = holdout_region.right_overhang(&self.active_region);
        !self.alleles.has_overlapped(&pending)
    }

    fn reintroduce_holdouts(&mut self) {
        let frame = self.holdouts.pop().expect("active holdout frame");
        self.tree.splice(&frame.alleles);
        let holdout_region = self.holdout_region.clone().expect("holdout region");
        if holdout_region.ends_before(&self.active_region) {
            let extended_region = self.active_region.right_overhang(&holdout_region);
            let extension = self.alleles.contained(&extended_region);
            extend_tree(&extension, &mut self.tree);
        }
        self.alleles.insert_all(frame.alleles);
        if self.holdouts.is_empty() {
            self.holdout_region = None;
        }
    }

    /// The active region expanded so that every overlapping read fits, plus
    /// indel-aware flank padding, biased left near the contig start.
    fn calculate_haplotype_region(&self) -> Region {
        let overlapped = self.alleles.overlapped(&self.active_region);
        let sum_indel_sizes: u32 = overlapped.iter().map(Allele::indel_size).sum();
        let additional_padding = 2 * sum_indel_sizes + self.min_flank_pad;

        let unclamped = if self.reads.has_overlapped(&self.active_region) {
            let lhs_read = self
                .reads
                .leftmost_overlapped(&self.active_region)
                .expect("overlapping read");
            let rhs_read = self
                .reads
                .rightmost_overlapped(&self.active_region)
                .expect("overlapping read");
            let unpadded_region = lhs_read.region().encompass(rhs_read.region());
            if lhs_read.region().begin() < additional_padding / 2 {
                let lhs_padding = lhs_read.region().begin();
                let rhs_padding = additional_padding - lhs_padding;
                unpadded_region.expand(lhs_padding, rhs_padding)
            } else {
                unpadded_region.expand(additional_padding / 2, additional_padding / 2)
            }
        } else {
            self.active_region
                .expand(additional_padding / 2, additional_padding / 2)
        };

        match self.reference.contig_size(unclamped.contig()) {
            Some(size) if unclamped.end() > size => Region::new(
                Arc::clone(unclamped.contig()),
                unclamped.begin().min(size),
                size,
            ),
            _ => unclamped,
        }
    }
}

fn saturating_exp2(n: usize) -> usize {
    1usize.checked_shl(n as u32).unwrap_or(usize::MAX)
}

fn requires_more_holdouts(alleles: &[Allele], next_region: &Region, holdout_limit: usize) -> bool {
    if alleles.is_empty() {
        return false;
    }
    let overlapped = alleles
        .iter()
        .filter(|a| a.region().overlaps(next_region))
        .count();
    saturating_exp2(overlapped) > holdout_limit
}

fn can_remove_entire_passed_region(next_active_region: &Region, passed_alleles: &[Allele]) -> bool {
    let Some(rightmost) = passed_alleles.iter().max_by_key(|a| a.region().end()) else {
        return true;
    };
    !rightmost.region().overlaps(next_active_region)
}

fn requires_staged_removal(passed_alleles: &[Allele]) -> bool {
    let Some(last) = passed_alleles.last() else {
        return false;
    };
    if !last.region().is_empty() {
        return false;
    }
    passed_alleles
        .iter()
        .rev()
        .skip(1)
        .find(|a| a.region() != last.region())
        .is_some_and(Allele::is_position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{AlignedRead, ReadFlags};
    use crate::reference::InMemoryReference;

    fn reference(len: usize) -> Arc<dyn ReferenceGenome> {
        let sequence: Vec<u8> = (0..len).map(|i| b"ACGT"[i % 4]).collect();
        Arc::new(InMemoryReference::with_contig("toy", "chr1", sequence))
    }

    fn snp(at: u32, reference_sequence: &Arc<dyn ReferenceGenome>) -> Variant {
        let region = Region::new("chr1", at, at + 1);
        let ref_base = reference_sequence.sequence(&region).unwrap();
        let alt_base = if ref_base[0] == b'A' { b"C" } else { b"A" };
        Variant::new(region, ref_base, alt_base.to_vec())
    }

    fn spanning_reads(begin: u32, end: u32) -> Arc<ReadMap> {
        let mut map = ReadMap::new();
        map.insert(
            "s1",
            vec![AlignedRead::new(
                "r1",
                Region::new("chr1", begin, end),
                vec![b'A'; (end - begin) as usize],
                vec![30; (end - begin) as usize],
                60,
                ReadFlags::default(),
            )],
        );
        Arc::new(map)
    }

    #[test]
    fn two_snps_generate_and_terminate() {
        let reference = reference(100);
        let candidates = vec![snp(20, &reference), snp(24, &reference)];
        let mut generator = HaplotypeGenerator::new(
            Arc::clone(&reference),
            &candidates,
            spanning_reads(10, 40),
            Policies::default(),
            4,
        )
        .unwrap();

        let packet = generator.generate().unwrap();
        assert_eq!(packet.haplotypes.len(), 4);
        assert_eq!(packet.active_region, Region::new("chr1", 20, 25));

        let end = generator.generate().unwrap();
        assert!(end.haplotypes.is_empty());
        assert!(end
            .active_region
            .is_after(candidates[1].region()));
    }

    #[test]
    fn no_candidates_is_an_error() {
        let reference = reference(50);
        assert!(matches!(
            HaplotypeGenerator::new(
                Arc::clone(&reference),
                &[],
                Arc::new(ReadMap::new()),
                Policies::default(),
                4,
            ),
            Err(HaplotypeGeneratorError::NoCandidates)
        ));
    }

    #[test]
    fn peek_is_monotonic() {
        let reference = reference(200);
        let candidates: Vec<Variant> = (0..6).map(|i| snp(20 + 10 * i, &reference)).collect();
        let mut generator = HaplotypeGenerator::new(
            Arc::clone(&reference),
            &candidates,
            Arc::new(ReadMap::new()),
            Policies::default().with_target_limit(4),
            4,
        )
        .unwrap();

        let mut previous: Option<Region> = None;
        for _ in 0..10 {
            let Some(next) = generator.peek_next_active_region() else {
                break;
            };
            if let Some(previous) = &previous {
                assert!(previous.begin() <= next.begin());
            }
            previous = Some(next.clone());
            let packet = generator.generate().unwrap();
            if packet.haplotypes.is_empty() {
                break;
            }
        }
    }

    #[test]
    fn staged_removal_detection() {
        let insertion = Allele::new(Region::new("chr1", 10, 10), b"GG".to_vec());
        let position = Allele::new(Region::new("chr1", 9, 10), b"T".to_vec());
        assert!(requires_staged_removal(&[position.clone(), insertion.clone()]));
        assert!(!requires_staged_removal(&[insertion.clone(), position]));
        assert!(!requires_staged_removal(&[insertion]));
        assert!(!requires_staged_removal(&[]));
    }
}
