use crate::allele::Allele;
use crate::read::ReadMap;
use crate::region::Region;

use super::allele_set::AlleleFlatSet;

/// How a walk treats alleles still overlapping the current active region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPolicy {
    /// Only novel alleles seed the next region.
    IncludeNone,
    /// Keep every allele overlapping the current region (holdout walks).
    IncludeAll,
    /// Keep indicators sharing a read with the first novel allele
    /// (conservative lagging).
    SharedWithNovel,
    /// Keep indicators whose reads extend beyond the current region
    /// (aggressive lagging).
    LinkableToNovel,
}

/// Chooses successor active regions from the remaining alleles and the read
/// layout.
///
/// A walk selects up to `max_included` novel alleles (always completing the
/// last site), then widens across further sites spanned by reads that
/// overlap the selection: sites a read links to the selection have to be
/// genotyped together or pushed to holdouts, so they belong in one region.
#[derive(Debug, Clone)]
pub struct GenomeWalker {
    max_included: usize,
    indicator_policy: IndicatorPolicy,
}

/// Allele budget per walk step derived from the target haplotype count.
pub fn max_included(target_haplotypes: usize) -> usize {
    let log = (target_haplotypes.max(2) as f64).log2().floor() as usize;
    2 * log.max(1) - 1
}

impl GenomeWalker {
    /// A walker including up to `max_included` novel alleles per step.
    pub fn new(max_included: usize, indicator_policy: IndicatorPolicy) -> Self {
        Self {
            max_included: max_included.max(1),
            indicator_policy,
        }
    }

    /// Pick the next active region after `current`.
    ///
    /// When no allele remains beyond `current` the returned region is empty
    /// and strictly past it, signalling exhaustion.
    pub fn walk(&self, current: &Region, reads: &ReadMap, alleles: &AlleleFlatSet) -> Region {
        let novel: Vec<&Allele> = alleles
            .iter()
            .filter(|a| a.region().begin() >= current.end())
            .collect();
        let Some(&first_novel) = novel.first() else {
            return current.tail().shift(2);
        };

        let mut selected: Vec<&Allele> = Vec::new();
        for &allele in &novel {
            if selected.len() >= self.max_included {
                // Never split a site: take the rest of the last region.
                if allele.region() == selected[selected.len() - 1].region() {
                    selected.push(allele);
                    continue;
                }
                break;
            }
            selected.push(allele);
        }

        let mut span = selected
            .iter()
            .skip(1)
            .fold(selected[0].region().clone(), |acc, a| {
                acc.encompass(a.region())
            });

        // One hop of read linkage: any site a spanning read ties to the
        // selection joins the region.
        let link_end = reads
            .reads()
            .filter(|r| r.region().overlaps(&span))
            .map(|r| r.region().end())
            .max();
        if let Some(link_end) = link_end {
            for &allele in &novel[selected.len()..] {
                if allele.region().end() <= link_end {
                    span = span.encompass(allele.region());
                } else {
                    break;
                }
            }
        }

        for indicator in self.indicators(current, reads, first_novel, alleles) {
            span = span.encompass(indicator.region());
        }
        span
    }

    fn indicators<'a>(
        &self,
        current: &Region,
        reads: &ReadMap,
        first_novel: &Allele,
        alleles: &'a AlleleFlatSet,
    ) -> Vec<&'a Allele> {
        let overlapping = || alleles.iter().filter(|a| a.region().overlaps(current));
        match self.indicator_policy {
            IndicatorPolicy::IncludeNone => Vec::new(),
            IndicatorPolicy::IncludeAll => overlapping().collect(),
            IndicatorPolicy::SharedWithNovel => overlapping()
                .filter(|a| {
                    reads.reads().any(|r| {
                        r.region().overlaps(a.region())
                            && r.region().overlaps(first_novel.region())
                    })
                })
                .collect(),
            IndicatorPolicy::LinkableToNovel => overlapping()
                .filter(|a| {
                    reads.reads().any(|r| {
                        r.region().overlaps(a.region()) && r.region().end() > current.end()
                    })
                })
                .collect(),
        }
    }
}
