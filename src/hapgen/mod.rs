//! Haplotype generation: a lazy producer of candidate haplotypes over a
//! moving active region, with holdout bounding and optional lagging.

pub mod allele_set;
pub mod generator;
pub mod haplotype;
pub mod walker;

pub use allele_set::AlleleFlatSet;
pub use generator::{
    HaplotypeGenerator, HaplotypeGeneratorError, HaplotypeLimits, HaplotypePacket, LaggingPolicy,
    Policies,
};
pub use haplotype::{Haplotype, HaplotypeTree};
pub use walker::{GenomeWalker, IndicatorPolicy};
