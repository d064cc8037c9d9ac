//! # cormorant
//!
//! The in-memory core of a small-variant caller for aligned short-read
//! sequencing data: given a reference window and supporting reads, propose
//! the variants and candidate haplotypes a genotype model should score.
//!
//! ## Components
//!
//! 1. **Assembly** ([`assembly`]): a local de Bruijn graph over one
//!    reference window plus read substrings. After pruning, a dominator-
//!    guided shortest-path search extracts alt-vs-reference bubbles as
//!    parsimonious variants.
//! 2. **Haplotype generation** ([`hapgen`]): a lazy producer of candidate
//!    haplotype packets over a moving active region. Combinatorial blow-up
//!    is bounded by a LIFO stack of holdout allele frames, and tree state
//!    can lag across regions to carry phasing context.
//! 3. **Read management** ([`readio`]): a sample/region-indexed cache over
//!    many indexed read files under a hard open-file budget, with
//!    smallest-file-first eviction and coverage-bounded region sizing.
//!
//! Reference genomes and read files sit behind capability traits
//! ([`reference::ReferenceGenome`], [`readio::ReadFileReader`]); genotype
//! models, phasing, and VCF emission are downstream consumers of the types
//! exported here.
//!
//! ## Usage sketch
//!
//! ```
//! use cormorant::assembly::Assembler;
//!
//! let mut assembler = Assembler::new_with_reference(5, b"AAAAACCCCC")?;
//! for _ in 0..20 {
//!     assembler.insert_read(b"AAAAAGCCCCC");
//! }
//! if assembler.prune(2) {
//!     let variants = assembler.extract_variants(10);
//!     assert_eq!(variants[0].begin_pos, 5);
//!     assert_eq!(variants[0].alt_seq, b"G");
//! }
//! # Ok::<(), cormorant::assembly::AssemblerError>(())
//! ```

pub mod allele;
pub mod assembly;
pub mod hapgen;
pub mod read;
pub mod readio;
pub mod reference;
pub mod region;

pub use allele::{Allele, Variant};
pub use assembly::{AssembledVariant, Assembler, AssemblerError};
pub use hapgen::{
    HaplotypeGenerator, HaplotypeGeneratorError, HaplotypePacket, LaggingPolicy, Policies,
};
pub use read::{AlignedRead, ReadFilterSet, ReadFlags, ReadMap};
pub use readio::{ReadIoError, ReadManager};
pub use reference::{InMemoryReference, ReferenceGenome};
pub use region::{Position, Region};
