use proptest::prelude::*;

use cormorant::assembly::Assembler;
use cormorant::readio::ReadManager;
use cormorant::region::Region;

mod common;

use common::{MockFileSpec, MockReadFactory};

fn dna(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')],
        len,
    )
}

fn has_distinct_kmers(sequence: &[u8], k: usize) -> bool {
    let mut seen = std::collections::HashSet::new();
    sequence.windows(k).all(|w| seen.insert(w.to_vec()))
}

proptest! {
    #[test]
    fn reference_path_is_unique_for_any_read_order(
        reference in dna(8..24),
        reads in proptest::collection::vec(dna(5..20), 0..8),
        reads_first in any::<bool>(),
    ) {
        prop_assume!(has_distinct_kmers(&reference, 5));
        let mut assembler = Assembler::new(5);
        if reads_first {
            for read in &reads {
                assembler.insert_read(read);
            }
        }
        assembler.insert_reference(&reference).expect("canonical reference");
        prop_assert!(assembler.is_reference_unique_path());
        if !reads_first {
            for read in &reads {
                assembler.insert_read(read);
            }
        }
        prop_assert!(assembler.is_reference_unique_path());
    }

    #[test]
    fn prune_is_idempotent_on_success(
        reference in dna(10..24),
        reads in proptest::collection::vec(dna(6..20), 0..8),
        min_weight in 1u32..4,
    ) {
        prop_assume!(has_distinct_kmers(&reference, 5));
        let mut assembler = Assembler::new_with_reference(5, &reference).unwrap();
        for read in &reads {
            assembler.insert_read(read);
        }
        if assembler.prune(min_weight) {
            let kmers = assembler.num_kmers();
            let head = assembler.reference_head_position();
            prop_assert!(assembler.is_reference_unique_path());
            prop_assert!(assembler.prune(min_weight));
            prop_assert_eq!(assembler.num_kmers(), kmers);
            prop_assert_eq!(assembler.reference_head_position(), head);
        } else {
            prop_assert!(assembler.is_empty());
        }
    }

    #[test]
    fn extraction_is_bounded_sorted_and_unique(
        reference in dna(12..28),
        reads in proptest::collection::vec(dna(6..24), 0..10),
        max in 1usize..6,
    ) {
        prop_assume!(has_distinct_kmers(&reference, 5));
        let mut assembler = Assembler::new_with_reference(5, &reference).unwrap();
        for read in &reads {
            assembler.insert_read(read);
        }
        if !assembler.prune(2) || !assembler.is_acyclic() {
            return Ok(());
        }
        let variants = assembler.extract_variants(max);
        prop_assert!(variants.len() <= max);
        for pair in variants.windows(2) {
            let lhs = (pair[0].begin_pos, pair[0].ref_seq.len(), &pair[0].alt_seq);
            let rhs = (pair[1].begin_pos, pair[1].ref_seq.len(), &pair[1].alt_seq);
            prop_assert!(lhs < rhs);
            prop_assert!(
                (pair[0].begin_pos, &pair[0].alt_seq) != (pair[1].begin_pos, &pair[1].alt_seq)
            );
        }
    }

    #[test]
    fn read_manager_invariants_hold_across_queries(
        sizes in proptest::collection::vec(1u64..1000, 1..6),
        max_open in 1usize..4,
        query_begin in 0u32..150,
    ) {
        let mut factory = MockReadFactory::new();
        let mut paths = Vec::new();
        for (index, &size) in sizes.iter().enumerate() {
            let spec = MockFileSpec::new(size, &format!("s{index}"), "chr1", 10_000)
                .with_mapped_region(0, 200)
                .with_read_starts(&[10, 60, 110], 20);
            paths.push(factory.register(&format!("/mock/p{index}.bam"), spec));
        }
        let num_files = paths.len();
        let manager = ReadManager::with_factory(paths, max_open, Box::new(factory)).unwrap();
        prop_assert!(manager.good());
        prop_assert!(manager.num_open_readers() <= max_open);

        let region = Region::new("chr1", query_begin, query_begin + 50);
        let samples: Vec<String> = manager.samples().to_vec();
        let fetched = manager.fetch_reads(&samples, &region).unwrap();
        let total: usize = fetched.values().map(Vec::len).sum();
        prop_assert_eq!(total, manager.count_reads(&samples, &region).unwrap());
        for (sample, fetched_reads) in &fetched {
            prop_assert!(manager.samples().contains(sample));
            for read in fetched_reads {
                prop_assert!(read.region().overlaps(&region));
            }
        }
        prop_assert!(manager.good());
        prop_assert!(manager.num_open_readers() <= max_open.min(num_files));
    }
}
