use std::sync::Arc;

use cormorant::hapgen::{HaplotypeGenerator, HaplotypeGeneratorError, LaggingPolicy, Policies};
use cormorant::read::ReadMap;
use cormorant::reference::{InMemoryReference, ReferenceGenome};
use cormorant::region::Region;
use cormorant::Variant;

mod common;

use common::make_read;

const CONTIG: &str = "chr1";

fn reference(len: usize) -> Arc<dyn ReferenceGenome> {
    let sequence: Vec<u8> = (0..len).map(|i| b"ACGT"[i % 4]).collect();
    Arc::new(InMemoryReference::with_contig("toy", CONTIG, sequence))
}

fn snp(at: u32, reference: &Arc<dyn ReferenceGenome>) -> Variant {
    let region = Region::new(CONTIG, at, at + 1);
    let ref_base = reference.sequence(&region).unwrap();
    let alt_base = if ref_base[0] == b'A' { b"C" } else { b"A" };
    Variant::new(region, ref_base, alt_base.to_vec())
}

/// 64 independent SNPs three bases apart, all spanned by deep reads.
fn dense_cluster(reference: &Arc<dyn ReferenceGenome>) -> (Vec<Variant>, Arc<ReadMap>) {
    let candidates: Vec<Variant> = (0..64).map(|i| snp(10 + 3 * i, reference)).collect();
    let mut reads = ReadMap::new();
    reads.insert(
        "s1",
        (0..4)
            .map(|i| make_read(&format!("r{i}"), Arc::from(CONTIG), 0, 250))
            .collect(),
    );
    (candidates, Arc::new(reads))
}

#[test]
fn dense_cluster_overflows_without_holdouts() {
    let reference = reference(400);
    let (candidates, reads) = dense_cluster(&reference);
    let policies = Policies::default()
        .with_target_limit(32)
        .with_holdout_limit(64)
        .with_overflow_limit(128)
        .with_max_holdout_depth(0);
    let mut generator =
        HaplotypeGenerator::new(Arc::clone(&reference), &candidates, reads, policies, 8).unwrap();

    match generator.generate() {
        Err(HaplotypeGeneratorError::Overflow { region, size }) => {
            assert!(size > 128);
            let cluster = Region::new(CONTIG, 10, 200);
            assert!(region.overlaps(&cluster));
            assert!(cluster.contains(&region));
        }
        other => panic!("expected overflow, got {other:?}"),
    }
}

#[test]
fn holdouts_bound_the_dense_cluster_and_reenter() {
    let reference = reference(400);
    let (candidates, reads) = dense_cluster(&reference);
    let rightmost = candidates.last().unwrap().region().clone();
    let policies = Policies::default()
        .with_target_limit(32)
        .with_holdout_limit(64)
        .with_overflow_limit(128)
        .with_max_holdout_depth(2);
    let mut generator =
        HaplotypeGenerator::new(Arc::clone(&reference), &candidates, reads, policies, 8).unwrap();

    let mut packets = 0usize;
    let terminal = loop {
        assert!(packets < 200, "generator failed to terminate");
        let packet = generator.generate().expect("holdouts should avoid overflow");
        if packet.haplotypes.is_empty() {
            break packet;
        }
        packets += 1;
        assert!(!packet.active_region.is_empty());
    };

    // Many bounded packets rather than one exploding region.
    assert!(packets > 2);
    assert!(terminal.active_region.is_after(&rightmost));
}

#[test]
fn sparse_candidates_stream_in_order_and_terminate() {
    let reference = reference(400);
    let candidates: Vec<Variant> = (0..6).map(|i| snp(20 + 40 * i, &reference)).collect();
    let mut reads = ReadMap::new();
    reads.insert(
        "s1",
        (0..6)
            .map(|i| make_read(&format!("r{i}"), Arc::from(CONTIG), 40 * i, 40 * i + 30))
            .collect(),
    );
    let policies = Policies::default().with_target_limit(8);
    let mut generator = HaplotypeGenerator::new(
        Arc::clone(&reference),
        &candidates,
        Arc::new(reads),
        policies,
        8,
    )
    .unwrap();

    let mut previous_begin = 0u32;
    let mut packets = 0usize;
    loop {
        assert!(packets < 50, "generator failed to terminate");
        let packet = generator.generate().unwrap();
        if packet.haplotypes.is_empty() {
            assert!(packet.active_region.is_after(candidates.last().unwrap().region()));
            break;
        }
        assert!(packet.active_region.begin() >= previous_begin);
        previous_begin = packet.active_region.begin();
        // Each site is biallelic, so packets carry a power of two.
        assert!(packet.haplotypes.len().is_power_of_two());
        packets += 1;
    }
    assert!(packets >= 1);
}

#[test]
fn lagging_carries_tree_state_to_completion() {
    let reference = reference(200);
    let candidates: Vec<Variant> = (0..6).map(|i| snp(20 + 10 * i, &reference)).collect();
    let mut reads = ReadMap::new();
    reads.insert("s1", vec![make_read("r0", Arc::from(CONTIG), 0, 100)]);
    let policies = Policies::default()
        .with_lagging(LaggingPolicy::Conservative)
        .with_target_limit(4);
    let mut generator = HaplotypeGenerator::new(
        Arc::clone(&reference),
        &candidates,
        Arc::new(reads),
        policies,
        8,
    )
    .unwrap();

    let mut total_haplotypes = 0usize;
    let mut packets = 0usize;
    loop {
        assert!(packets < 50, "generator failed to terminate");
        let packet = generator.generate().unwrap();
        if packet.haplotypes.is_empty() {
            break;
        }
        total_haplotypes += packet.haplotypes.len();
        packets += 1;
    }
    assert!(total_haplotypes >= 2);
}

#[test]
fn generator_without_reads_still_advances() {
    let reference = reference(400);
    let candidates: Vec<Variant> = (0..4).map(|i| snp(50 + 50 * i, &reference)).collect();
    let policies = Policies::default().with_target_limit(8);
    let mut generator = HaplotypeGenerator::new(
        Arc::clone(&reference),
        &candidates,
        Arc::new(ReadMap::new()),
        policies,
        8,
    )
    .unwrap();

    let mut packets = 0usize;
    loop {
        assert!(packets < 50, "generator failed to terminate");
        let packet = generator.generate().unwrap();
        if packet.haplotypes.is_empty() {
            break;
        }
        packets += 1;
    }
    assert!(packets >= 1);
}
