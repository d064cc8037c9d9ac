use cormorant::assembly::{AssembledVariant, Assembler};

fn variant(pos: u32, ref_seq: &str, alt_seq: &str) -> AssembledVariant {
    AssembledVariant {
        begin_pos: pos,
        ref_seq: ref_seq.as_bytes().to_vec(),
        alt_seq: alt_seq.as_bytes().to_vec(),
    }
}

#[test]
fn trivial_snp_bubble() {
    // Reference with all-distinct 5-mers; ten reads support a single
    // substitution at position 7.
    let mut assembler = Assembler::new_with_reference(5, b"ACGCTAGTCGATTC").unwrap();
    for _ in 0..10 {
        assembler.insert_read(b"ACGCTAGACGATTC");
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(10);
    assert_eq!(variants, vec![variant(7, "T", "A")]);
}

#[test]
fn insertion_bubble() {
    let mut assembler = Assembler::new_with_reference(5, b"AAAAACCCCC").unwrap();
    for _ in 0..20 {
        assembler.insert_read(b"AAAAAGCCCCC");
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(10);
    assert_eq!(variants, vec![variant(5, "", "G")]);
}

#[test]
fn two_ordered_snp_bubbles() {
    // Two independent read piles, each supporting one substitution.
    let reference = b"ACGCTAGTCGATTCAGTC";
    let mut assembler = Assembler::new_with_reference(5, reference).unwrap();
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTATTCGATTCAGTC"); // G>T at 6
    }
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTAGTCGAGTCAGTC"); // T>G at 11
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(10);
    assert_eq!(variants, vec![variant(6, "G", "T"), variant(11, "T", "G")]);
}

#[test]
fn extraction_is_sorted_unique_and_bounded() {
    let reference = b"ACGCTAGTCGATTCAGTC";
    let mut assembler = Assembler::new_with_reference(5, reference).unwrap();
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTATTCGATTCAGTC");
    }
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTAGTCGAGTCAGTC");
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(1);
    assert_eq!(variants.len(), 1);

    let mut assembler = Assembler::new_with_reference(5, reference).unwrap();
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTATTCGATTCAGTC");
    }
    for _ in 0..15 {
        assembler.insert_read(b"ACGCTAGTCGAGTCAGTC");
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(10);
    for pair in variants.windows(2) {
        assert!(
            (pair[0].begin_pos, pair[0].ref_seq.len(), &pair[0].alt_seq)
                < (pair[1].begin_pos, pair[1].ref_seq.len(), &pair[1].alt_seq)
        );
        assert!((pair[0].begin_pos, &pair[0].alt_seq) != (pair[1].begin_pos, &pair[1].alt_seq));
    }
}

#[test]
fn all_reference_graph_round_trips_to_nothing() {
    let reference = b"ACGCTAGTCGATTCAGTC";
    let mut assembler = Assembler::new_with_reference(5, reference).unwrap();
    // Reads that exactly match the reference add no alt kmers.
    for _ in 0..5 {
        assembler.insert_read(reference);
    }
    assert!(assembler.is_all_reference());
    assert!(assembler.extract_variants(usize::MAX).is_empty());
}

#[test]
fn reference_unique_path_survives_any_read_order() {
    let reference = b"ACGCTAGTCGATTCAGTC";
    let reads: [&[u8]; 3] = [
        b"ACGCTATTCGATTCAGTC",
        b"ACGCTAGTCGAGTCAGTC",
        b"CGCTAGTCGATTCAGTC",
    ];
    // Insert in every rotation, before and after the reference.
    for rotation in 0..reads.len() {
        let mut assembler = Assembler::new(5);
        for i in 0..reads.len() {
            assembler.insert_read(reads[(rotation + i) % reads.len()]);
        }
        assembler.insert_reference(reference).unwrap();
        assert!(assembler.is_reference_unique_path());
        for i in 0..reads.len() {
            assembler.insert_read(reads[(rotation + i) % reads.len()]);
        }
        assert!(assembler.is_reference_unique_path());
    }
}

#[test]
fn pruned_graph_keeps_unique_reference_path() {
    let mut assembler = Assembler::new_with_reference(5, b"ACGCTAGTCGATTCAGTC").unwrap();
    for _ in 0..3 {
        assembler.insert_read(b"ACGCTATTCGATTCAGTC");
    }
    assembler.insert_read(b"ACGCTAGTCGAGTCAGTC"); // below min weight
    assert!(assembler.prune(2));
    assert!(assembler.is_reference_unique_path());
    let variants = assembler.extract_variants(10);
    assert_eq!(variants, vec![variant(6, "G", "T")]);
}

#[test]
fn deletion_bubble_is_parsimonious() {
    let mut assembler = Assembler::new_with_reference(5, b"ACGCTAGGTCGATTC").unwrap();
    for _ in 0..12 {
        assembler.insert_read(b"ACGCTAGTCGATTC"); // deletes one G
    }
    assert!(assembler.prune(2));
    let variants = assembler.extract_variants(10);
    assert_eq!(variants, vec![variant(7, "G", "")]);
}
