use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cormorant::hapgen::{HaplotypeGenerator, LaggingPolicy, Policies};
use cormorant::readio::ReadManager;
use cormorant::{
    AlignedRead, Assembler, InMemoryReference, ReadFilterSet, ReadFlags, ReadMap, Region, Variant,
};

#[derive(Parser, Debug)]
#[command(name = "cormorant", about = "Small-variant calling core tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LaggingArg {
    None,
    Conservative,
    Aggressive,
}

impl From<LaggingArg> for LaggingPolicy {
    fn from(arg: LaggingArg) -> Self {
        match arg {
            LaggingArg::None => LaggingPolicy::None,
            LaggingArg::Conservative => LaggingPolicy::Conservative,
            LaggingArg::Aggressive => LaggingPolicy::Aggressive,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a reference window against supporting reads and print the
    /// bubble variants.
    Assemble {
        /// Reference window (plain FASTA without headers or raw sequence).
        reference: PathBuf,
        /// Reads file (one sequence per line).
        reads: PathBuf,
        /// K-mer size.
        #[arg(long, default_value_t = 15)]
        kmer_size: usize,
        /// Minimum edge weight kept by pruning.
        #[arg(long, default_value_t = 2)]
        min_weight: u32,
        /// Maximum number of variants to extract.
        #[arg(long, default_value_t = 20)]
        max_variants: usize,
    },
    /// Walk haplotype packets over candidate variants and alignments.
    Haplotypes {
        /// Reference sequence (plain FASTA or raw sequence).
        reference: PathBuf,
        /// Candidate variants (`<position>\t<ref>\t<alt>` per line).
        variants: PathBuf,
        /// Alignments file (`<position>\t<sequence>` per line).
        alignments: PathBuf,
        /// Chromosome name (default: chr1).
        #[arg(long, default_value = "chr1")]
        chrom: String,
        /// Sample name the alignments belong to.
        #[arg(long, default_value = "sample1")]
        sample: String,
        /// Target haplotype count per packet.
        #[arg(long, default_value_t = 64)]
        target: usize,
        /// Holdout extraction bound.
        #[arg(long, default_value_t = 1024)]
        holdout: usize,
        /// Hard overflow bound.
        #[arg(long, default_value_t = 8192)]
        overflow: usize,
        /// Lagging policy.
        #[arg(long, value_enum, default_value = "none")]
        lagging: LaggingArg,
        /// Maximum holdout depth.
        #[arg(long, default_value_t = 20)]
        max_holdout_depth: usize,
        /// Minimum reference flank padding around haplotypes.
        #[arg(long, default_value_t = 30)]
        min_flank_pad: u32,
    },
    /// Query indexed BAM files through the read manager.
    Reads {
        /// Indexed BAM files.
        files: Vec<PathBuf>,
        /// Region to query, as `contig:begin-end` (0-based, half-open).
        #[arg(long)]
        region: String,
        /// Open file budget.
        #[arg(long, default_value_t = 16)]
        max_open: usize,
        /// Also report the subregion holding at most this many reads.
        #[arg(long)]
        max_reads: Option<usize>,
        /// Minimum mapping quality for counted reads.
        #[arg(long, default_value_t = 0)]
        min_mapping_quality: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Assemble {
            reference,
            reads,
            kmer_size,
            min_weight,
            max_variants,
        } => run_assemble(reference, reads, kmer_size, min_weight, max_variants),
        Commands::Haplotypes {
            reference,
            variants,
            alignments,
            chrom,
            sample,
            target,
            holdout,
            overflow,
            lagging,
            max_holdout_depth,
            min_flank_pad,
        } => {
            let policies = Policies::default()
                .with_lagging(lagging.into())
                .with_target_limit(target)
                .with_holdout_limit(holdout)
                .with_overflow_limit(overflow)
                .with_max_holdout_depth(max_holdout_depth);
            run_haplotypes(
                reference,
                variants,
                alignments,
                chrom,
                sample,
                policies,
                min_flank_pad,
            )
        }
        Commands::Reads {
            files,
            region,
            max_open,
            max_reads,
            min_mapping_quality,
        } => run_reads(files, region, max_open, max_reads, min_mapping_quality),
    }
}

fn run_assemble(
    reference_path: PathBuf,
    reads_path: PathBuf,
    kmer_size: usize,
    min_weight: u32,
    max_variants: usize,
) -> Result<()> {
    if !(3..=63).contains(&kmer_size) {
        bail!("k-mer size {kmer_size} out of range (3..=63)");
    }
    let reference = read_sequence_file(&reference_path)
        .with_context(|| format!("failed to read reference from {}", reference_path.display()))?;
    let mut assembler = Assembler::new_with_reference(kmer_size, &reference)
        .context("failed to build the reference k-mer path")?;

    let reader = BufReader::new(
        File::open(&reads_path)
            .with_context(|| format!("failed to open reads file {}", reads_path.display()))?,
    );
    let mut num_reads = 0usize;
    for line in reader.lines() {
        let read = line?.trim().to_uppercase();
        if read.is_empty() {
            continue;
        }
        assembler.insert_read(read.as_bytes());
        num_reads += 1;
    }

    if !assembler.prune(min_weight) {
        println!("Graph degenerate after pruning ({num_reads} reads); no variants.");
        return Ok(());
    }
    if !assembler.is_acyclic() {
        println!("Graph is cyclic at k={kmer_size}; retry with a larger k.");
        return Ok(());
    }
    let variants = assembler.extract_variants(max_variants);
    if assembler.blocking_cap_hit() {
        eprintln!("warning: bubble search hit the blocking cap; results may be incomplete");
    }
    if variants.is_empty() {
        println!("No variants assembled from {num_reads} reads.");
    } else {
        for variant in variants {
            println!(
                "{}\t{}\t{}",
                variant.begin_pos,
                render_allele(&variant.ref_seq),
                render_allele(&variant.alt_seq),
            );
        }
    }
    Ok(())
}

fn run_haplotypes(
    reference_path: PathBuf,
    variants_path: PathBuf,
    alignments_path: PathBuf,
    chrom: String,
    sample: String,
    policies: Policies,
    min_flank_pad: u32,
) -> Result<()> {
    let reference_sequence = read_sequence_file(&reference_path)
        .with_context(|| format!("failed to read reference from {}", reference_path.display()))?;
    let chrom: Arc<str> = Arc::from(chrom.as_str());
    let reference = Arc::new(InMemoryReference::with_contig(
        reference_path.display().to_string(),
        Arc::clone(&chrom),
        reference_sequence,
    ));

    let candidates = read_variants_file(&variants_path, &chrom)
        .with_context(|| format!("failed to read variants from {}", variants_path.display()))?;
    let mut reads = ReadMap::new();
    reads.insert(
        sample,
        read_alignment_file(&alignments_path, &chrom).with_context(|| {
            format!(
                "failed to read alignments from {}",
                alignments_path.display()
            )
        })?,
    );

    let mut generator = HaplotypeGenerator::new(
        reference,
        &candidates,
        Arc::new(reads),
        policies,
        min_flank_pad,
    )
    .context("failed to initialize the haplotype generator")?;

    loop {
        let packet = generator
            .generate()
            .context("haplotype generation failed")?;
        if packet.haplotypes.is_empty() {
            println!("done\t{}", packet.active_region);
            break;
        }
        println!(
            "packet\t{}\t{} haplotypes",
            packet.active_region,
            packet.haplotypes.len()
        );
        for haplotype in &packet.haplotypes {
            println!(
                "  {}\t{}",
                haplotype.region(),
                String::from_utf8_lossy(haplotype.sequence())
            );
        }
    }
    Ok(())
}

fn run_reads(
    files: Vec<PathBuf>,
    region: String,
    max_open: usize,
    max_reads: Option<usize>,
    min_mapping_quality: u8,
) -> Result<()> {
    if files.is_empty() {
        bail!("at least one BAM file is required");
    }
    let region = parse_region(&region)?;
    let manager = ReadManager::new(files, max_open).context("failed to index read files")?;
    println!(
        "{} files, {} samples, {} readers open",
        manager.num_files(),
        manager.num_samples(),
        manager.num_open_readers()
    );

    let filters = ReadFilterSet::new().with_min_mapping_quality(min_mapping_quality);
    let fetched = manager
        .fetch_reads_in(&region)
        .with_context(|| format!("failed to fetch reads in {region}"))?;
    for (sample, reads) in fetched {
        let kept = filters.filter(reads);
        println!("{sample}\t{} reads pass filters", kept.len());
    }
    if let Some(max_reads) = max_reads {
        let samples = manager.samples().to_vec();
        let sub = manager.find_covered_subregion(&samples, &region, max_reads)?;
        println!("covered subregion for {max_reads} reads: {sub}");
    }
    Ok(())
}

fn read_sequence_file(path: &PathBuf) -> Result<Vec<u8>> {
    let reader = BufReader::new(File::open(path)?);
    let mut sequence = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('>') {
            continue;
        }
        sequence.extend(trimmed.to_uppercase().into_bytes());
    }
    if sequence.is_empty() {
        bail!("no sequence found in {}", path.display());
    }
    Ok(sequence)
}

fn read_variants_file(path: &PathBuf, chrom: &Arc<str>) -> Result<Vec<Variant>> {
    let reader = BufReader::new(File::open(path)?);
    let mut variants = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split('\t');
        let (Some(pos), Some(ref_seq), Some(alt_seq)) =
            (fields.next(), fields.next(), fields.next())
        else {
            bail!("variant line {} is not `pos\\tref\\talt`", index + 1);
        };
        let begin: u32 = pos
            .parse()
            .with_context(|| format!("bad position on variant line {}", index + 1))?;
        let ref_seq = parse_allele(ref_seq);
        let end = begin + ref_seq.len() as u32;
        variants.push(Variant::new(
            Region::new(Arc::clone(chrom), begin, end),
            ref_seq,
            parse_allele(alt_seq),
        ));
    }
    if variants.is_empty() {
        bail!("no variants found in {}", path.display());
    }
    Ok(variants)
}

fn read_alignment_file(path: &PathBuf, chrom: &Arc<str>) -> Result<Vec<AlignedRead>> {
    let reader = BufReader::new(File::open(path)?);
    let mut reads = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut fields = trimmed.split('\t');
        let (Some(pos), Some(sequence)) = (fields.next(), fields.next()) else {
            bail!("alignment line {} is not `pos\\tsequence`", index + 1);
        };
        let begin: u32 = pos
            .parse()
            .with_context(|| format!("bad position on alignment line {}", index + 1))?;
        let sequence = sequence.to_uppercase().into_bytes();
        let end = begin + sequence.len() as u32;
        let qualities = vec![30u8; sequence.len()];
        reads.push(AlignedRead::new(
            format!("read{}", index + 1),
            Region::new(Arc::clone(chrom), begin, end),
            sequence,
            qualities,
            60,
            ReadFlags::default(),
        ));
    }
    Ok(reads)
}

fn parse_region(text: &str) -> Result<Region> {
    let (contig, range) = text
        .rsplit_once(':')
        .with_context(|| format!("region '{text}' is not `contig:begin-end`"))?;
    let (begin, end) = range
        .split_once('-')
        .with_context(|| format!("region '{text}' is not `contig:begin-end`"))?;
    let begin: u32 = begin.parse().context("bad region begin")?;
    let end: u32 = end.parse().context("bad region end")?;
    if end < begin {
        bail!("region '{text}' ends before it begins");
    }
    Ok(Region::new(contig, begin, end))
}

fn parse_allele(text: &str) -> Vec<u8> {
    // `-` and `.` denote an empty allele (insertions and deletions).
    if text == "-" || text == "." {
        Vec::new()
    } else {
        text.to_uppercase().into_bytes()
    }
}

fn render_allele(sequence: &[u8]) -> String {
    if sequence.is_empty() {
        "-".to_string()
    } else {
        String::from_utf8_lossy(sequence).into_owned()
    }
}
