use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_htslib::bam::{self, record::Aux, FetchDefinition, Read as _};

use crate::read::{AlignedRead, ReadFlags};
use crate::region::Region;

use super::reader::{ReadFileFactory, ReadFileReader, ReadIoError, SampleName};

/// Indexed BAM reader backed by htslib.
///
/// Samples come from `@RG SM` header tags; files without read groups get
/// their file stem as the sample name and every read attributed to it.
pub struct HtslibReadReader {
    path: PathBuf,
    reader: bam::IndexedReader,
    contigs: Vec<(Arc<str>, u32)>,
    samples: Vec<SampleName>,
    read_group_samples: HashMap<String, SampleName>,
}

impl HtslibReadReader {
    /// Open `path` and its index, reading header metadata once.
    pub fn open(path: &Path) -> Result<Self, ReadIoError> {
        let reader = bam::IndexedReader::from_path(path).map_err(|e| ReadIoError::Open {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let contigs: Vec<(Arc<str>, u32)> = {
            let header = reader.header();
            let names = header.target_names();
            (0..header.target_count() as usize)
                .map(|tid| {
                    let name: Arc<str> =
                        Arc::from(String::from_utf8_lossy(names[tid]).into_owned().as_str());
                    let size = header.target_len(tid as u32).unwrap_or(0) as u32;
                    (name, size)
                })
                .collect()
        };
        let header_text = String::from_utf8_lossy(reader.header().as_bytes()).into_owned();
        let read_group_samples = parse_read_group_samples(&header_text);
        let mut samples: Vec<SampleName> = read_group_samples.values().cloned().collect();
        samples.sort();
        samples.dedup();
        if samples.is_empty() {
            samples.push(default_sample_name(path));
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            contigs,
            samples,
            read_group_samples,
        })
    }

    fn fetch(&mut self, region: &Region) -> Result<(), ReadIoError> {
        let tid = self
            .reader
            .header()
            .tid(region.contig().as_bytes())
            .ok_or_else(|| ReadIoError::UnknownContig {
                contig: region.contig().to_string(),
                path: self.path.clone(),
            })?;
        self.reader
            .fetch(FetchDefinition::Region(
                tid as i32,
                i64::from(region.begin()),
                i64::from(region.end()),
            ))
            .map_err(|e| ReadIoError::Fetch {
                path: self.path.clone(),
                source: Box::new(e),
            })
    }

    fn sample_of(&self, record: &bam::Record) -> SampleName {
        if let Ok(Aux::String(read_group)) = record.aux(b"RG") {
            if let Some(sample) = self.read_group_samples.get(read_group) {
                return sample.clone();
            }
        }
        self.samples[0].clone()
    }

    /// Visit records of the requested samples overlapping `region` until
    /// the visitor returns `false`.
    fn scan(
        &mut self,
        samples: &[SampleName],
        region: &Region,
        mut visit: impl FnMut(&bam::Record, &SampleName) -> bool,
    ) -> Result<(), ReadIoError> {
        self.fetch(region)?;
        let mut record = bam::Record::new();
        loop {
            // Borrow of the reader ends between reads so `sample_of` can
            // run against `self`.
            let next = self.reader.read(&mut record);
            match next {
                None => return Ok(()),
                Some(Err(e)) => {
                    return Err(ReadIoError::Fetch {
                        path: self.path.clone(),
                        source: Box::new(e),
                    })
                }
                Some(Ok(())) => {
                    let sample = self.sample_of(&record);
                    if !samples.contains(&sample) {
                        continue;
                    }
                    if !visit(&record, &sample) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl ReadFileReader for HtslibReadReader {
    fn mapped_regions(&self) -> Option<Vec<Region>> {
        // The BAM index does not expose a cheap region list.
        None
    }

    fn mapped_contigs(&self) -> Option<Vec<Arc<str>>> {
        None
    }

    fn reference_contigs(&self) -> Vec<Arc<str>> {
        self.contigs.iter().map(|(name, _)| Arc::clone(name)).collect()
    }

    fn reference_size(&self, contig: &str) -> Option<u32> {
        self.contigs
            .iter()
            .find(|(name, _)| name.as_ref() == contig)
            .map(|&(_, size)| size)
    }

    fn extract_samples(&self) -> Vec<SampleName> {
        self.samples.clone()
    }

    fn has_reads(&mut self, samples: &[SampleName], region: &Region) -> Result<bool, ReadIoError> {
        let mut found = false;
        self.scan(samples, region, |_, _| {
            found = true;
            false
        })?;
        Ok(found)
    }

    fn count_reads(
        &mut self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<usize, ReadIoError> {
        let mut count = 0usize;
        self.scan(samples, region, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    fn fetch_reads(
        &mut self,
        samples: &[SampleName],
        region: &Region,
    ) -> Result<HashMap<SampleName, Vec<AlignedRead>>, ReadIoError> {
        let mut result: HashMap<SampleName, Vec<AlignedRead>> = samples
            .iter()
            .map(|sample| (sample.clone(), Vec::new()))
            .collect();
        let contig = Arc::clone(region.contig());
        let mut collected: Vec<(SampleName, AlignedRead)> = Vec::new();
        self.scan(samples, region, |record, sample| {
            collected.push((sample.clone(), convert_record(record, &contig)));
            true
        })?;
        for (sample, read) in collected {
            result.entry(sample).or_default().push(read);
        }
        for reads in result.values_mut() {
            reads.sort();
        }
        Ok(result)
    }

    fn extract_read_positions(
        &mut self,
        samples: &[SampleName],
        region: &Region,
        max: usize,
    ) -> Result<Vec<u32>, ReadIoError> {
        let mut positions = Vec::new();
        self.scan(samples, region, |record, _| {
            positions.push(record.pos().max(0) as u32);
            positions.len() < max
        })?;
        Ok(positions)
    }
}

fn convert_record(record: &bam::Record, contig: &Arc<str>) -> AlignedRead {
    let begin = record.pos().max(0) as u32;
    let end = record.cigar().end_pos().max(i64::from(begin)) as u32;
    let flags = ReadFlags {
        unmapped: record.is_unmapped(),
        duplicate: record.is_duplicate(),
        qc_fail: record.is_quality_check_failed(),
        secondary: record.is_secondary(),
        supplementary: record.is_supplementary(),
        mate_unmapped: record.is_mate_unmapped(),
    };
    AlignedRead::new(
        String::from_utf8_lossy(record.qname()).into_owned(),
        Region::new(Arc::clone(contig), begin, end),
        record.seq().as_bytes(),
        record.qual().to_vec(),
        record.mapq(),
        flags,
    )
}

fn parse_read_group_samples(header_text: &str) -> HashMap<String, SampleName> {
    let mut result = HashMap::new();
    for line in header_text.lines().filter(|l| l.starts_with("@RG")) {
        let mut id: Option<&str> = None;
        let mut sample: Option<&str> = None;
        for field in line.split('\t').skip(1) {
            if let Some(value) = field.strip_prefix("ID:") {
                id = Some(value);
            } else if let Some(value) = field.strip_prefix("SM:") {
                sample = Some(value);
            }
        }
        if let (Some(id), Some(sample)) = (id, sample) {
            result.insert(id.to_string(), sample.to_string());
        }
    }
    result
}

fn default_sample_name(path: &Path) -> SampleName {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Factory opening real BAM files with [`HtslibReadReader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BamReadFileFactory;

impl ReadFileFactory for BamReadFileFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn ReadFileReader>, ReadIoError> {
        Ok(Box::new(HtslibReadReader::open(path)?))
    }

    fn file_size(&self, path: &Path) -> Result<u64, ReadIoError> {
        std::fs::metadata(path)
            .map(|metadata| metadata.len())
            .map_err(|source| ReadIoError::Metadata {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_group_samples_are_parsed() {
        let header = "@HD\tVN:1.6\n@RG\tID:rg1\tSM:tumour\n@RG\tID:rg2\tSM:normal\tPL:ILLUMINA\n";
        let map = parse_read_group_samples(header);
        assert_eq!(map.get("rg1").map(String::as_str), Some("tumour"));
        assert_eq!(map.get("rg2").map(String::as_str), Some("normal"));
    }

    #[test]
    fn missing_read_groups_fall_back_to_file_stem() {
        assert_eq!(default_sample_name(Path::new("/data/sampleA.bam")), "sampleA");
    }
}
