use std::fs::File;
use std::path::Path;
use rust_htslib::{bam, bam::Read};
use bio::io::bed;
use indexmap::IndexSet;
use log::{debug, info, warn};

use crate::lib::common::{*};


/// A region of interest as read from a BED file.
/// Coordinates are 0-based, end exclusive
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct RegionOfInterest {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// Reads all regions from a BED file, keeping the order of the file.
/// Only the first 3 columns are used.
///
/// Unittest: TRUE
///
pub fn read_bed_regions<P: AsRef<Path>>(
    path: P
) -> Result<Vec<RegionOfInterest>, AltMapError> {
    let input = File::open(path)?;
    let mut reader = bed::Reader::new(input);
    let mut regions = Vec::new();
    for entry in reader.records() {
        let record = entry?;
        if record.end() < record.start() {
            return Err(AltMapError::Region(format!(
                "region {}:{}-{} ends before it starts",
                record.chrom(), record.start(), record.end()
            )));
        }
        regions.push(RegionOfInterest {
            chrom: record.chrom().to_string(),
            start: record.start(),
            end: record.end(),
        });
    }
    Ok(regions)
}


/// Anything which can tell us which reads align into a region.
/// Implemented for an indexed BAM reader, tests use an in-memory source.
pub trait AlignmentSource {
    /// true if the source knows this reference sequence
    fn has_contig(&self, chrom: &str) -> bool;
    /// names of all reads with an alignment overlapping the region,
    /// a name can occur several times
    fn fetch_read_names(&mut self, region: &RegionOfInterest) -> Result<Vec<String>, AltMapError>;
}

impl AlignmentSource for bam::IndexedReader {
    fn has_contig(&self, chrom: &str) -> bool {
        self.header().tid(chrom.as_bytes()).is_some()
    }

    fn fetch_read_names(&mut self, region: &RegionOfInterest) -> Result<Vec<String>, AltMapError> {
        self.fetch((region.chrom.as_str(), region.start, region.end))?;
        let mut names = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = self.read(&mut record) {
            result?;
            names.push(String::from_utf8_lossy(record.qname()).into_owned());
        }
        Ok(names)
    }
}


/// Decides on the read name if a read is worth looking at.
/// Nanopore 2D reads end with "2d", assembled contigs start with "ctg".
/// Both conditions are OR'd, if neither is set every read passes.
#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct ReadNamePredicate {
    pub suffix: Option<String>,
    pub prefix: Option<String>,
}

impl ReadNamePredicate {
    pub fn new(
        suffix: Option<&str>,
        prefix: Option<&str>
    ) -> ReadNamePredicate {
        ReadNamePredicate {
            suffix: suffix.filter(|x| !x.is_empty()).map(String::from),
            prefix: prefix.filter(|x| !x.is_empty()).map(String::from),
        }
    }

    /// ```
    /// use altmapping::lib::hts_lib_based::ReadNamePredicate;
    /// let predicate = ReadNamePredicate::new(Some("2d"), Some("ctg"));
    /// assert!(predicate.matches("read_17_2d"));
    /// assert!(predicate.matches("ctg0042"));
    /// assert!(!predicate.matches("read_17_template"));
    /// ```
    pub fn matches(&self, name: &str) -> bool {
        if self.suffix.is_none() && self.prefix.is_none() {
            return true;
        }
        let by_suffix = self.suffix.as_deref().map_or(false, |s| name.ends_with(s));
        let by_prefix = self.prefix.as_deref().map_or(false, |p| name.starts_with(p));
        by_suffix || by_prefix
    }
}


/// Walks over all regions and collects the names of reads aligning there
/// which pass the name predicate. Names are unique and kept in the order
/// they were first seen.
/// Regions on chromosomes unknown to the source are skipped with a warning.
///
/// Unittest: TRUE
///
pub fn select_candidate_reads<S: AlignmentSource>(
    source: &mut S,
    regions: &[RegionOfInterest],
    predicate: &ReadNamePredicate
) -> Result<IndexSet<String>, AltMapError> {
    let mut candidates: IndexSet<String> = IndexSet::new();
    for region in regions {
        if !source.has_contig(&region.chrom) {
            warn!("region {}:{}-{} is on a chromosome unknown to the alignments, skipped", region.chrom, region.start, region.end);
            continue;
        }
        let names = source.fetch_read_names(region)?;
        debug!("Region {}:{}-{} overlaps {} alignments", region.chrom, region.start, region.end, names.len());
        for name in names {
            if predicate.matches(&name) {
                candidates.insert(name);
            }
        }
    }
    Ok(candidates)
}

/// Opens the BAM and the BED file, selects the candidate reads and
/// closes both again before returning.
///
/// Unittest: FALSE
///
pub fn gather_candidate_reads(
    bam_file: &str,
    region_file: &str,
    predicate: &ReadNamePredicate,
    threads: usize
) -> Result<IndexSet<String>, AltMapError> {
    let regions = read_bed_regions(region_file)?;
    info!("{} regions of interest in {}", regions.len(), region_file);

    let mut bam = bam::IndexedReader::from_path(bam_file)?;
    if threads > 1 {
        bam.set_threads(threads)?;
    }
    let candidates = select_candidate_reads(&mut bam, &regions, predicate)?;
    info!("{} candidate reads in regions of interest", candidates.len());
    Ok(candidates)
}
