use indexmap::IndexMap;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::io;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use chrono::{DateTime, Local};
use log::info;

use crate::lib::layout::ReadLayout;


/// Collection of all alternative mappings which were retained for
/// a read, organized by read name. Every candidate read is a key,
/// even if no mapping passed the filters.
pub type ReadMappingCollection = IndexMap<String, Vec<MappingRecord>>;

/// Everything which can go wrong along the way.
/// Only `Format` is recoverable, the offending LAST block is dropped
/// and parsing continues with the next block.
#[derive(Debug)]
pub enum AltMapError {
    /// a mandatory input file does not exist
    MissingInput {
        /// what the file should have been, e.g. "BAM"
        kind: &'static str,
        path: String,
    },
    /// a malformed or truncated LAST block
    Format {
        /// 1-based line on which the problem was found
        line: usize,
        message: String,
    },
    Io(io::Error),
    Htslib(rust_htslib::errors::Error),
    /// BED file could not be parsed
    Region(String),
    /// invalid combination of options
    Config(String),
    /// the plotting backend failed
    Render(String),
}

impl AltMapError {
    /// Exit status for the command line tool. Each missing input gets
    /// its own code so that wrappers can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            AltMapError::MissingInput { kind: "BAM", .. } => 2,
            AltMapError::MissingInput { kind: "region BED", .. } => 3,
            AltMapError::MissingInput { kind: "LAST", .. } => 4,
            AltMapError::MissingInput { .. } => 5,
            _ => 1,
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, AltMapError::Format { .. })
    }
}

impl fmt::Display for AltMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltMapError::MissingInput { kind, path } => write!(f, "ERROR: invalid {} file {}", kind, path),
            AltMapError::Format { line, message } => write!(f, "ERROR: malformed LAST block at line {}: {}", line, message),
            AltMapError::Io(e) => write!(f, "ERROR: I/O failure: {}", e),
            AltMapError::Htslib(e) => write!(f, "ERROR: BAM access failed: {}", e),
            AltMapError::Region(m) => write!(f, "ERROR: could not read regions: {}", m),
            AltMapError::Config(m) => write!(f, "ERROR: invalid configuration: {}", m),
            AltMapError::Render(m) => write!(f, "ERROR: could not render plot: {}", m),
        }
    }
}

impl Error for AltMapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AltMapError::Io(e) => Some(e),
            AltMapError::Htslib(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AltMapError {
    fn from(e: io::Error) -> Self {
        AltMapError::Io(e)
    }
}

impl From<rust_htslib::errors::Error> for AltMapError {
    fn from(e: rust_htslib::errors::Error) -> Self {
        AltMapError::Htslib(e)
    }
}

impl From<csv::Error> for AltMapError {
    fn from(e: csv::Error) -> Self {
        AltMapError::Region(e.to_string())
    }
}


/// Strand of an alignment half.
/// LAST reports "+/-" but we prefer an explicit direction
#[derive(Debug,Clone,Copy,Hash,Eq,PartialEq)]
pub enum StrandDirection {
    Fwd,
    Rev,
}

impl StrandDirection {
    pub fn from_symbol(symbol: &str) -> Option<StrandDirection> {
        match symbol {
            "+" => Some(StrandDirection::Fwd),
            "-" => Some(StrandDirection::Rev),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            StrandDirection::Fwd => "+",
            StrandDirection::Rev => "-",
        }
    }
}


/// One half of a LAST alignment, either the reference
/// or the read side.
/// All coordinates are 0-based
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct GenomicRegion {
    /// chromosome for the reference side, read name for the read side
    pub locus: String,
    /// start of the aligned span
    /// 0-based
    pub start: u64,
    /// length of the aligned span
    pub length: u64,
    pub strand: StrandDirection,
    /// length of the whole source sequence, read or chromosome
    pub total_length: u64,
    /// aligned sequence, can be elided
    pub sequence: String,
}

impl GenomicRegion {
    /// Decodes a single region line of a LAST block.
    /// The expected layout is
    ///
    /// ```text
    /// s 7     1000 50 + 200000 ACGT...
    /// ```
    ///
    /// tag, locus, start, length, strand, total length and sequence.
    ///
    /// Unittest: TRUE
    ///
    /// ```
    /// use altmapping::lib::common::{GenomicRegion, StrandDirection};
    /// let region = GenomicRegion::from_last_line("s readA 10 50 - 5000 ACGT").unwrap();
    /// assert_eq!(region.locus, "readA");
    /// assert_eq!(region.strand, StrandDirection::Rev);
    /// assert_eq!(region.end(), 60);
    /// ```
    pub fn from_last_line(line: &str) -> Result<GenomicRegion, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(format!("expected 7 fields in region line, found {}", fields.len()));
        }
        let start = parse_coordinate(fields[2], "start")?;
        let length = parse_coordinate(fields[3], "length")?;
        let strand = StrandDirection::from_symbol(fields[4])
            .ok_or_else(|| format!("invalid strand {:?}", fields[4]))?;
        let total_length = parse_coordinate(fields[5], "total length")?;
        match start.checked_add(length) {
            Some(end) if end <= total_length => (),
            _ => {
                return Err(format!(
                    "region {}:{}+{} exceeds sequence length {}",
                    fields[1], start, length, total_length
                ));
            }
        }
        Ok(GenomicRegion {
            locus: fields[1].to_string(),
            start,
            length,
            strand,
            total_length,
            sequence: fields[6].to_string(),
        })
    }

    /// end of the aligned span, exclusive
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn is_reverse(&self) -> bool {
        self.strand == StrandDirection::Rev
    }

    pub fn locus_ordinal(&self) -> Option<u8> {
        locus_ordinal(&self.locus)
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{} {}", self.locus, self.start, self.end(), self.strand.symbol())
    }
}

fn parse_coordinate(value: &str, name: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("{} {:?} is not a non-negative integer", name, value))
}

/// Numeric encoding of a human chromosome name which is used
/// for coloring. 1-22 map onto themselves, X to 23 and Y to 24.
/// A leading "chr" is tolerated.
///
/// Unittest: TRUE
///
/// ```
/// use altmapping::lib::common::locus_ordinal;
/// assert_eq!(locus_ordinal("7"), Some(7));
/// assert_eq!(locus_ordinal("chrX"), Some(23));
/// assert_eq!(locus_ordinal("MT"), None);
/// ```
pub fn locus_ordinal(locus: &str) -> Option<u8> {
    let name = locus.strip_prefix("chr").unwrap_or(locus);
    match name {
        "X" => Some(23),
        "Y" => Some(24),
        _ => match name.parse::<u8>() {
            Ok(x) if (1..=22).contains(&x) => Some(x),
            _ => None,
        },
    }
}


/// A single alternative alignment of a read found by LAST.
/// Records compare only by their score, which is what the
/// ranking needs. Ties are left to a stable sort.
#[derive(Debug,Clone)]
pub struct MappingRecord {
    /// LAST alignment score
    pub score: u32,
    /// where on the genome the piece aligned
    pub reference_region: GenomicRegion,
    /// which piece of the read aligned
    pub read_region: GenomicRegion,
    ordinal: u8,
}

impl MappingRecord {
    /// Builds a record and validates that the reference locus
    /// is a human chromosome we can assign a color to.
    pub fn new(
        score: u32,
        reference_region: GenomicRegion,
        read_region: GenomicRegion
    ) -> Result<MappingRecord, String> {
        let ordinal = reference_region
            .locus_ordinal()
            .ok_or_else(|| format!("reference locus {:?} is not one of 1-22,X,Y", reference_region.locus))?;
        Ok(MappingRecord {
            score,
            reference_region,
            read_region,
            ordinal,
        })
    }

    /// name of the read this mapping belongs to
    pub fn read_name(&self) -> &str {
        &self.read_region.locus
    }

    /// length of the complete read
    pub fn read_length(&self) -> u64 {
        self.read_region.total_length
    }

    pub fn locus_ordinal(&self) -> u8 {
        self.ordinal
    }
}

impl PartialEq for MappingRecord {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for MappingRecord {}

impl PartialOrd for MappingRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MappingRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.cmp(&other.score)
    }
}

impl fmt::Display for MappingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.score, self.read_region, self.reference_region)
    }
}


/// How the top mappings are picked from a read.
/// Both pick the same scores, they differ in which
/// of several equally scored mappings wins at the cut.
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum RankingPolicy {
    /// stable ascending sort, the last N are taken
    AscendingTail,
    /// stable descending sort, the first N are taken
    DescendingHead,
}

impl FromStr for RankingPolicy {
    type Err = AltMapError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" | "ascending-tail" => Ok(RankingPolicy::AscendingTail),
            "descending" | "descending-head" => Ok(RankingPolicy::DescendingHead),
            x => Err(AltMapError::Config(format!("unknown ranking policy {:?}", x))),
        }
    }
}

/// Vertical scale of the plot
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum ScoreScale {
    Linear,
    /// natural logarithm, requires all scores > 0
    Log,
}

impl FromStr for ScoreScale {
    type Err = AltMapError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(ScoreScale::Linear),
            "log" => Ok(ScoreScale::Log),
            x => Err(AltMapError::Config(format!("unknown score scale {:?}", x))),
        }
    }
}

/// The options which drive collection and layout
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct AltPlotConfig {
    /// minimum LAST score, inclusive
    pub quality_threshold: u32,
    /// maximum number of mappings shown per read
    pub top_count: usize,
    pub ranking_policy: RankingPolicy,
    pub score_scale: ScoreScale,
}

impl AltPlotConfig {
    /// The log scale is only defined for positive scores which
    /// is guaranteed by a threshold of at least 1.
    pub fn new(
        quality_threshold: u32,
        top_count: usize,
        ranking_policy: RankingPolicy,
        score_scale: ScoreScale
    ) -> Result<AltPlotConfig, AltMapError> {
        if score_scale == ScoreScale::Log && quality_threshold < 1 {
            return Err(AltMapError::Config(String::from(
                "log scale requires a quality threshold of at least 1",
            )));
        }
        Ok(AltPlotConfig {
            quality_threshold,
            top_count,
            ranking_policy,
            score_scale,
        })
    }
}

impl Default for AltPlotConfig {
    fn default() -> Self {
        AltPlotConfig {
            quality_threshold: 300,
            top_count: 15,
            ranking_policy: RankingPolicy::DescendingHead,
            score_scale: ScoreScale::Log,
        }
    }
}


#[derive(Debug,Clone,Copy)]
pub struct VersionInfo <'a>{
    /// the used program
    pub program  : &'a str,
    /// the version of the program
    pub version  : &'a str,
    /// the author
    pub author : &'a str,
    /// the executed command
    pub command : &'a str,
}


/// Verifies that all mandatory inputs exist before anything is opened.
/// Returns for the first missing one an error naming it.
///
/// Unittest: TRUE
///
pub fn check_input_files(
    bam: &str,
    regions: &str,
    last: &str
) -> Result<(), AltMapError> {
    for &(kind, path) in [("BAM", bam), ("region BED", regions), ("LAST", last)].iter() {
        if !Path::new(path).exists() {
            return Err(AltMapError::MissingInput {
                kind,
                path: path.to_string(),
            });
        }
    }
    Ok(())
}


/// this function takes the layouts of all reads and writes the
/// selected mappings, best first, in a tab-separated format.
/// A header with meta information identifies the run.
/// Reads without any selected mapping are not reported.
/// Positions are 0-based as in the LAST file.
///
/// Unittest: TRUE
///
pub fn write_ranked_tsv<W: Write>(
    output: W,
    layouts: &[ReadLayout],
    infos: &VersionInfo
) -> Result<(), Box<dyn Error>>{
    let now: DateTime<Local> = Local::now();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(output);
    // here we add some empty fields as otherwise the writer realizes that this is wrong
    writer.write_record(["##",infos.program,infos.version,"","","","","","","",""])?;
    writer.write_record(["##","author:",infos.author,"","","","","","","",""])?;
    writer.write_record(["##","date:",&now.to_rfc2822(),"","","","","","","",""])?;
    writer.write_record(["##","command:",infos.command,"","","","","","","",""])?;
    writer.write_record([
        "#read",
        "read_length",
        "rank",
        "score",
        "signed_score",
        "read_start",
        "read_end",
        "strand",
        "ref_locus",
        "ref_start",
        "ref_end",
        ])?;
    for layout in layouts.iter() {
        for (rank, (record, segment)) in layout.selected.iter().zip(layout.segments.iter()).enumerate() {
            writer.write_record(&[
                layout.read_name.to_string(),
                record.read_length().to_string(),
                (rank + 1).to_string(),
                record.score.to_string(),
                format!("{:.3}", segment.signed_score),
                record.read_region.start.to_string(),
                record.read_region.end().to_string(),
                record.read_region.strand.symbol().to_string(),
                record.reference_region.locus.clone(),
                record.reference_region.start.to_string(),
                record.reference_region.end().to_string(),
                ])?;
        }
    };
    writer.flush()?;
    Ok(())
}

/// same as `write_ranked_tsv` but onto stdout
///
/// Unittest: FALSE
///
pub fn write_ranked_tsv_stdout(
    layouts: &[ReadLayout],
    infos: &VersionInfo
) -> Result<(), Box<dyn Error>>{
    info!("writing ranked mappings in tab-separated format to stdout");
    write_ranked_tsv(io::stdout(), layouts, infos)
}
