use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use indexmap::IndexSet;
use regex::Regex;
use log::{debug, warn};

use crate::lib::common::{*};

/// Lines shorter than this cannot start an alignment block
const MIN_BLOCK_LINE: usize = 5;

/// Reads a LAST alignment file (MAF flavour) block by block.
/// A block looks like this:
///
/// ```text
/// a score=450 EG2=1.2e-08
/// s 7     1000 50 + 200000 ACGT...
/// s readA 10   50 + 5000   ACGT...
///
/// ```
///
/// The first `key=value` pair of the score line is taken as score,
/// followed by the reference line, the read line and a separator.
/// Comment lines starting with "#" are ignored wherever they appear.
///
/// Malformed blocks are reported as `AltMapError::Format` and the
/// reader continues with the next block, I/O errors end the iteration.
pub struct LastReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
    score_regex: Regex,
    done: bool,
}

impl LastReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AltMapError> {
        let input = File::open(path)?;
        Ok(LastReader::new(BufReader::new(input)))
    }
}

impl<R: BufRead> LastReader<R> {
    pub fn new(reader: R) -> Self {
        LastReader {
            reader,
            buf: String::new(),
            line_no: 0,
            // the pattern is a constant and known to compile
            score_regex: Regex::new(r"([^\s=]+)=(\S+)").unwrap(),
            done: false,
        }
    }

    /// next line without its terminator, None at the end of the stream
    fn next_line(&mut self) -> Result<Option<String>, AltMapError> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.buf.trim_end_matches(&['\n', '\r'][..]).to_string()))
    }

    fn parse_score(&self, line: &str, line_no: usize) -> Result<u32, AltMapError> {
        let caps = self.score_regex.captures(line).ok_or_else(|| AltMapError::Format {
            line: line_no,
            message: format!("no key=value pair in score line {:?}", line),
        })?;
        caps[2].parse::<u32>().map_err(|_| AltMapError::Format {
            line: line_no,
            message: format!("score {:?} is not an integer", &caps[2]),
        })
    }

    fn decode_block(
        &self,
        score_line: &str,
        start: usize,
        ref_line: &str,
        read_line: &str
    ) -> Result<MappingRecord, AltMapError> {
        let score = self.parse_score(score_line, start)?;
        let reference = GenomicRegion::from_last_line(ref_line)
            .map_err(|message| AltMapError::Format { line: start + 1, message })?;
        let read = GenomicRegion::from_last_line(read_line)
            .map_err(|message| AltMapError::Format { line: start + 2, message })?;
        MappingRecord::new(score, reference, read)
            .map_err(|message| AltMapError::Format { line: start + 1, message })
    }
}

impl<R: BufRead> Iterator for LastReader<R> {
    type Item = Result<MappingRecord, AltMapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let score_line = loop {
            match self.next_line() {
                Ok(Some(line)) => {
                    if line.starts_with('#') || line.len() < MIN_BLOCK_LINE {
                        continue;
                    }
                    break line;
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        };
        let start = self.line_no;

        // reference, read and separator are taken as they come
        let mut body: Vec<String> = Vec::with_capacity(3);
        while body.len() < 3 {
            match self.next_line() {
                Ok(Some(line)) => body.push(line),
                Ok(None) => {
                    self.done = true;
                    return Some(Err(AltMapError::Format {
                        line: start,
                        message: format!("truncated block, stream ended after {} of 3 lines", body.len()),
                    }));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if !body[2].trim().is_empty() {
            debug!("Block at line {} is not followed by an empty line: {:?}", start, &body[2]);
        }
        Some(self.decode_block(&score_line, start, &body[0], &body[1]))
    }
}


/// Some book-keeping of what happened while collecting
#[derive(Debug,Default,Clone,Copy,PartialEq,Eq)]
pub struct CollectStats {
    /// well formed blocks
    pub parsed: usize,
    /// blocks attached to a read
    pub kept: usize,
    /// unknown read or below threshold
    pub discarded: usize,
    /// dropped because of format errors
    pub malformed: usize,
}

/// This takes the stream of LAST records and keeps only those which belong
/// to one of our candidate reads and have a score of at least `quality_threshold`.
/// Each candidate read becomes a key of the returned collection, even without
/// any retained mapping. Records are kept in the order they arrive.
/// Format errors are logged and skipped, any other error ends the collection.
///
/// Unittest: TRUE
///
/// ```
/// use altmapping::lib::last_based::{LastReader, collect_alt_mappings};
/// use indexmap::IndexSet;
/// let last = "a score=450\ns 7 1000 50 + 200000 ACGT\ns readA 10 50 + 5000 ACGT\n\n";
/// let mut candidates = IndexSet::new();
/// candidates.insert(String::from("readA"));
/// let (collection, stats) = collect_alt_mappings(LastReader::new(last.as_bytes()), &candidates, 300).unwrap();
/// assert_eq!(collection["readA"].len(), 1);
/// assert_eq!(stats.kept, 1);
/// ```
pub fn collect_alt_mappings<I>(
    records: I,
    candidates: &IndexSet<String>,
    quality_threshold: u32
) -> Result<(ReadMappingCollection, CollectStats), AltMapError>
where
    I: IntoIterator<Item = Result<MappingRecord, AltMapError>>,
{
    let mut collection: ReadMappingCollection = candidates
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect();
    let mut stats = CollectStats::default();

    for entry in records {
        let record = match entry {
            Ok(x) => x,
            Err(e) if e.is_format() => {
                warn!("{}, block dropped", e);
                stats.malformed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        stats.parsed += 1;
        if record.score < quality_threshold {
            stats.discarded += 1;
            continue;
        }
        match collection.get_mut(record.read_name()) {
            Some(mappings) => {
                debug!("Keeping mapping {}", &record);
                mappings.push(record);
                stats.kept += 1;
            }
            None => stats.discarded += 1,
        }
    }
    Ok((collection, stats))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BLOCK_A: &str = "a_score=450\n\
        s 7 1000 50 + 200000 ACGTACGT\n\
        s readA 10 50 + 5000 ACGTACGT\n\
        \n";

    fn candidates(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn parse_single_block_with_header() {
        let input = format!("# LAST version 1060\n{}", BLOCK_A);
        let records: Vec<Result<MappingRecord, AltMapError>> = LastReader::new(input.as_bytes()).collect();
        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.score, 450);
        assert_eq!(record.reference_region.locus, "7");
        assert_eq!(record.locus_ordinal(), 7);
        assert_eq!(record.read_region.locus, "readA");
        assert_eq!(record.read_region.start, 10);
        assert_eq!(record.read_region.length, 50);
        assert_eq!(record.read_region.total_length, 5000);
        assert_eq!(record.reference_region.total_length, 200000);
    }

    #[test]
    fn parse_maf_score_line() {
        let input = "#\n# header\na score=612 EG2=1.1e-09 E=3.2e-19\n\
            s chrX 500 40 + 156040895 ACGT\n\
            s readB 0 40 - 900 ACGT\n\n";
        let records: Vec<MappingRecord> = LastReader::new(input.as_bytes()).map(|x| x.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 612);
        assert_eq!(records[0].locus_ordinal(), 23);
        assert!(records[0].read_region.is_reverse());
    }

    #[test]
    fn interspersed_comments_are_skipped() {
        let input = format!("# header\n{}# batch 2\n{}", BLOCK_A, BLOCK_A.replace("450", "500"));
        let scores: Vec<u32> = LastReader::new(input.as_bytes()).map(|x| x.unwrap().score).collect();
        assert_eq!(scores, vec![450, 500]);
    }

    #[test]
    fn bad_score_is_dropped_and_parsing_continues() {
        let input = format!("{}{}", BLOCK_A.replace("450", "many"), BLOCK_A);
        let records: Vec<Result<MappingRecord, AltMapError>> = LastReader::new(input.as_bytes()).collect();
        assert_eq!(records.len(), 2);
        match &records[0] {
            Err(AltMapError::Format { line, .. }) => assert_eq!(*line, 1),
            x => panic!("expected format error, got {:?}", x),
        }
        assert_eq!(records[1].as_ref().unwrap().score, 450);
    }

    #[test]
    fn wrong_field_count_is_dropped() {
        let broken = "a score=300\ns 7 1000 50 + 200000\ns readA 10 50 + 5000 ACGT\n\n";
        let input = format!("{}{}", broken, BLOCK_A);
        let records: Vec<Result<MappingRecord, AltMapError>> = LastReader::new(input.as_bytes()).collect();
        assert_eq!(records.len(), 2);
        match &records[0] {
            Err(AltMapError::Format { line, .. }) => assert_eq!(*line, 2),
            x => panic!("expected format error, got {:?}", x),
        }
        assert!(records[1].is_ok());
    }

    #[test]
    fn truncated_trailing_block() {
        let input = format!("{}a score=700\ns 7 1000 50 + 200000 ACGT\n", BLOCK_A);
        let records: Vec<Result<MappingRecord, AltMapError>> = LastReader::new(input.as_bytes()).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(records[1].as_ref().unwrap_err().is_format());
    }

    #[test]
    fn short_lines_do_not_start_blocks() {
        let input = format!("\n \nab\n{}", BLOCK_A);
        let records: Vec<MappingRecord> = LastReader::new(input.as_bytes()).map(|x| x.unwrap()).collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn from_path_reads_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(BLOCK_A.as_bytes()).unwrap();
        tmp.flush().unwrap();
        let reader = LastReader::from_path(tmp.path()).unwrap();
        assert_eq!(reader.count(), 1);
    }

    #[test]
    fn collect_respects_threshold() {
        let (kept, stats) = collect_alt_mappings(LastReader::new(BLOCK_A.as_bytes()), &candidates(&["readA"]), 300).unwrap();
        assert_eq!(kept["readA"].len(), 1);
        assert_eq!(stats, CollectStats { parsed: 1, kept: 1, discarded: 0, malformed: 0 });

        let (dropped, stats) = collect_alt_mappings(LastReader::new(BLOCK_A.as_bytes()), &candidates(&["readA"]), 500).unwrap();
        assert!(dropped["readA"].is_empty());
        assert_eq!(stats.discarded, 1);

        // inclusive
        let (edge, _) = collect_alt_mappings(LastReader::new(BLOCK_A.as_bytes()), &candidates(&["readA"]), 450).unwrap();
        assert_eq!(edge["readA"].len(), 1);
    }

    #[test]
    fn collect_ignores_unknown_reads() {
        let (collection, stats) = collect_alt_mappings(
            LastReader::new(BLOCK_A.as_bytes()),
            &candidates(&["readB", "readC"]),
            300
        ).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.values().all(|x| x.is_empty()));
        assert!(!collection.contains_key("readA"));
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn collect_keeps_arrival_order() {
        let input = format!(
            "{}{}{}",
            BLOCK_A.replace("450", "600"),
            BLOCK_A.replace("450", "310"),
            BLOCK_A
        );
        let (collection, _) = collect_alt_mappings(LastReader::new(input.as_bytes()), &candidates(&["readA"]), 300).unwrap();
        let scores: Vec<u32> = collection["readA"].iter().map(|x| x.score).collect();
        assert_eq!(scores, vec![600, 310, 450]);
    }

    #[test]
    fn collect_counts_malformed() {
        let input = format!("{}{}", BLOCK_A.replace("s 7 ", "s MT "), BLOCK_A);
        let (collection, stats) = collect_alt_mappings(LastReader::new(input.as_bytes()), &candidates(&["readA"]), 300).unwrap();
        assert_eq!(collection["readA"].len(), 1);
        assert_eq!(stats.malformed, 1);
    }
}
