use itertools::Itertools;
use log::debug;

use crate::lib::common::{*};

/// default half-height of the vertical log axis, ln(22026) = 10
const LOG_AXIS_LIMIT: f64 = 10.0;
/// default half-height of the vertical linear axis
const LINEAR_AXIS_LIMIT: f64 = 10000.0;

/// In which direction a segment reads along the read
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum SegmentDirection {
    Right,
    Left,
}

/// One alternative mapping placed on the plot of its read
#[derive(Debug,Clone,PartialEq)]
pub struct RenderSegment {
    /// x-position on the read, mirrored for reverse alignments
    pub position: u64,
    /// aligned length on the read
    pub width: u64,
    /// y-position, negative for reverse alignments
    pub signed_score: f64,
    /// locus ordinal of the reference, selects the color
    pub color_key: usize,
    /// reference chromosome
    pub label: String,
    pub direction: SegmentDirection,
}

/// Visible area of a read plot
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct AxisBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl AxisBounds {
    /// The x-axis covers the whole read, the y-axis is symmetric
    /// around 0 and at least the default limit of the scale.
    /// Neither range is ever empty.
    pub fn new(
        read_length: u64,
        scale: ScoreScale,
        max_abs_score: f64
    ) -> AxisBounds {
        let default_limit = match scale {
            ScoreScale::Log => LOG_AXIS_LIMIT,
            ScoreScale::Linear => LINEAR_AXIS_LIMIT,
        };
        let limit = default_limit.max(max_abs_score.ceil());
        AxisBounds {
            x_min: 0.0,
            x_max: read_length.max(1) as f64,
            y_min: -limit,
            y_max: limit,
        }
    }
}

/// Everything needed to print and plot the top mappings of a read
#[derive(Debug,Clone)]
pub struct ReadLayout<'a> {
    pub read_name: &'a str,
    /// selected mappings, best first
    pub selected: Vec<&'a MappingRecord>,
    /// one segment per selected mapping, same order
    pub segments: Vec<RenderSegment>,
    pub bounds: AxisBounds,
}

impl<'a> ReadLayout<'a> {
    /// nothing to draw for this read
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}


/// Picks the `top_count` best mappings, best first.
/// Sorting is stable. With `DescendingHead` equally scored mappings
/// stay in arrival order. With `AscendingTail` the tail of the ascending
/// order is reversed, so among equal scores the later arrival comes first
/// and wins at the cut.
///
/// Unittest: TRUE
///
pub fn rank_mappings(
    records: &[MappingRecord],
    top_count: usize,
    policy: RankingPolicy
) -> Vec<&MappingRecord> {
    let effective_count = top_count.min(records.len());
    match policy {
        RankingPolicy::AscendingTail => {
            let ascending: Vec<&MappingRecord> = records.iter().sorted().collect();
            ascending[ascending.len() - effective_count..]
                .iter()
                .rev()
                .copied()
                .collect()
        }
        RankingPolicy::DescendingHead => records
            .iter()
            .sorted_by(|a, b| b.cmp(a))
            .take(effective_count)
            .collect(),
    }
}

/// Vertical coordinate of a mapping: the score or its natural logarithm,
/// negative if the read aligned in reverse.
/// The log scale needs a positive score which the quality threshold guarantees.
///
/// ```
/// use altmapping::lib::common::{GenomicRegion, MappingRecord, ScoreScale};
/// use altmapping::lib::layout::signed_score;
/// let reference = GenomicRegion::from_last_line("s 7 1000 50 + 200000 ACGT").unwrap();
/// let read = GenomicRegion::from_last_line("s readA 10 50 - 5000 ACGT").unwrap();
/// let record = MappingRecord::new(450, reference, read).unwrap();
/// assert_eq!(signed_score(&record, ScoreScale::Linear), -450.0);
/// assert!((signed_score(&record, ScoreScale::Log) + 450f64.ln()).abs() < 1e-12);
/// ```
pub fn signed_score(
    record: &MappingRecord,
    scale: ScoreScale
) -> f64 {
    let magnitude = match scale {
        ScoreScale::Linear => f64::from(record.score),
        ScoreScale::Log => {
            debug_assert!(record.score > 0, "log scale on a score of 0");
            f64::from(record.score).ln()
        }
    };
    if record.read_region.is_reverse() {
        -magnitude
    } else {
        magnitude
    }
}

/// Start of a segment on the read. Reverse alignments are mirrored
/// so that the segment reads from right to left.
pub fn segment_position(
    region: &GenomicRegion
) -> u64 {
    match region.strand {
        StrandDirection::Fwd => region.start,
        StrandDirection::Rev => region.total_length.saturating_sub(region.end()),
    }
}

fn build_segment(
    record: &MappingRecord,
    scale: ScoreScale
) -> RenderSegment {
    RenderSegment {
        position: segment_position(&record.read_region),
        width: record.read_region.length,
        signed_score: signed_score(record, scale),
        color_key: usize::from(record.locus_ordinal()),
        label: record.reference_region.locus.clone(),
        direction: match record.read_region.strand {
            StrandDirection::Fwd => SegmentDirection::Right,
            StrandDirection::Rev => SegmentDirection::Left,
        },
    }
}

/// Turns the mappings of one read into segments for plotting.
/// A read without mappings gives an empty layout with valid bounds.
///
/// Unittest: TRUE
///
pub fn layout_read<'a>(
    read_name: &'a str,
    records: &'a [MappingRecord],
    config: &AltPlotConfig
) -> ReadLayout<'a> {
    let selected = rank_mappings(records, config.top_count, config.ranking_policy);
    // all records stem from the same read, any of them knows its length
    let read_length = records.first().map_or(0, |x| x.read_length());
    let segments: Vec<RenderSegment> = selected
        .iter()
        .map(|x| build_segment(x, config.score_scale))
        .collect();
    let max_abs = segments
        .iter()
        .map(|x| x.signed_score.abs())
        .fold(0.0_f64, f64::max);
    debug!("Layout of {}: {} of {} mappings selected", read_name, segments.len(), records.len());
    ReadLayout {
        read_name,
        selected,
        segments,
        bounds: AxisBounds::new(read_length, config.score_scale, max_abs),
    }
}

/// Lays out every read of the collection in collection order
pub fn layout_collection<'a>(
    collection: &'a ReadMappingCollection,
    config: &AltPlotConfig
) -> Vec<ReadLayout<'a>> {
    collection
        .iter()
        .map(|(name, records)| layout_read(name, records, config))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(score: u32, chrom: &str, start: u64, length: u64, strand: &str) -> MappingRecord {
        let reference = GenomicRegion::from_last_line(&format!("s {} 1000 {} + 200000 ACGT", chrom, length)).unwrap();
        let read = GenomicRegion::from_last_line(&format!("s readA {} {} {} 5000 ACGT", start, length, strand)).unwrap();
        MappingRecord::new(score, reference, read).unwrap()
    }

    fn config(top_count: usize, ranking_policy: RankingPolicy, score_scale: ScoreScale) -> AltPlotConfig {
        AltPlotConfig::new(300, top_count, ranking_policy, score_scale).unwrap()
    }

    fn scores(records: &[&MappingRecord]) -> Vec<u32> {
        records.iter().map(|x| x.score).collect()
    }

    #[test]
    fn empty_read_gives_empty_layout() {
        let records: Vec<MappingRecord> = Vec::new();
        for policy in [RankingPolicy::AscendingTail, RankingPolicy::DescendingHead].iter() {
            let layout = layout_read("readA", &records, &config(15, *policy, ScoreScale::Log));
            assert!(layout.is_empty());
            assert!(layout.selected.is_empty());
            assert!(layout.bounds.x_max > layout.bounds.x_min);
            assert!(layout.bounds.y_max > layout.bounds.y_min);
        }
    }

    #[test]
    fn top_one_is_best_for_both_policies() {
        let records = vec![mapping(300, "1", 0, 50, "+"), mapping(600, "2", 100, 50, "+")];
        for policy in [RankingPolicy::AscendingTail, RankingPolicy::DescendingHead].iter() {
            let layout = layout_read("readA", &records, &config(1, *policy, ScoreScale::Linear));
            assert_eq!(layout.segments.len(), 1);
            assert_eq!(layout.selected[0].score, 600);
            assert_eq!(layout.segments[0].label, "2");
        }
    }

    #[test]
    fn policies_select_same_scores() {
        let records: Vec<MappingRecord> = [450, 300, 900, 450, 1200, 300, 700]
            .iter()
            .enumerate()
            .map(|(i, s)| mapping(*s, "3", i as u64 * 10, 10, "+"))
            .collect();
        for n in 0..=records.len() {
            let mut tail = scores(&rank_mappings(&records, n, RankingPolicy::AscendingTail));
            let mut head = scores(&rank_mappings(&records, n, RankingPolicy::DescendingHead));
            assert_eq!(tail.len(), n);
            assert!(head.windows(2).all(|w| w[0] >= w[1]));
            tail.sort_unstable();
            head.sort_unstable();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn ties_follow_documented_order() {
        let records = vec![
            mapping(500, "1", 0, 10, "+"),
            mapping(500, "2", 10, 10, "+"),
            mapping(400, "3", 20, 10, "+"),
        ];
        let head = rank_mappings(&records, 1, RankingPolicy::DescendingHead);
        assert_eq!(head[0].reference_region.locus, "1");
        let tail = rank_mappings(&records, 1, RankingPolicy::AscendingTail);
        assert_eq!(tail[0].reference_region.locus, "2");
    }

    #[test]
    fn top_count_larger_than_records() {
        let records = vec![mapping(350, "X", 0, 50, "+")];
        let layout = layout_read("readA", &records, &config(20, RankingPolicy::DescendingHead, ScoreScale::Log));
        assert_eq!(layout.segments.len(), 1);
        assert_eq!(layout.segments[0].color_key, 23);
    }

    #[test]
    fn reverse_segments_are_mirrored() {
        let records = vec![
            mapping(400, "Y", 10, 50, "-"),
            mapping(500, "5", 0, 5000, "-"),
            mapping(600, "5", 4900, 100, "-"),
        ];
        let layout = layout_read("readA", &records, &config(3, RankingPolicy::DescendingHead, ScoreScale::Linear));
        for (record, segment) in layout.selected.iter().zip(layout.segments.iter()) {
            let region = &record.read_region;
            assert_eq!(segment.position, region.total_length - region.start - region.length);
            assert!(segment.position + segment.width <= region.total_length);
            assert_eq!(segment.direction, SegmentDirection::Left);
            assert!(segment.signed_score < 0.0);
        }
        assert_eq!(layout.segments[2].position, 4940);
    }

    #[test]
    fn forward_segment_geometry() {
        let records = vec![mapping(450, "7", 10, 50, "+")];
        let layout = layout_read("readA", &records, &config(15, RankingPolicy::AscendingTail, ScoreScale::Log));
        let segment = &layout.segments[0];
        assert_eq!(segment.position, 10);
        assert_eq!(segment.width, 50);
        assert_eq!(segment.color_key, 7);
        assert_eq!(segment.direction, SegmentDirection::Right);
        assert!((segment.signed_score - 450f64.ln()).abs() < 1e-12);
        assert_eq!(layout.bounds.x_max, 5000.0);
        assert_eq!(layout.bounds.y_max, 10.0);
        assert_eq!(layout.bounds.y_min, -10.0);
    }

    #[test]
    fn linear_bounds_grow_with_scores() {
        let records = vec![mapping(25000, "1", 0, 50, "-")];
        let layout = layout_read("readA", &records, &config(15, RankingPolicy::DescendingHead, ScoreScale::Linear));
        assert_eq!(layout.bounds.y_min, -25000.0);
        assert_eq!(layout.bounds.y_max, 25000.0);
    }

    #[test]
    fn same_locus_same_color_across_reads() {
        let a = vec![mapping(450, "12", 0, 50, "+")];
        let b = vec![mapping(900, "12", 300, 80, "-")];
        let cfg = config(15, RankingPolicy::DescendingHead, ScoreScale::Log);
        let la = layout_read("readA", &a, &cfg);
        let lb = layout_read("readB", &b, &cfg);
        assert_eq!(la.segments[0].color_key, lb.segments[0].color_key);
    }

    #[test]
    fn collection_keeps_empty_reads() {
        let mut collection = ReadMappingCollection::new();
        collection.insert(String::from("readA"), vec![mapping(450, "7", 10, 50, "+")]);
        collection.insert(String::from("readB"), Vec::new());
        let layouts = layout_collection(&collection, &AltPlotConfig::default());
        assert_eq!(layouts.len(), 2);
        assert!(!layouts[0].is_empty());
        assert!(layouts[1].is_empty());
        assert_eq!(layouts[1].read_name, "readB");
    }
}
