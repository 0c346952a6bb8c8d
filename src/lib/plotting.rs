use std::error::Error;
use std::path::{Path, PathBuf};
use plotters::prelude::*;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use log::debug;

use crate::lib::common::{*};
use crate::lib::layout::{*};

const PLOT_SIZE: (u32, u32) = (1000, 600);
/// half-height of a bar as fraction of the y-range
const BAR_FRACTION: f64 = 0.005;
/// length of the arrow head as fraction of the x-range
const HEAD_FRACTION: f64 = 0.01;

/// One categorical color per chromosome ordinal (1-22, X=23, Y=24).
/// Index 0 is never assigned by a valid locus.
pub const LOCUS_PALETTE: [RGBColor; 25] = [
    RGBColor(128, 128, 128),
    RGBColor(228, 26, 28),
    RGBColor(55, 126, 184),
    RGBColor(77, 175, 74),
    RGBColor(152, 78, 163),
    RGBColor(255, 127, 0),
    RGBColor(205, 205, 51),
    RGBColor(166, 86, 40),
    RGBColor(247, 129, 191),
    RGBColor(27, 158, 119),
    RGBColor(217, 95, 2),
    RGBColor(117, 112, 179),
    RGBColor(231, 41, 138),
    RGBColor(102, 166, 30),
    RGBColor(230, 171, 2),
    RGBColor(31, 120, 180),
    RGBColor(51, 160, 44),
    RGBColor(251, 154, 153),
    RGBColor(178, 223, 138),
    RGBColor(253, 191, 111),
    RGBColor(202, 178, 214),
    RGBColor(106, 61, 154),
    RGBColor(177, 89, 40),
    RGBColor(0, 0, 0),
    RGBColor(0, 139, 139),
];

/// color of a chromosome ordinal, the same in every plot
pub fn locus_color(color_key: usize) -> RGBColor {
    LOCUS_PALETTE[color_key % LOCUS_PALETTE.len()]
}

/// The plot is named after the read. Characters which would
/// create directories or break shells are replaced.
///
/// ```
/// use altmapping::lib::plotting::plot_file_name;
/// assert_eq!(plot_file_name("run1/ch12/read_2d"), "run1_ch12_read_2d.svg");
/// ```
pub fn plot_file_name(read_name: &str) -> String {
    let stem: String = read_name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}.svg", stem)
}

fn draw_layout(
    layout: &ReadLayout,
    scale: ScoreScale,
    path: &Path
) -> Result<(), Box<dyn Error>> {
    let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let bounds = layout.bounds;

    let mut chart = ChartBuilder::on(&root)
        .caption(layout.read_name, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(bounds.x_min..bounds.x_max, bounds.y_min..bounds.y_max)?;

    chart
        .configure_mesh()
        .x_desc("Location within read")
        .y_desc(match scale {
            ScoreScale::Log => "Log(score)",
            ScoreScale::Linear => "Quality score",
        })
        .draw()?;

    let half = (bounds.y_max - bounds.y_min) * BAR_FRACTION;
    let head_max = (bounds.x_max - bounds.x_min) * HEAD_FRACTION;
    let mut in_legend: FxHashSet<String> = FxHashSet::default();

    for segment in layout.segments.iter() {
        let color = locus_color(segment.color_key);
        let x0 = segment.position as f64;
        let x1 = (segment.position + segment.width) as f64;
        let y = segment.signed_score;
        let head = (x1 - x0).min(head_max);
        let (body, tip) = match segment.direction {
            SegmentDirection::Right => ((x0, x1 - head), vec![(x1 - head, y + half), (x1, y), (x1 - head, y - half)]),
            SegmentDirection::Left => ((x0 + head, x1), vec![(x0 + head, y + half), (x0, y), (x0 + head, y - half)]),
        };

        let series = chart.draw_series(std::iter::once(Rectangle::new(
            [(body.0, y - half), (body.1, y + half)],
            color.mix(0.7).filled(),
        )))?;
        if in_legend.insert(segment.label.clone()) {
            series
                .label(segment.label.as_str())
                .legend(move |(lx, ly)| Rectangle::new([(lx, ly - 5), (lx + 10, ly + 5)], color.filled()));
        }
        chart.draw_series(std::iter::once(Polygon::new(tip, color.mix(0.7).filled())))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(body.0, y - half), (body.1, y + half)],
            BLACK.stroke_width(1),
        )))?;
    }

    if !in_legend.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(("sans-serif", 12))
            .draw()?;
    }
    root.present()?;
    Ok(())
}

/// Draws the layout of a single read as SVG into `out_dir`
/// and returns the path of the written file.
///
/// Unittest: TRUE
///
pub fn render_read_layout(
    layout: &ReadLayout,
    scale: ScoreScale,
    out_dir: &Path
) -> Result<PathBuf, AltMapError> {
    let path = out_dir.join(plot_file_name(layout.read_name));
    draw_layout(layout, scale, &path)
        .map_err(|e| AltMapError::Render(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

/// Renders all non-empty layouts, reads are independent and are
/// drawn in parallel on `threads` threads.
///
/// Unittest: TRUE
///
pub fn render_layouts(
    layouts: &[ReadLayout],
    scale: ScoreScale,
    out_dir: &Path,
    threads: usize
) -> Result<Vec<PathBuf>, AltMapError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| AltMapError::Config(e.to_string()))?;
    pool.install(|| {
        layouts
            .par_iter()
            .filter(|layout| {
                if layout.is_empty() {
                    debug!("No alternative mappings for {}, nothing to plot", layout.read_name);
                }
                !layout.is_empty()
            })
            .map(|layout| render_read_layout(layout, scale, out_dir))
            .collect()
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn mapping(score: u32, chrom: &str, start: u64, strand: &str) -> MappingRecord {
        let reference = GenomicRegion::from_last_line(&format!("s {} 1000 50 + 200000 ACGT", chrom)).unwrap();
        let read = GenomicRegion::from_last_line(&format!("s run/read_2d {} 50 {} 5000 ACGT", start, strand)).unwrap();
        MappingRecord::new(score, reference, read).unwrap()
    }

    #[test]
    fn palette_is_pure_function_of_ordinal() {
        let (a, b) = (locus_color(7), locus_color(7));
        assert_eq!((a.0, a.1, a.2), (b.0, b.1, b.2));
        let mut distinct: Vec<(u8, u8, u8)> = (1..=24).map(|x| {
            let c = locus_color(x);
            (c.0, c.1, c.2)
        }).collect();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 24);
    }

    #[test]
    fn renders_svg_for_read() {
        let dir = tempdir().unwrap();
        let records = vec![mapping(450, "7", 10, "+"), mapping(900, "X", 200, "-"), mapping(700, "7", 3000, "+")];
        let config = AltPlotConfig::default();
        let layout = layout_read("run/read_2d", &records, &config);
        let path = render_read_layout(&layout, config.score_scale, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "run_read_2d.svg");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"));
    }

    #[test]
    fn empty_layouts_are_not_rendered() {
        let dir = tempdir().unwrap();
        let records = vec![mapping(450, "7", 10, "+")];
        let none: Vec<MappingRecord> = Vec::new();
        let config = AltPlotConfig::default();
        let layouts = vec![layout_read("readA", &records, &config), layout_read("readB", &none, &config)];
        let written = render_layouts(&layouts, config.score_scale, dir.path(), 2).unwrap();
        assert_eq!(written.len(), 1);
        assert!(dir.path().join("readA.svg").exists());
        assert!(!dir.path().join("readB.svg").exists());
    }
}
