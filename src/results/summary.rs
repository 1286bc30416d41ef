//! Per-image result summaries.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::segmentation::SegmentationResult;

/// Measurements of one labeled region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub label: u32,
    /// Area in pixels
    pub area_px: usize,
    /// Area in physical units (pixel area times scale)
    pub area: f64,
    /// Centroid as `[row, column]` in pixels
    pub centroid: [f64; 2],
}

/// Summary of one segmented image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSummary {
    pub image: String,
    pub width: usize,
    pub height: usize,
    pub scale: [f64; 2],
    pub region_count: usize,
    pub regions: Vec<RegionSummary>,
}

/// Measure every region of a result's mask.
///
/// Labels need not be contiguous; only labels present in the mask are
/// reported, in ascending order.
pub fn summarize(result: &SegmentationResult) -> ImageSummary {
    // label -> (pixel count, row sum, column sum)
    let mut accumulated: BTreeMap<u32, (usize, f64, f64)> = BTreeMap::new();
    for ((r, c), &label) in result.mask.indexed_iter() {
        if label == 0 {
            continue;
        }
        let entry = accumulated.entry(label).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += r as f64;
        entry.2 += c as f64;
    }

    let pixel_area = result.scale[0] * result.scale[1];
    let regions: Vec<RegionSummary> = accumulated
        .into_iter()
        .map(|(label, (count, row_sum, col_sum))| {
            let n = count as f64;
            RegionSummary {
                label,
                area_px: count,
                area: n * pixel_area,
                centroid: [row_sum / n, col_sum / n],
            }
        })
        .collect();

    ImageSummary {
        image: result.name.clone(),
        width: result.mask.ncols(),
        height: result.mask.nrows(),
        scale: result.scale,
        region_count: regions.len(),
        regions,
    }
}
