//! Built-in reference segmenter.
//!
//! Smooths the image, splits foreground from background with Otsu's
//! threshold and labels 4-connected foreground regions. It stands in for a
//! pretrained model when none is plugged in, and gives the rest of the
//! pipeline something deterministic to run against.

use std::collections::VecDeque;
use std::f32::consts::PI;

use ndarray::{Array2, ArrayView2};

use super::model::{InferenceError, LabelMask, SegmentationModel};
use crate::config::ModelConfig;

/// Number of histogram bins used for Otsu's method.
const BINS: usize = 256;

/// Regions smaller than this fraction of a disc with the configured diameter are dropped.
const MIN_AREA_FRACTION: f32 = 0.15;

/// Threshold and connected-components segmenter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdSegmenter;

impl ThresholdSegmenter {
    /// Smallest region area kept for the given object diameter.
    pub fn min_area(diameter: f32) -> usize {
        if diameter > 0.0 {
            let radius = diameter / 2.0;
            ((PI * radius * radius * MIN_AREA_FRACTION).floor() as usize).max(1)
        } else {
            1
        }
    }
}

impl SegmentationModel for ThresholdSegmenter {
    fn name(&self) -> &str {
        "threshold"
    }

    fn predict(
        &self,
        image: ArrayView2<'_, f32>,
        config: &ModelConfig,
    ) -> Result<LabelMask, InferenceError> {
        if image.is_empty() {
            return Err(InferenceError::EmptyImage);
        }
        if config.gpu {
            return Err(InferenceError::GpuUnavailable("threshold"));
        }
        if config.debug {
            log::debug!(
                "Threshold segmenter standing in for model '{}' on {}x{} image",
                config.model_type,
                image.ncols(),
                image.nrows()
            );
        }

        let radius = config.smoothing_radius.max(0.0).round() as usize;
        let smoothed = if radius > 0 {
            box_blur(image, radius)
        } else {
            image.to_owned()
        };

        let Some(threshold) = otsu_threshold(smoothed.view()) else {
            log::debug!("Image is flat, no foreground");
            return Ok(LabelMask::zeros(image.dim()));
        };

        let foreground = smoothed.mapv(|v| v > threshold);
        let (labels, count) = label_components(&foreground);

        Ok(filter_regions(
            labels,
            count,
            Self::min_area(config.diameter),
            config.exclude_on_edges,
        ))
    }
}

/// Mean filter over a `(2r + 1)` square window, clipped at the borders.
fn box_blur(image: ArrayView2<'_, f32>, radius: usize) -> Array2<f32> {
    let (height, width) = image.dim();
    // Any window wider than the image already covers all of it
    let radius = radius.min(height.max(width));
    let mut integral = Array2::<f64>::zeros((height + 1, width + 1));
    for r in 0..height {
        let mut row_sum = 0.0;
        for c in 0..width {
            row_sum += f64::from(image[[r, c]]);
            integral[[r + 1, c + 1]] = integral[[r, c + 1]] + row_sum;
        }
    }

    Array2::from_shape_fn((height, width), |(r, c)| {
        let r0 = r.saturating_sub(radius);
        let c0 = c.saturating_sub(radius);
        let r1 = (r + radius + 1).min(height);
        let c1 = (c + radius + 1).min(width);
        let sum = integral[[r1, c1]] - integral[[r0, c1]] - integral[[r1, c0]] + integral[[r0, c0]];
        (sum / ((r1 - r0) * (c1 - c0)) as f64) as f32
    })
}

/// Otsu's threshold, or `None` when the image has no contrast.
fn otsu_threshold(image: ArrayView2<'_, f32>) -> Option<f32> {
    let (min, max) = image
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if span.is_nan() || span <= f32::EPSILON {
        return None;
    }

    let mut histogram = [0u64; BINS];
    for &v in image {
        let bin = (((v - min) / span) * (BINS - 1) as f32).round() as usize;
        histogram[bin.min(BINS - 1)] += 1;
    }

    let total = image.len() as f64;
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best_variance = -1.0;
    let mut best_bin = 0;

    for (i, &n) in histogram.iter().enumerate() {
        weight_bg += n as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += i as f64 * n as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (weighted_total - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_bin = i;
        }
    }

    Some(min + span * best_bin as f32 / (BINS - 1) as f32)
}

/// Label 4-connected foreground regions. Returns the labels and region count.
fn label_components(foreground: &Array2<bool>) -> (Array2<u32>, u32) {
    let (height, width) = foreground.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut next_label = 0u32;
    let mut queue = VecDeque::new();

    for ((r, c), &is_foreground) in foreground.indexed_iter() {
        if !is_foreground || labels[[r, c]] != 0 {
            continue;
        }
        next_label += 1;
        labels[[r, c]] = next_label;
        queue.push_back((r, c));

        while let Some((y, x)) = queue.pop_front() {
            let neighbours = [
                (y.wrapping_sub(1), x),
                (y + 1, x),
                (y, x.wrapping_sub(1)),
                (y, x + 1),
            ];
            for (ny, nx) in neighbours {
                if ny < height && nx < width && foreground[[ny, nx]] && labels[[ny, nx]] == 0 {
                    labels[[ny, nx]] = next_label;
                    queue.push_back((ny, nx));
                }
            }
        }
    }

    (labels, next_label)
}

/// Drop small and (optionally) border-touching regions, then renumber 1..=n.
fn filter_regions(
    mut labels: Array2<u32>,
    count: u32,
    min_area: usize,
    exclude_on_edges: bool,
) -> Array2<u32> {
    let (height, width) = labels.dim();
    let mut areas = vec![0usize; count as usize + 1];
    let mut on_edge = vec![false; count as usize + 1];

    for ((r, c), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        areas[label as usize] += 1;
        if r == 0 || c == 0 || r + 1 == height || c + 1 == width {
            on_edge[label as usize] = true;
        }
    }

    let mut remap = vec![0u32; count as usize + 1];
    let mut next = 0u32;
    for label in 1..=count as usize {
        let keep = areas[label] >= min_area && !(exclude_on_edges && on_edge[label]);
        if keep {
            next += 1;
            remap[label] = next;
        }
    }

    log::trace!("Kept {} of {} regions", next, count);
    labels.mapv_inplace(|label| remap[label as usize]);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::region_count;

    /// 12x12 image with a 3x3 blob in the middle and a 2x2 blob in the corner.
    fn two_blobs() -> Array2<f32> {
        let mut image = Array2::<f32>::zeros((12, 12));
        for r in 4..7 {
            for c in 4..7 {
                image[[r, c]] = 1.0;
            }
        }
        for r in 0..2 {
            for c in 0..2 {
                image[[r, c]] = 0.9;
            }
        }
        image
    }

    #[test]
    fn test_labels_separate_blobs() {
        let mask = ThresholdSegmenter
            .predict(two_blobs().view(), &ModelConfig::default())
            .unwrap();

        assert_eq!(mask.dim(), (12, 12));
        assert_eq!(region_count(&mask), 2);
        assert_ne!(mask[[0, 0]], mask[[5, 5]]);
        assert_eq!(mask[[11, 11]], 0);
    }

    #[test]
    fn test_exclude_on_edges_drops_corner_blob() {
        let config = ModelConfig {
            exclude_on_edges: true,
            ..ModelConfig::default()
        };

        let mask = ThresholdSegmenter.predict(two_blobs().view(), &config).unwrap();

        assert_eq!(region_count(&mask), 1);
        assert_eq!(mask[[0, 0]], 0);
        assert_eq!(mask[[5, 5]], 1);
    }

    #[test]
    fn test_diameter_filters_small_regions() {
        // min area for diameter 8 is floor(pi * 16 * 0.15) = 7: the 2x2 blob goes
        let config = ModelConfig {
            diameter: 8.0,
            ..ModelConfig::default()
        };
        assert_eq!(ThresholdSegmenter::min_area(8.0), 7);

        let mask = ThresholdSegmenter.predict(two_blobs().view(), &config).unwrap();

        assert_eq!(region_count(&mask), 1);
        assert_eq!(mask[[5, 5]], 1);
    }

    #[test]
    fn test_flat_image_has_no_regions() {
        let image = Array2::<f32>::from_elem((4, 4), 0.3);
        let mask = ThresholdSegmenter
            .predict(image.view(), &ModelConfig::default())
            .unwrap();
        assert_eq!(region_count(&mask), 0);
    }

    #[test]
    fn test_empty_image_is_an_error() {
        let image = Array2::<f32>::zeros((0, 5));
        let err = ThresholdSegmenter
            .predict(image.view(), &ModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::EmptyImage));
    }

    #[test]
    fn test_gpu_request_is_rejected() {
        let config = ModelConfig {
            gpu: true,
            ..ModelConfig::default()
        };
        let err = ThresholdSegmenter
            .predict(two_blobs().view(), &config)
            .unwrap_err();
        assert!(matches!(err, InferenceError::GpuUnavailable(_)));
    }

    #[test]
    fn test_box_blur_preserves_constant_image() {
        let image = Array2::<f32>::from_elem((5, 6), 0.25);
        let blurred = box_blur(image.view(), 2);
        assert!(blurred.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_huge_smoothing_radius_averages_whole_image() {
        let image = two_blobs();
        let mean = image.sum() / image.len() as f32;

        let blurred = box_blur(image.view(), usize::MAX);
        assert!(blurred.iter().all(|&v| (v - mean).abs() < 1e-5));

        let config = ModelConfig {
            smoothing_radius: 1e20,
            ..ModelConfig::default()
        };
        let mask = ThresholdSegmenter.predict(image.view(), &config).unwrap();
        assert_eq!(mask.dim(), (12, 12));
        assert_eq!(region_count(&mask), 0);
    }

    #[test]
    fn test_smoothing_merges_touching_diagonal_pixels() {
        // Two diagonal pixels are separate 4-connected regions until smoothed
        let mut image = Array2::<f32>::zeros((9, 9));
        image[[4, 4]] = 1.0;
        image[[5, 5]] = 1.0;

        let sharp = ThresholdSegmenter
            .predict(image.view(), &ModelConfig::default())
            .unwrap();
        assert_eq!(region_count(&sharp), 2);

        let config = ModelConfig {
            smoothing_radius: 1.0,
            ..ModelConfig::default()
        };
        let smooth = ThresholdSegmenter.predict(image.view(), &config).unwrap();
        assert_eq!(region_count(&smooth), 1);
    }
}
