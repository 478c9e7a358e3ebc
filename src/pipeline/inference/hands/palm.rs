use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::crop::{Letterbox, prepare_letterboxed};
use crate::types::Frame;

pub const PALM_INPUT_SIZE: u32 = 192;
const PALM_KEYPOINTS: usize = 7;
const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const NMS_THRESHOLD: f32 = 0.3;

/// A detected palm in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
}

impl PalmDetector {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: ssd_anchors(PALM_INPUT_SIZE),
        })
    }

    /// Palms scoring at least `min_score`, best first, at most `limit`.
    pub fn detect(
        &mut self,
        frame: &Frame,
        min_score: f32,
        limit: usize,
    ) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_letterboxed(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let feature_dim = *boxes
            .shape()
            .last()
            .ok_or_else(|| anyhow!("palm box output has no dimensions"))?;
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        let candidates = decode_palms(
            &boxes,
            feature_dim,
            &scores,
            &self.anchors,
            &letterbox,
            min_score,
        )?;
        Ok(nms(candidates, NMS_THRESHOLD, limit))
    }
}

/// Anchor centres of the palm detector's SSD head. Layers sharing a stride
/// share one grid, two anchors per layer per cell.
pub fn ssd_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += 2;
            layer += 1;
        }

        let grid = input_size.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

fn decode_palms(
    boxes: &[f32],
    feature_dim: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &Letterbox,
    min_score: f32,
) -> Result<Vec<PalmRegion>> {
    if feature_dim < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }
    let anchor_count = boxes.len() / feature_dim;
    if anchor_count != scores.len() || anchor_count > anchors.len() {
        return Err(anyhow!(
            "palm outputs disagree: {anchor_count} boxes, {} scores, {} anchors",
            scores.len(),
            anchors.len()
        ));
    }

    let input = PALM_INPUT_SIZE as f32;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let max_x = letterbox.orig_w.saturating_sub(1) as f32;
    let max_y = letterbox.orig_h.saturating_sub(1) as f32;
    let to_frame = |ax: f32, ay: f32, dx: f32, dy: f32| {
        (
            (dx / input + ax) * scale - pad_bias_x,
            (dy / input + ay) * scale - pad_bias_y,
        )
    };

    let mut regions = Vec::new();
    for ((features, &raw_score), anchor) in boxes
        .chunks_exact(feature_dim)
        .zip(scores)
        .zip(anchors)
    {
        let score = sigmoid(raw_score);
        if score < min_score {
            continue;
        }

        let (cx, cy) = to_frame(anchor[0], anchor[1], features[0], features[1]);
        let half_w = features[2] / input * scale / 2.0;
        let half_h = features[3] / input * scale / 2.0;
        if half_w <= 0.0 || half_h <= 0.0 {
            continue;
        }
        let bbox = [
            (cx - half_w).clamp(0.0, max_x),
            (cy - half_h).clamp(0.0, max_y),
            (cx + half_w).clamp(0.0, max_x),
            (cy + half_h).clamp(0.0, max_y),
        ];

        let keypoints = features[4..4 + PALM_KEYPOINTS * 2]
            .chunks_exact(2)
            .map(|kp| to_frame(anchor[0], anchor[1], kp[0], kp[1]))
            .collect();

        regions.push(PalmRegion {
            bbox,
            keypoints,
            score,
        });
    }
    Ok(regions)
}

fn nms(mut candidates: Vec<PalmRegion>, threshold: f32, limit: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if keep.len() >= limit {
            break;
        }
        if keep.iter().all(|k| iou(&candidate.bbox, &k.bbox) < threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Square crop around a palm for the landmark model: centre, side length and
/// rotation in frame pixels.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let center = if region.keypoints.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let (sum_x, sum_y) = region
            .keypoints
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        let n = region.keypoints.len() as f32;
        (sum_x / n, sum_y / n)
    };

    let base = (region.bbox[2] - region.bbox[0])
        .abs()
        .max((region.bbox[3] - region.bbox[1]).abs());
    let span = region
        .keypoints
        .iter()
        .fold(None, |acc: Option<[f32; 4]>, &(x, y)| {
            Some(match acc {
                None => [x, x, y, y],
                Some([x0, x1, y0, y1]) => [x0.min(x), x1.max(x), y0.min(y), y1.max(y)],
            })
        })
        .map_or(0.0, |[x0, x1, y0, y1]| (x1 - x0).max(y1 - y0));
    // The palm box leaves the fingers out; grow it to cover the whole hand.
    let side = base.max(span).max(80.0) * 2.4;

    (center, side, estimate_orientation(region))
}

/// Principal axis of the palm keypoints, turned so the fingers point up.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    if region.keypoints.len() < 2 {
        return 0.0;
    }

    let n = region.keypoints.len() as f32;
    let (sx, sy) = region
        .keypoints
        .iter()
        .fold((0.0, 0.0), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    let mean = (sx / n, sy / n);

    let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
    for (x, y) in &region.keypoints {
        let dx = x - mean.0;
        let dy = y - mean.1;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}
