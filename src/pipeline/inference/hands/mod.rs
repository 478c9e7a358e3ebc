//! Live hand tracking: palm detection, then a 21-point landmark model on a
//! rotated crop around each palm.

mod crop;
mod palm;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

pub use crop::CropTransform;
use crop::prepare_rotated_crop;
use palm::{PalmDetector, PalmRegion, crop_from_palm};

use crate::pipeline::skeleton::HAND_LANDMARK_COUNT;
use crate::types::{Frame, Landmark, LandmarkSet};

pub const HAND_INPUT_SIZE: u32 = 224;
pub const MAX_HANDS: usize = 2;

/// One hand as the landmark model saw it.
#[derive(Clone, Debug)]
pub struct HandposeOutput {
    /// Crop-space points: model input pixels, plus depth in the same unit.
    pub raw_landmarks: Vec<[f32; 3]>,
    pub transform: CropTransform,
    /// Hand presence times palm score.
    pub confidence: f32,
    /// Above 0.5 the model reads a right hand, assuming a mirrored image.
    pub handedness: f32,
}

impl HandposeOutput {
    /// Normalized landmarks on the source frame. Depth is scaled like `x`, so
    /// it stays comparable to the frame width.
    pub fn to_landmark_set(&self) -> LandmarkSet {
        let t = &self.transform;
        let z_scale = t.pixel_scale() / t.orig_w.max(1) as f32;
        LandmarkSet::from_points(self.raw_landmarks.iter().map(|&[x, y, z]| {
            let (px, py) = t.project(x, y);
            Landmark::new(
                px / t.orig_w.max(1) as f32,
                py / t.orig_h.max(1) as f32,
                z * z_scale,
            )
        }))
    }

    /// Whether this is the subject's right hand. The model assumes a mirrored
    /// input, so an unmirrored frame swaps the label.
    pub fn is_right(&self, mirrored: bool) -> bool {
        (self.handedness > 0.5) == mirrored
    }
}

/// Source of hand landmarks for one frame.
pub trait HandposeEngine: Send + 'static {
    fn detect(&mut self, frame: &Frame, min_detection: f32) -> Result<Vec<HandposeOutput>>;
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < HAND_LANDMARK_COUNT * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            HAND_LANDMARK_COUNT * 3
        ));
    }
    Ok(flat
        .chunks_exact(3)
        .take(HAND_LANDMARK_COUNT)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

/// Splits tracked hands into (left, right), strongest first per side. Hands
/// below `min_tracking` are dropped.
pub fn assign_hands(
    mut hands: Vec<HandposeOutput>,
    mirrored: bool,
    min_tracking: f32,
) -> (Option<LandmarkSet>, Option<LandmarkSet>) {
    hands.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let (mut left, mut right) = (None, None);
    for hand in hands.iter().filter(|h| h.confidence >= min_tracking) {
        let slot = if hand.is_right(mirrored) {
            &mut right
        } else {
            &mut left
        };
        if slot.is_none() {
            *slot = Some(hand.to_landmark_set());
        }
    }
    (left, right)
}

pub struct OrtHandTracker {
    handpose: Session,
    palm_detector: PalmDetector,
}

impl OrtHandTracker {
    pub fn new(handpose_model: &Path, palm_model: &Path) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model)
            .with_context(|| {
                format!(
                    "failed to load hand landmark model from {}",
                    handpose_model.display()
                )
            })?;
        let palm_detector = PalmDetector::new(palm_model)?;

        log::info!(
            "hand tracking ready using {} and palm detector {}",
            handpose_model.display(),
            palm_model.display()
        );
        Ok(Self {
            handpose,
            palm_detector,
        })
    }

    fn landmarks_for(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<HandposeOutput> {
        let (center, side, angle) = crop_from_palm(palm);
        let (input, transform) =
            prepare_rotated_crop(frame, center, side, angle, HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run hand landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand landmark model returned no outputs"));
        }
        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw_landmarks = decode_landmarks(&flattened)?;

        let first_scalar = |index: usize| {
            (index < outputs.len())
                .then(|| outputs[index].try_extract_array::<f32>().ok())
                .flatten()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        };
        let presence = first_scalar(1);
        let handedness = first_scalar(2);

        Ok(HandposeOutput {
            raw_landmarks,
            transform,
            confidence: (presence * palm.score).clamp(0.0, 1.0),
            handedness,
        })
    }
}

impl HandposeEngine for OrtHandTracker {
    fn detect(&mut self, frame: &Frame, min_detection: f32) -> Result<Vec<HandposeOutput>> {
        let palms = self.palm_detector.detect(frame, min_detection, MAX_HANDS)?;
        let mut hands = Vec::with_capacity(palms.len());
        for palm in &palms {
            match self.landmarks_for(frame, palm) {
                Ok(hand) => hands.push(hand),
                Err(err) => log::warn!("hand landmarks failed: {err:?}"),
            }
        }
        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_crop(center: (f32, f32), side: f32) -> CropTransform {
        CropTransform {
            center,
            side,
            angle: 0.0,
            output_size: HAND_INPUT_SIZE,
            orig_w: 640,
            orig_h: 480,
        }
    }

    fn hand(handedness: f32, confidence: f32, x: f32) -> HandposeOutput {
        HandposeOutput {
            raw_landmarks: vec![[112.0, 112.0, 0.0]; HAND_LANDMARK_COUNT],
            transform: square_crop((x, 240.0), 224.0),
            confidence,
            handedness,
        }
    }

    #[test]
    fn crop_points_map_to_normalized_frame_landmarks() {
        let output = HandposeOutput {
            raw_landmarks: vec![[112.0, 112.0, -22.4], [0.0, 224.0, 11.2]],
            transform: square_crop((320.0, 240.0), 448.0),
            confidence: 0.9,
            handedness: 0.8,
        };
        let set = output.to_landmark_set();
        assert_eq!(set.len(), 2);

        let wrist = set.get(0).copied().unwrap();
        assert!((wrist.x - 0.5).abs() < 1e-6);
        assert!((wrist.y - 0.5).abs() < 1e-6);
        // 2 frame pixels per crop pixel, over a 640 pixel wide frame.
        assert!((wrist.z - -0.07).abs() < 1e-6);
        assert_eq!(wrist.visibility, None);

        let corner = set.get(1).copied().unwrap();
        assert!((corner.x - 96.0 / 640.0).abs() < 1e-6);
        assert!((corner.y - 464.0 / 480.0).abs() < 1e-6);
        assert!((corner.z - 0.035).abs() < 1e-6);
    }

    #[test]
    fn handedness_follows_the_mirroring() {
        let right_label = hand(0.9, 0.9, 100.0);
        assert!(right_label.is_right(true));
        assert!(!right_label.is_right(false));
    }

    #[test]
    fn hands_split_by_side_and_confidence() {
        let hands = vec![
            hand(0.9, 0.6, 100.0),
            hand(0.95, 0.8, 200.0),
            hand(0.1, 0.7, 300.0),
        ];
        let (left, right) = assign_hands(hands, true, 0.5);

        let x_of = |set: Option<LandmarkSet>| set.and_then(|s| s.get(0).map(|p| p.x));
        assert_eq!(x_of(right), Some(200.0 / 640.0));
        assert_eq!(x_of(left), Some(300.0 / 640.0));
    }

    #[test]
    fn weak_hands_are_not_tracked() {
        let (left, right) = assign_hands(vec![hand(0.1, 0.3, 100.0)], true, 0.5);
        assert!(left.is_none() && right.is_none());
    }

    #[test]
    fn short_landmark_outputs_are_rejected() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());
        let points = decode_landmarks(&[1.0; 64]).unwrap();
        assert_eq!(points.len(), HAND_LANDMARK_COUNT);
    }
}
