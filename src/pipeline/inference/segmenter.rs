use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::{InferenceEngine, InferenceOptions};
use crate::pipeline::rgba_converter::{mirror_rgba, resize_rgba};
use crate::pipeline::surface::ImageRef;
use crate::types::{Frame, InferenceResult, Mask, SegmentationResult};

/// Input geometry of the selfie segmentation model tiers.
pub fn input_size(model_selection: u8) -> (u32, u32) {
    match model_selection {
        0 => (256, 256),
        _ => (256, 144),
    }
}

pub struct SelfieSegmenter {
    session: Session,
    input: (u32, u32),
    selfie_mode: bool,
}

impl SelfieSegmenter {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!(
                    "failed to load segmentation model from {}",
                    model_path.display()
                )
            })?;

        let defaults = InferenceOptions::segmentation();
        Ok(Self {
            session,
            input: input_size(defaults.model_selection),
            selfie_mode: defaults.selfie_mode,
        })
    }
}

impl InferenceEngine for SelfieSegmenter {
    fn name(&self) -> &'static str {
        "selfie-segmentation"
    }

    fn configure(&mut self, options: &InferenceOptions) -> Result<()> {
        if options.model_selection > 1 {
            bail!(
                "model_selection must be 0 or 1, got {}",
                options.model_selection
            );
        }
        self.input = input_size(options.model_selection);
        self.selfie_mode = options.selfie_mode;
        log::info!(
            "segmentation configured: input {}x{}, selfie mode {}",
            self.input.0,
            self.input.1,
            self.selfie_mode
        );
        Ok(())
    }

    fn infer(&mut self, mut frame: Frame) -> Result<InferenceResult> {
        if self.selfie_mode {
            mirror_rgba(&mut frame.rgba, frame.width);
        }

        let (width, height) = self.input;
        let input = prepare_input(&frame, width, height)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run segmentation session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("segmentation model returned no outputs"));
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = scores.iter().copied().collect();
        let mask = decode_mask(&flattened, width, height)?;

        Ok(InferenceResult::Segmentation(SegmentationResult {
            image: frame,
            mask: Some(mask),
        }))
    }
}

/// Scales the frame to the model input and normalizes it to NHWC floats in
/// `[0, 1]`.
pub(crate) fn prepare_input(frame: &Frame, width: u32, height: u32) -> Result<Array4<f32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let resized = resize_rgba(
        ImageRef {
            rgba: &frame.rgba,
            width: frame.width,
            height: frame.height,
        },
        width,
        height,
    )?;

    let normalized: Vec<f32> = resized
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();

    Array4::<f32>::from_shape_vec((1, height as usize, width as usize, 3), normalized)
        .map_err(|err| anyhow!("failed to build segmentation input tensor: {err}"))
}

/// Turns the model's per-pixel person score into an 8-bit mask. Two-channel
/// outputs carry background then person for each pixel.
pub(crate) fn decode_mask(scores: &[f32], width: u32, height: u32) -> Result<Mask> {
    let pixels = width as usize * height as usize;
    let person: Vec<f32> = if scores.len() == pixels {
        scores.to_vec()
    } else if scores.len() == pixels * 2 {
        scores.chunks_exact(2).map(|pair| pair[1]).collect()
    } else {
        return Err(anyhow!(
            "unexpected segmentation output length: got {}, need {pixels}",
            scores.len()
        ));
    };

    let alpha = person
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    Ok(Mask {
        alpha,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_selection_picks_the_input_geometry() {
        assert_eq!(input_size(0), (256, 256));
        assert_eq!(input_size(1), (256, 144));
    }

    #[test]
    fn input_is_normalized_nhwc() {
        let frame = Frame::filled(8, 6, [255, 0, 51, 255]);
        let input = prepare_input(&frame, 4, 2).unwrap();
        assert_eq!(input.shape(), &[1, 2, 4, 3]);
        for px in input.as_slice().unwrap().chunks_exact(3) {
            assert!((px[0] - 1.0).abs() < 0.01);
            assert!(px[1].abs() < 0.01);
            assert!((px[2] - 0.2).abs() < 0.01);
        }
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let mut frame = Frame::filled(4, 4, [0; 4]);
        frame.rgba.truncate(10);
        assert!(prepare_input(&frame, 4, 4).is_err());
    }

    #[test]
    fn scores_become_clamped_coverage() {
        let mask = decode_mask(&[-0.5, 0.0, 0.5, 1.2], 2, 2).unwrap();
        assert_eq!(mask.alpha, vec![0, 0, 128, 255]);
        assert_eq!((mask.width, mask.height), (2, 2));
    }

    #[test]
    fn two_channel_scores_use_the_person_channel() {
        let mask = decode_mask(&[1.0, 0.0, 0.0, 1.0], 2, 1).unwrap();
        assert_eq!(mask.alpha, vec![0, 255]);
        assert!(decode_mask(&[0.0; 3], 2, 1).is_err());
    }
}
