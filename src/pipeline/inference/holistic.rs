use anyhow::{Result, bail};

use super::{
    InferenceEngine, InferenceOptions, ReplayEngine,
    hands::{HandposeEngine, assign_hands},
    smooth,
};
use crate::pipeline::rgba_converter::mirror_rgba;
use crate::types::{Frame, HolisticResult, InferenceResult, LandmarkSet};

/// Live hands from the camera. Pose and face come from an optional recording
/// replayed alongside.
pub struct HolisticTracker<H: HandposeEngine> {
    hands: H,
    replay: Option<ReplayEngine>,
    options: InferenceOptions,
    previous_left: Option<LandmarkSet>,
    previous_right: Option<LandmarkSet>,
}

impl<H: HandposeEngine> HolisticTracker<H> {
    pub fn new(hands: H, replay: Option<ReplayEngine>) -> Self {
        Self {
            hands,
            replay,
            options: InferenceOptions::default(),
            previous_left: None,
            previous_right: None,
        }
    }

    fn body_parts(&mut self, mut frame: Frame) -> Result<HolisticResult> {
        match self.replay.as_mut() {
            Some(replay) => match replay.infer(frame)? {
                InferenceResult::Holistic(result) => Ok(result),
                InferenceResult::Segmentation(_) => bail!("replay produced a segmentation result"),
            },
            None => {
                if self.options.selfie_mode {
                    mirror_rgba(&mut frame.rgba, frame.width);
                }
                Ok(HolisticResult::empty(frame))
            }
        }
    }
}

impl<H: HandposeEngine> InferenceEngine for HolisticTracker<H> {
    fn name(&self) -> &'static str {
        "holistic"
    }

    fn configure(&mut self, options: &InferenceOptions) -> Result<()> {
        if let Some(replay) = self.replay.as_mut() {
            replay.configure(options)?;
        }
        log::info!(
            "holistic tracking configured: complexity {}, smoothing {}, selfie mode {}, pose and face {}",
            options.model_complexity,
            options.smooth_landmarks,
            options.selfie_mode,
            if self.replay.is_some() { "replayed" } else { "off" }
        );
        self.options = options.clone();
        self.previous_left = None;
        self.previous_right = None;
        Ok(())
    }

    fn infer(&mut self, frame: Frame) -> Result<InferenceResult> {
        // Replay mirrors the frame itself in selfie mode, so hands are always
        // tracked on the image that gets drawn.
        let mut result = self.body_parts(frame)?;

        let tracked = self
            .hands
            .detect(&result.image, self.options.min_detection_confidence)
            .unwrap_or_else(|err| {
                log::warn!("hand tracking failed: {err:?}");
                Vec::new()
            });
        let (left, right) = assign_hands(
            tracked,
            self.options.selfie_mode,
            self.options.min_tracking_confidence,
        );
        result.left_hand = left;
        result.right_hand = right;

        if self.options.smooth_landmarks {
            smooth(&mut result.left_hand, &mut self.previous_left);
            smooth(&mut result.right_hand, &mut self.previous_right);
        }

        Ok(InferenceResult::Holistic(result))
    }
}
