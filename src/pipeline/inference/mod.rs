mod hands;
mod holistic;
mod replay;
mod segmenter;

use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

pub use hands::OrtHandTracker;
pub use holistic::HolisticTracker;
pub use replay::ReplayEngine;
pub use segmenter::SelfieSegmenter;

use super::credit::SubmissionCredit;
use crate::types::{Frame, InferenceResult, LandmarkSet};

/// Weight of the newest sample when smoothing is on.
const SMOOTHING_ALPHA: f32 = 0.5;

/// Tunables understood by the inference collaborators. Engines read the
/// fields that apply to them and ignore the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOptions {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Landmark model tier, 0 to 2.
    pub model_complexity: u8,
    /// Segmentation model tier: 0 general (256x256), 1 landscape (256x144).
    pub model_selection: u8,
    pub smooth_landmarks: bool,
    /// Mirror the input before inference, so results come back mirrored too.
    pub selfie_mode: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
            model_selection: 1,
            smooth_landmarks: true,
            selfie_mode: false,
        }
    }
}

impl InferenceOptions {
    pub fn segmentation() -> Self {
        Self {
            selfie_mode: true,
            ..Self::default()
        }
    }
}

/// A black box that turns one camera frame into one result.
pub trait InferenceEngine: Send + 'static {
    fn name(&self) -> &'static str;
    fn configure(&mut self, options: &InferenceOptions) -> Result<()>;
    fn infer(&mut self, frame: Frame) -> Result<InferenceResult>;
}

pub fn start_worker<E: InferenceEngine>(
    engine: E,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<InferenceResult>,
    credit: SubmissionCredit,
) -> Result<thread::JoinHandle<()>> {
    log::info!("starting {} inference worker", engine.name());
    thread::Builder::new()
        .name("inference".to_string())
        .spawn(move || run_worker_loop(engine, frame_rx, result_tx, credit))
        .context("failed to spawn inference worker")
}

fn run_worker_loop<E: InferenceEngine>(
    mut engine: E,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<InferenceResult>,
    credit: SubmissionCredit,
) {
    while let Ok(frame) = frame_rx.recv() {
        match engine.infer(frame) {
            Ok(result) => {
                if result_tx.send(result).is_err() {
                    break;
                }
            }
            Err(err) => {
                // Nothing will reach the controller, so hand the credit back here.
                log::warn!("{} inference failed: {err:?}", engine.name());
                credit.release();
            }
        }
    }
    log::info!("{} inference worker stopped", engine.name());
}

/// Exponential moving average against the previous output of the same part.
/// A part that disappears resets its history.
fn smooth(current: &mut Option<LandmarkSet>, previous: &mut Option<LandmarkSet>) {
    let Some(set) = current.as_mut() else {
        *previous = None;
        return;
    };

    if let Some(prev) = previous.as_ref().filter(|p| p.len() == set.len()) {
        for index in 0..set.len() {
            if let (Some(point), Some(old)) = (set.get_mut(index), prev.get(index)) {
                point.x = old.x + SMOOTHING_ALPHA * (point.x - old.x);
                point.y = old.y + SMOOTHING_ALPHA * (point.y - old.y);
                point.z = old.z + SMOOTHING_ALPHA * (point.z - old.z);
            }
        }
    }
    *previous = Some(set.clone());
}
