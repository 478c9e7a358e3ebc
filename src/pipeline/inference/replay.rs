//! Holistic results replayed from a recording, one JSON object per line.
//!
//! Field names follow the tracker's own result keys (`poseLandmarks`,
//! `leftHandLandmarks`, ...) so a recording can be captured straight from a
//! running tracker. Each record may carry an optional detection `score`.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::{InferenceEngine, InferenceOptions, smooth};
use crate::pipeline::rgba_converter::mirror_rgba;
use crate::types::{Frame, HolisticResult, InferenceResult, LandmarkSet};

#[derive(Clone, Debug, Default, Deserialize)]
struct RecordedResult {
    #[serde(default, alias = "poseLandmarks")]
    pose: Option<LandmarkSet>,
    #[serde(default, alias = "leftHandLandmarks")]
    left_hand: Option<LandmarkSet>,
    #[serde(default, alias = "rightHandLandmarks")]
    right_hand: Option<LandmarkSet>,
    #[serde(default, alias = "faceLandmarks")]
    face: Option<LandmarkSet>,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Debug, Default)]
struct Smoothed {
    pose: Option<LandmarkSet>,
    left_hand: Option<LandmarkSet>,
    right_hand: Option<LandmarkSet>,
    face: Option<LandmarkSet>,
}

pub struct ReplayEngine {
    records: Vec<RecordedResult>,
    cursor: usize,
    options: InferenceOptions,
    previous: Smoothed,
}

impl ReplayEngine {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read recording {}", path.display()))?;
        let engine = Self::parse(&text)
            .with_context(|| format!("failed to parse recording {}", path.display()))?;
        log::info!(
            "loaded {} recorded holistic results from {}",
            engine.records.len(),
            path.display()
        );
        Ok(engine)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: RecordedResult = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid holistic record", line_no + 1))?;
            records.push(record);
        }
        if records.is_empty() {
            bail!("recording contains no results");
        }

        Ok(Self {
            records,
            cursor: 0,
            options: InferenceOptions::default(),
            previous: Smoothed::default(),
        })
    }

    fn next_record(&mut self) -> RecordedResult {
        let record = self.records[self.cursor % self.records.len()].clone();
        self.cursor += 1;
        record
    }
}

impl InferenceEngine for ReplayEngine {
    fn name(&self) -> &'static str {
        "holistic-replay"
    }

    fn configure(&mut self, options: &InferenceOptions) -> Result<()> {
        log::info!(
            "holistic replay configured: complexity {}, smoothing {}, selfie mode {}, detection >= {}",
            options.model_complexity,
            options.smooth_landmarks,
            options.selfie_mode,
            options.min_detection_confidence
        );
        self.options = options.clone();
        self.previous = Smoothed::default();
        Ok(())
    }

    fn infer(&mut self, mut frame: Frame) -> Result<InferenceResult> {
        let record = self.next_record();
        let score = record.score.unwrap_or(1.0);

        if self.options.selfie_mode {
            mirror_rgba(&mut frame.rgba, frame.width);
        }

        if score < self.options.min_detection_confidence {
            log::debug!("recorded detection score {score:.2} below threshold");
            self.previous = Smoothed::default();
            return Ok(InferenceResult::Holistic(HolisticResult::empty(frame)));
        }
        if score < self.options.min_tracking_confidence {
            self.previous = Smoothed::default();
        }

        // An empty landmark list means the part was not detected.
        let present = |set: Option<LandmarkSet>| set.filter(|s| !s.is_empty());
        let mut result = HolisticResult {
            pose: present(record.pose),
            left_hand: present(record.left_hand),
            right_hand: present(record.right_hand),
            face: present(record.face),
            image: frame,
        };

        if self.options.selfie_mode {
            for set in [
                &mut result.pose,
                &mut result.left_hand,
                &mut result.right_hand,
                &mut result.face,
            ]
            .into_iter()
            .flatten()
            {
                for point in set.iter_mut() {
                    point.x = 1.0 - point.x;
                }
            }
        }

        if self.options.smooth_landmarks {
            smooth(&mut result.pose, &mut self.previous.pose);
            smooth(&mut result.left_hand, &mut self.previous.left_hand);
            smooth(&mut result.right_hand, &mut self.previous.right_hand);
            smooth(&mut result.face, &mut self.previous.face);
        }

        Ok(InferenceResult::Holistic(result))
    }
}
