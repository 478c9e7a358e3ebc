use std::path::PathBuf;

use clap::{ArgAction, Parser};
use nokhwa::utils::CameraIndex;

use crate::{
    model_download::{
        FACE_TOPOLOGY_URL, HAND_LANDMARK_MODEL_URL, PALM_DETECTOR_MODEL_URL,
        default_face_topology_path, default_hand_landmark_model_path,
        default_palm_detector_model_path, default_segmentation_model_path,
    },
    pipeline::{EngineSource, InferenceOptions, PipelineMode},
    types::Color,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Which pipeline to run
    #[arg(short, long, value_enum, default_value_t = PipelineMode::Holistic)]
    pub mode: PipelineMode,

    /// Camera index (default 0)
    #[arg(short, long, default_value_t = 0)]
    pub camera_index: u32,

    /// List available cameras and exit
    #[arg(long)]
    pub list: bool,

    /// Requested capture width
    #[arg(long, default_value_t = 1280)]
    pub capture_width: u32,

    /// Requested capture height
    #[arg(long, default_value_t = 720)]
    pub capture_height: u32,

    /// Matte background colour, #RRGGBB
    #[arg(long, default_value = "#0000FF")]
    pub background: Color,

    /// Recorded pose and face results to replay next to live hand tracking,
    /// one JSON object per line
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Hand landmark ONNX model; downloaded to models/ when omitted
    #[arg(long)]
    pub hand_model: Option<PathBuf>,

    /// Palm detector ONNX model; downloaded to models/ when omitted
    #[arg(long)]
    pub palm_model: Option<PathBuf>,

    /// Face topology OBJ; downloaded to models/ when omitted
    #[arg(long)]
    pub face_topology: Option<PathBuf>,

    /// Selfie segmentation ONNX model; defaults to models/ by tier
    #[arg(long)]
    pub segmentation_model: Option<PathBuf>,

    /// Where to fetch the segmentation model when it is missing
    #[arg(long)]
    pub segmentation_model_url: Option<String>,

    /// Landmark model tier
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub model_complexity: u8,

    /// Segmentation tier: 0 general, 1 landscape
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub model_selection: u8,

    #[arg(long, default_value_t = 0.5)]
    pub min_detection_confidence: f32,

    #[arg(long, default_value_t = 0.5)]
    pub min_tracking_confidence: f32,

    /// Smooth landmarks across frames
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub smooth_landmarks: bool,

    /// Mirror the input before inference (defaults on for segmentation)
    #[arg(long, action = ArgAction::Set)]
    pub selfie_mode: Option<bool>,
}

impl AppConfig {
    pub fn camera(&self) -> CameraIndex {
        CameraIndex::Index(self.camera_index)
    }

    pub fn capture_size(&self) -> (u32, u32) {
        (self.capture_width, self.capture_height)
    }

    pub fn inference_options(&self) -> InferenceOptions {
        let base = match self.mode {
            PipelineMode::Holistic => InferenceOptions::default(),
            PipelineMode::Segmentation => InferenceOptions::segmentation(),
        };
        InferenceOptions {
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
            model_complexity: self.model_complexity,
            model_selection: self.model_selection,
            smooth_landmarks: self.smooth_landmarks,
            selfie_mode: self.selfie_mode.unwrap_or(base.selfie_mode),
        }
    }

    pub fn segmentation_model_path(&self) -> PathBuf {
        self.segmentation_model
            .clone()
            .unwrap_or_else(|| default_segmentation_model_path(self.model_selection))
    }

    /// Explicit topology files are used as-is; the default location is
    /// downloaded on demand.
    pub fn face_topology_source(&self) -> (PathBuf, Option<&'static str>) {
        asset_source(&self.face_topology, default_face_topology_path, FACE_TOPOLOGY_URL)
    }

    pub fn hand_model_source(&self) -> (PathBuf, Option<&'static str>) {
        asset_source(
            &self.hand_model,
            default_hand_landmark_model_path,
            HAND_LANDMARK_MODEL_URL,
        )
    }

    pub fn palm_model_source(&self) -> (PathBuf, Option<&'static str>) {
        asset_source(
            &self.palm_model,
            default_palm_detector_model_path,
            PALM_DETECTOR_MODEL_URL,
        )
    }

    pub fn engine_source(&self) -> EngineSource {
        match self.mode {
            PipelineMode::Holistic => EngineSource::Holistic {
                hand_model: self.hand_model_source().0,
                palm_model: self.palm_model_source().0,
                replay: self.replay.clone(),
            },
            PipelineMode::Segmentation => EngineSource::Segmenter(self.segmentation_model_path()),
        }
    }
}

fn asset_source(
    explicit: &Option<PathBuf>,
    default_path: fn() -> PathBuf,
    url: &'static str,
) -> (PathBuf, Option<&'static str>) {
    match explicit {
        Some(path) => (path.clone(), None),
        None => (default_path(), Some(url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_tracker_settings() {
        let config = AppConfig::try_parse_from(["holistic-mirror"]).unwrap();
        assert_eq!(config.mode, PipelineMode::Holistic);
        assert_eq!(config.capture_size(), (1280, 720));
        assert_eq!(config.background, Color::BLUE);
        assert_eq!(config.inference_options(), InferenceOptions::default());
    }

    #[test]
    fn segmentation_defaults_to_selfie_mode() {
        let config =
            AppConfig::try_parse_from(["holistic-mirror", "--mode", "segmentation"]).unwrap();
        let options = config.inference_options();
        assert!(options.selfie_mode);
        assert_eq!(options.model_selection, 1);
        assert!(
            config
                .segmentation_model_path()
                .ends_with("selfie_segmentation_landscape.onnx")
        );

        let config = AppConfig::try_parse_from([
            "holistic-mirror",
            "--mode",
            "segmentation",
            "--selfie-mode",
            "false",
            "--background",
            "#00ff00",
        ])
        .unwrap();
        assert!(!config.inference_options().selfie_mode);
        assert_eq!(config.background, Color::rgb(0, 255, 0));
    }

    #[test]
    fn holistic_tracks_live_hands_by_default() {
        let config = AppConfig::try_parse_from(["holistic-mirror"]).unwrap();
        match config.engine_source() {
            EngineSource::Holistic {
                hand_model,
                palm_model,
                replay,
            } => {
                assert!(hand_model.ends_with("handpose_estimation_mediapipe_2023feb.onnx"));
                assert!(palm_model.ends_with("palm_detection_mediapipe_2023feb.onnx"));
                assert!(replay.is_none());
            }
            other => panic!("expected holistic engine, got {other:?}"),
        }
        assert_eq!(config.hand_model_source().1, Some(HAND_LANDMARK_MODEL_URL));
    }

    #[test]
    fn explicit_models_and_recordings_are_used_as_given() {
        let config = AppConfig::try_parse_from([
            "holistic-mirror",
            "--replay",
            "run.jsonl",
            "--hand-model",
            "hand.onnx",
        ])
        .unwrap();
        assert_eq!(config.hand_model_source(), (PathBuf::from("hand.onnx"), None));
        assert!(matches!(
            config.engine_source(),
            EngineSource::Holistic { replay: Some(path), .. } if path == PathBuf::from("run.jsonl")
        ));
        assert!(AppConfig::try_parse_from(["holistic-mirror", "--model-selection", "2"]).is_err());
    }
}
