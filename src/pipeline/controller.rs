use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use nokhwa::utils::CameraIndex;
use thiserror::Error;

use super::{
    camera::{CameraStream, FrameSink, start_camera_stream},
    compositor::{CompositeOutcome, composite_mask},
    credit::SubmissionCredit,
    face_mesh::FaceMesh,
    filter::filter_pose,
    inference::{
        HolisticTracker, InferenceEngine, InferenceOptions, OrtHandTracker, ReplayEngine,
        SelfieSegmenter, start_worker,
    },
    overlay::render_overlay,
    raster::RasterSurface,
    surface::{DrawingSurface, FrameDimensions, SyncOutcome, sync_surface},
};
use crate::types::{Color, Frame, InferenceResult, RenderedFrame};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{engine} failed to initialize: {reason}")]
    Engine { engine: &'static str, reason: String },
    #[error("camera failed to start: {0}")]
    Camera(String),
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PipelineMode {
    /// Landmark skeletons over the mirrored camera feed.
    Holistic,
    /// Subject matted onto a solid background.
    Segmentation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The frame source has not reported a size yet.
    NotReady,
    MissingMask,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    Skipped(SkipReason),
}

/// Owns the drawing surface and turns each result into exactly one draw.
pub struct Controller<S: DrawingSurface> {
    surface: S,
    dimensions: FrameDimensions,
    face_mesh: FaceMesh,
    background: Color,
    sequence: u64,
}

impl<S: DrawingSurface> Controller<S> {
    pub fn new(
        surface: S,
        dimensions: FrameDimensions,
        face_mesh: FaceMesh,
        background: Color,
    ) -> Self {
        Self {
            surface,
            dimensions,
            face_mesh,
            background,
            sequence: 0,
        }
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn draw(&mut self, result: InferenceResult) -> DrawOutcome {
        if sync_surface(&mut self.surface, &self.dimensions) == SyncOutcome::NotReady {
            log::debug!("frame source not ready, skipping frame");
            return DrawOutcome::Skipped(SkipReason::NotReady);
        }

        match result {
            InferenceResult::Holistic(mut result) => {
                filter_pose(result.pose.as_mut());
                render_overlay(&mut self.surface, &result, &self.face_mesh);
                DrawOutcome::Drawn
            }
            InferenceResult::Segmentation(result) => {
                match composite_mask(&mut self.surface, &result, self.background) {
                    CompositeOutcome::Composited => DrawOutcome::Drawn,
                    CompositeOutcome::MissingMask => {
                        log::debug!("segmentation result without mask, skipping frame");
                        DrawOutcome::Skipped(SkipReason::MissingMask)
                    }
                }
            }
        }
    }
}

impl Controller<RasterSurface> {
    pub fn snapshot(&mut self) -> RenderedFrame {
        self.sequence += 1;
        self.surface.snapshot(self.sequence)
    }
}

fn run_controller(
    mut controller: Controller<RasterSurface>,
    result_rx: Receiver<InferenceResult>,
    rendered_tx: Sender<RenderedFrame>,
    credit: SubmissionCredit,
    stop: Arc<AtomicBool>,
) {
    while let Ok(result) = result_rx.recv() {
        if stop.load(Ordering::SeqCst) {
            log::debug!("pipeline stopped, discarding result");
            continue;
        }

        if controller.draw(result) == DrawOutcome::Drawn {
            // A full channel means the presenter is behind; it only wants the newest.
            let _ = rendered_tx.try_send(controller.snapshot());
        }
        credit.release();
    }
    log::info!("pipeline controller stopped");
}

fn spawn_controller(
    controller: Controller<RasterSurface>,
    result_rx: Receiver<InferenceResult>,
    rendered_tx: Sender<RenderedFrame>,
    credit: SubmissionCredit,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, PipelineError> {
    thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || run_controller(controller, result_rx, rendered_tx, credit, stop))
        .map_err(|_| PipelineError::Spawn("controller"))
}

#[derive(Clone, Debug)]
pub enum EngineSource {
    /// Live hand tracking, with pose and face optionally replayed from a
    /// JSON-lines recording.
    Holistic {
        hand_model: PathBuf,
        palm_model: PathBuf,
        replay: Option<PathBuf>,
    },
    /// ONNX selfie segmentation model.
    Segmenter(PathBuf),
}

impl EngineSource {
    pub fn mode(&self) -> PipelineMode {
        match self {
            EngineSource::Holistic { .. } => PipelineMode::Holistic,
            EngineSource::Segmenter(_) => PipelineMode::Segmentation,
        }
    }
}

fn engine_error(engine: &'static str) -> impl FnOnce(anyhow::Error) -> PipelineError {
    move |err| PipelineError::Engine {
        engine,
        reason: format!("{err:#}"),
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub camera: CameraIndex,
    pub capture_size: (u32, u32),
    pub engine: EngineSource,
    pub options: InferenceOptions,
    pub background: Color,
    pub face_mesh: FaceMesh,
}

/// Running pipeline threads. Stopping (or dropping) raises the stop flag,
/// halts capture and waits for the worker and controller to drain.
#[derive(Debug)]
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    camera: Option<CameraStream>,
    worker: Option<thread::JoinHandle<()>>,
    controller: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        for handle in [self.worker.take(), self.controller.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_engine<E: InferenceEngine>(
    mut engine: E,
    options: &InferenceOptions,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<InferenceResult>,
    credit: SubmissionCredit,
) -> Result<thread::JoinHandle<()>, PipelineError> {
    let name = engine.name();
    engine
        .configure(options)
        .map_err(|err| PipelineError::Engine {
            engine: name,
            reason: format!("{err:#}"),
        })?;
    start_worker(engine, frame_rx, result_tx, credit).map_err(|_| PipelineError::Spawn("inference"))
}

/// Starts capture, inference and drawing. Rendered surfaces arrive on
/// `rendered_tx`. Collaborator failures are returned, never retried.
pub fn start_pipeline(
    config: PipelineConfig,
    rendered_tx: Sender<RenderedFrame>,
) -> Result<PipelineHandle, PipelineError> {
    let (frame_tx, frame_rx) = bounded(1);
    let (result_tx, result_rx) = bounded(1);
    let credit = SubmissionCredit::new();
    let dimensions = FrameDimensions::default();
    let stop = Arc::new(AtomicBool::new(false));

    let worker = match &config.engine {
        EngineSource::Holistic {
            hand_model,
            palm_model,
            replay,
        } => {
            let hands = OrtHandTracker::new(hand_model, palm_model)
                .map_err(engine_error("hand-tracking"))?;
            let replay = replay
                .as_deref()
                .map(ReplayEngine::load)
                .transpose()
                .map_err(engine_error("holistic-replay"))?;
            let engine = HolisticTracker::new(hands, replay);
            spawn_engine(engine, &config.options, frame_rx, result_tx, credit.clone())?
        }
        EngineSource::Segmenter(path) => {
            let engine =
                SelfieSegmenter::new(path).map_err(engine_error("selfie-segmentation"))?;
            spawn_engine(engine, &config.options, frame_rx, result_tx, credit.clone())?
        }
    };

    let controller = Controller::new(
        RasterSurface::default(),
        dimensions.clone(),
        config.face_mesh,
        config.background,
    );
    let controller = spawn_controller(
        controller,
        result_rx,
        rendered_tx,
        credit.clone(),
        stop.clone(),
    )?;

    let sink = FrameSink {
        frame_tx,
        dimensions,
        credit,
    };
    let camera = start_camera_stream(config.camera, config.capture_size, sink)
        .map_err(|err| PipelineError::Camera(format!("{err:#}")))?;

    log::info!("{:?} pipeline running", config.engine.mode());
    Ok(PipelineHandle {
        stop,
        camera: Some(camera),
        worker: Some(worker),
        controller: Some(controller),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recording::{DrawOp, RecordingSurface};
    use crate::pipeline::skeleton::pose;
    use crate::types::{HolisticResult, Landmark, LandmarkSet, Mask, SegmentationResult};

    fn holistic_with_shoulder(x: f32, y: f32) -> InferenceResult {
        let mut points: Vec<Landmark> = (0..pose::COUNT)
            .map(|_| Landmark::new(0.0, 0.0, 0.0).with_visibility(0.0))
            .collect();
        points[pose::LEFT_SHOULDER] = Landmark::new(x, y, 0.0).with_visibility(0.9);
        let mut result = HolisticResult::empty(Frame::filled(4, 4, [0; 4]));
        result.pose = Some(LandmarkSet::from_points(points));
        InferenceResult::Holistic(result)
    }

    fn recording_controller(dimensions: &FrameDimensions) -> Controller<RecordingSurface> {
        Controller::new(
            RecordingSurface::default(),
            dimensions.clone(),
            FaceMesh::default(),
            Color::BLUE,
        )
    }

    #[test]
    fn zero_dimensions_skip_the_frame() {
        let dimensions = FrameDimensions::default();
        let mut controller = recording_controller(&dimensions);
        assert_eq!(
            controller.draw(holistic_with_shoulder(0.5, 0.5)),
            DrawOutcome::Skipped(SkipReason::NotReady)
        );
        assert!(controller.surface().ops().is_empty());
    }

    #[test]
    fn surface_follows_the_video_size_between_frames() {
        let dimensions = FrameDimensions::default();
        let mut controller = recording_controller(&dimensions);

        dimensions.set(640, 480);
        assert_eq!(controller.draw(holistic_with_shoulder(0.5, 0.25)), DrawOutcome::Drawn);
        let first = controller.surface.take_ops();
        assert_eq!(
            first[0],
            DrawOp::Resize {
                width: 640,
                height: 480
            }
        );
        let circles: Vec<_> = first
            .iter()
            .filter_map(|op| match op {
                DrawOp::Circle { center, .. } => Some(*center),
                _ => None,
            })
            .collect();
        assert_eq!(circles, vec![(320.0, 120.0)]);

        dimensions.set(1280, 720);
        controller.draw(holistic_with_shoulder(0.5, 0.25));
        let second = controller.surface.take_ops();
        assert_eq!(
            second[0],
            DrawOp::Resize {
                width: 1280,
                height: 720
            }
        );
        assert!(second.iter().any(|op| matches!(
            op,
            DrawOp::Circle { center, .. } if *center == (640.0, 180.0)
        )));
    }

    #[test]
    fn unchanged_size_does_not_resize_again() {
        let dimensions = FrameDimensions::default();
        dimensions.set(8, 8);
        let mut controller = recording_controller(&dimensions);
        controller.draw(holistic_with_shoulder(0.5, 0.5));
        controller.surface.take_ops();
        controller.draw(holistic_with_shoulder(0.5, 0.5));
        assert!(
            !controller
                .surface()
                .ops()
                .iter()
                .any(|op| matches!(op, DrawOp::Resize { .. }))
        );
    }

    #[test]
    fn missing_mask_is_reported_as_skipped() {
        let dimensions = FrameDimensions::default();
        dimensions.set(4, 4);
        let mut controller = recording_controller(&dimensions);
        let result = InferenceResult::Segmentation(SegmentationResult {
            image: Frame::filled(4, 4, [0; 4]),
            mask: None,
        });
        assert_eq!(
            controller.draw(result),
            DrawOutcome::Skipped(SkipReason::MissingMask)
        );
    }

    fn matte(width: u32, height: u32) -> InferenceResult {
        InferenceResult::Segmentation(SegmentationResult {
            image: Frame::filled(width, height, [10, 20, 30, 255]),
            mask: Some(Mask::filled(width, height, 0)),
        })
    }

    #[test]
    fn drawn_results_are_published_and_return_the_credit() {
        let dimensions = FrameDimensions::default();
        dimensions.set(2, 2);
        let controller = Controller::new(
            RasterSurface::default(),
            dimensions,
            FaceMesh::default(),
            Color::BLUE,
        );
        let credit = SubmissionCredit::new();
        assert!(credit.try_acquire());
        let (result_tx, result_rx) = bounded(1);
        let (rendered_tx, rendered_rx) = bounded(4);
        let stop = Arc::new(AtomicBool::new(false));

        let handle =
            spawn_controller(controller, result_rx, rendered_tx, credit.clone(), stop).unwrap();
        result_tx.send(matte(2, 2)).unwrap();
        drop(result_tx);
        handle.join().unwrap();

        let frame = rendered_rx.try_recv().unwrap();
        assert_eq!((frame.width, frame.height, frame.sequence), (2, 2, 1));
        assert!(frame.rgba.chunks_exact(4).all(|px| px == [0, 0, 255, 255]));
        assert!(credit.try_acquire());
    }

    #[test]
    fn results_after_teardown_are_discarded() {
        let dimensions = FrameDimensions::default();
        dimensions.set(2, 2);
        let controller = Controller::new(
            RasterSurface::default(),
            dimensions,
            FaceMesh::default(),
            Color::BLUE,
        );
        let (result_tx, result_rx) = bounded(1);
        let (rendered_tx, rendered_rx) = bounded(4);
        let stop = Arc::new(AtomicBool::new(true));

        let handle = spawn_controller(
            controller,
            result_rx,
            rendered_tx,
            SubmissionCredit::new(),
            stop,
        )
        .unwrap();
        result_tx.send(matte(2, 2)).unwrap();
        drop(result_tx);
        handle.join().unwrap();

        assert!(rendered_rx.try_recv().is_err());
    }
}
