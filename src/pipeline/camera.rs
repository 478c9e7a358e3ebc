use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

use super::{credit::SubmissionCredit, rgba_converter, surface::FrameDimensions};
use crate::types::Frame;

// Packed formats first, they skip the decode step entirely.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
    FrameFormat::GRAY,
];

fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 3] {
    let ideal = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
    [
        RequestedFormat::with_formats(
            RequestedFormatType::Closest(ideal),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

/// Where captured frames go: the dimensions handle sees every frame, the
/// inference channel only those submitted while holding the credit.
#[derive(Clone, Debug)]
pub struct FrameSink {
    pub frame_tx: Sender<Frame>,
    pub dimensions: FrameDimensions,
    pub credit: SubmissionCredit,
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto).context("failed to query cameras")?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

fn build_camera(index: &CameraIndex, width: u32, height: u32) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats(width, height) {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Opens the camera and starts capturing on a background thread. The camera
/// is asked for `width`x`height` but any size it settles on is accepted.
pub fn start_camera_stream(
    index: CameraIndex,
    (width, height): (u32, u32),
    sink: FrameSink,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    let camera = build_camera(&index, width, height)
        .with_context(|| format!("failed to open camera {index}"))?;
    let format = camera.camera_format();
    log::info!(
        "camera {index} streaming {}x{} {:?} at {} fps",
        format.width(),
        format.height(),
        format.format(),
        format.frame_rate()
    );
    drop(camera);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::Builder::new()
        .name("camera".to_string())
        .spawn(move || {
            let mut camera = match build_camera(&index, width, height) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to reopen camera: {err:?}");
                    return;
                }
            };
            capture_loop(&mut camera, &stop_flag, &sink);
            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        })
        .context("failed to spawn camera thread")?;

    Ok(CameraStream {
        stop,
        handle: Some(handle),
    })
}

fn capture_loop(camera: &mut Camera, stop: &AtomicBool, sink: &FrameSink) {
    while !stop.load(Ordering::Relaxed) {
        let read_start = Instant::now();
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!(
                    "camera frame read failed (after {:?}): {err:?}",
                    read_start.elapsed()
                );
                continue;
            }
        };

        let frame = match rgba_converter::convert_camera_frame(&buffer) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("failed to decode camera frame: {err}");
                continue;
            }
        };

        sink.dimensions.set(frame.width, frame.height);
        if !submit(sink, frame) {
            break;
        }
    }
}

/// Hands the frame to inference if the credit is free, otherwise drops it.
/// Returns false once nobody is listening any more.
fn submit(sink: &FrameSink, frame: Frame) -> bool {
    if !sink.credit.try_acquire() {
        return true;
    }
    match sink.frame_tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            sink.credit.release();
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
