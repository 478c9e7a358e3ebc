use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    HandLandmarks,
    PalmDetector,
    SelfieSegmentation,
    FaceTopology,
}

impl ModelKind {
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::HandLandmarks => "hand landmark model",
            ModelKind::PalmDetector => "palm detector model",
            ModelKind::SelfieSegmentation => "selfie segmentation model",
            ModelKind::FaceTopology => "face topology",
        }
    }
}

const HAND_LANDMARK_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
pub const HAND_LANDMARK_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx";
const PALM_DETECTOR_MODEL_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";
pub const PALM_DETECTOR_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx";
const FACE_TOPOLOGY_FILENAME: &str = "canonical_face_model.obj";
pub const FACE_TOPOLOGY_URL: &str = "https://raw.githubusercontent.com/google/mediapipe/master/mediapipe/modules/face_geometry/data/canonical_face_model.obj";
const SEGMENTATION_GENERAL_FILENAME: &str = "selfie_segmentation.onnx";
const SEGMENTATION_LANDSCAPE_FILENAME: &str = "selfie_segmentation_landscape.onnx";

pub fn default_hand_landmark_model_path() -> PathBuf {
    PathBuf::from("models").join(HAND_LANDMARK_MODEL_FILENAME)
}

pub fn default_palm_detector_model_path() -> PathBuf {
    PathBuf::from("models").join(PALM_DETECTOR_MODEL_FILENAME)
}

pub fn default_face_topology_path() -> PathBuf {
    PathBuf::from("models").join(FACE_TOPOLOGY_FILENAME)
}

/// Default model file for a segmentation tier (0 general, 1 landscape).
pub fn default_segmentation_model_path(model_selection: u8) -> PathBuf {
    let filename = match model_selection {
        0 => SEGMENTATION_GENERAL_FILENAME,
        _ => SEGMENTATION_LANDSCAPE_FILENAME,
    };
    PathBuf::from("models").join(filename)
}

#[derive(Clone, Debug)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure `path` exists, downloading it from `url` when it does not.
/// Without a URL a missing file is an error.
pub fn ensure_asset_ready<F>(
    model: ModelKind,
    path: &Path,
    url: Option<&str>,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    let Some(url) = url else {
        bail!(
            "{} not found at {} and no download URL configured",
            model.label(),
            path.display()
        );
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(model, url, path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total, model));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| format!("failed to download {} to {}", model.label(), path.display()))
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} from {url} to {}",
        model.label(),
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start download")?
        .error_for_status()
        .context("download returned error status")?;

    let total_size = response.content_length();
    on_event(ModelDownloadEvent::Started {
        model,
        total: total_size,
    });

    persist_download(model, &mut response, total_size, dest, on_event)?;
    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

/// Streams `reader` into `<dest>.download` and renames it over `dest`. The
/// partial file is removed when any step fails.
fn persist_download<R, F>(
    model: ModelKind,
    reader: &mut R,
    total_size: Option<u64>,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let tmp_path = dest.with_extension("download");
    let result = write_then_rename(model, reader, total_size, &tmp_path, dest, on_event);
    if result.is_err() && tmp_path.exists() {
        if let Err(err) = fs::remove_file(&tmp_path) {
            log::warn!("failed to remove partial download {}: {err}", tmp_path.display());
        }
    }
    result
}

fn write_then_rename<R, F>(
    model: ModelKind,
    reader: &mut R,
    total_size: Option<u64>,
    tmp_path: &Path,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .context("failed while reading downloaded bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing download to disk")?;
        downloaded += bytes_read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total: total_size,
        });
    }

    file.sync_all()
        .context("failed to flush download to disk")?;
    drop(file);
    fs::rename(tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })
}

fn create_progress_bar(total_size: Option<u64>, model: ModelKind) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            pb.set_message(format!("downloading {}", model.label()));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("holistic-mirror-{}-{name}", std::process::id()))
    }

    #[test]
    fn present_files_are_reported_without_downloading() {
        let path = scratch_path("present.obj");
        fs::write(&path, "f 1 2 3\n").unwrap();

        let mut events = Vec::new();
        ensure_asset_ready(ModelKind::FaceTopology, &path, None, |e| events.push(e)).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(
            events.as_slice(),
            [
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::FaceTopology
                },
                ModelDownloadEvent::Finished { .. }
            ]
        ));
    }

    #[test]
    fn missing_file_without_url_is_an_error() {
        let path = scratch_path("missing.onnx");
        let err =
            ensure_asset_ready(ModelKind::SelfieSegmentation, &path, None, |_| {}).unwrap_err();
        assert!(err.to_string().contains("no download URL"));
    }

    struct BrokenStream {
        sent: bool,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"onnx");
            Ok(4)
        }
    }

    #[test]
    fn interrupted_download_leaves_no_partial_file() {
        let dest = scratch_path("interrupted.onnx");
        let mut events = Vec::new();
        let err = persist_download(
            ModelKind::SelfieSegmentation,
            &mut BrokenStream { sent: false },
            Some(1024),
            &dest,
            &mut |e| events.push(e),
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("reading downloaded bytes"));
        assert!(!dest.with_extension("download").exists());
        assert!(!dest.exists());
        assert!(matches!(
            events.as_slice(),
            [ModelDownloadEvent::Progress { downloaded: 4, .. }]
        ));
    }

    #[test]
    fn completed_download_is_moved_into_place() {
        let dest = scratch_path("complete.obj");
        let mut body: &[u8] = b"f 1 2 3\n";
        persist_download(ModelKind::FaceTopology, &mut body, None, &dest, &mut |_| {}).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "f 1 2 3\n");
        assert!(!dest.with_extension("download").exists());
        fs::remove_file(&dest).unwrap();
    }

    #[test]
    fn segmentation_tiers_map_to_model_files() {
        assert!(default_segmentation_model_path(0).ends_with("selfie_segmentation.onnx"));
        assert!(
            default_segmentation_model_path(1).ends_with("selfie_segmentation_landscape.onnx")
        );
    }
}
