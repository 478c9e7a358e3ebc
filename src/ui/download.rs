use super::{
    ActiveTheme, AnyElement, AppView, AssetMessage, AssetState, Context, IntoElement,
    ParentElement, PreparedAssets, Styled, StyledExt, Tag, div, h_flex, thread, v_flex,
};
use crate::{
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind, ensure_asset_ready},
    pipeline::{FaceMesh, PipelineMode},
};
use crossbeam_channel::Sender;

impl AppView {
    pub(super) fn poll_asset_events(&mut self, state: &mut AssetState) {
        while let Ok(msg) = self.asset_rx.try_recv() {
            match msg {
                AssetMessage::Event(ModelDownloadEvent::AlreadyPresent { model }) => {
                    state.message = format!("{} already present", model.label());
                }
                AssetMessage::Event(ModelDownloadEvent::Started { model, total }) => {
                    state.downloaded = 0;
                    state.total = total;
                    state.message = format!("Downloading {}...", model.label());
                }
                AssetMessage::Event(ModelDownloadEvent::Progress {
                    downloaded, total, ..
                }) => {
                    state.downloaded = downloaded;
                    state.total = total;
                }
                AssetMessage::Event(ModelDownloadEvent::Finished { model }) => {
                    state.message = format!("{} ready", model.label());
                }
                AssetMessage::Ready(assets) => {
                    state.message = "Assets ready, starting camera...".to_string();
                    state.prepared = Some(assets);
                }
                AssetMessage::Error(err) => {
                    state.error = Some(err);
                    state.message = "Asset preparation failed".to_string();
                }
            }
        }
    }

    pub(super) fn render_preparing_view(
        &self,
        state: &AssetState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let bar = progress_bar_string(state.downloaded, state.total);

        let (status_icon, status_text, status_color) = if state.error.is_some() {
            ("✗", "Preparation failed", theme.accent)
        } else if state.prepared.is_some() {
            ("✓", "Ready", theme.success)
        } else {
            ("⟳", "Preparing", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex().gap_2().items_center().child(
                    div()
                        .text_color(status_color)
                        .font_semibold()
                        .child(format!("{status_icon} {status_text}")),
                ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(bar),
            )
            .child(
                div()
                    .text_color(theme.foreground)
                    .child(state.message.clone()),
            );

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

/// Resolves the files the selected pipeline needs. The face topology is
/// optional: without it the tesselation layer is left out.
pub(super) fn spawn_asset_preparation(
    config: AppConfig,
    tx: Sender<AssetMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let forward = |event| {
            let _ = tx.send(AssetMessage::Event(event));
        };

        let required = match config.mode {
            PipelineMode::Holistic => {
                let (hand_path, hand_url) = config.hand_model_source();
                let (palm_path, palm_url) = config.palm_model_source();
                vec![
                    (ModelKind::HandLandmarks, hand_path, hand_url),
                    (ModelKind::PalmDetector, palm_path, palm_url),
                ]
            }
            PipelineMode::Segmentation => vec![(
                ModelKind::SelfieSegmentation,
                config.segmentation_model_path(),
                config.segmentation_model_url.as_deref(),
            )],
        };

        for (model, path, url) in required {
            if let Err(err) = ensure_asset_ready(model, &path, url, forward) {
                log::error!("failed to prepare {}: {err:?}", model.label());
                let _ = tx.send(AssetMessage::Error(format!("{err:#}")));
                return;
            }
        }

        let face_mesh = match config.mode {
            PipelineMode::Holistic => load_face_mesh(&config, forward),
            PipelineMode::Segmentation => FaceMesh::default(),
        };

        let _ = tx.send(AssetMessage::Ready(PreparedAssets { face_mesh }));
    })
}

fn load_face_mesh<F>(config: &AppConfig, on_event: F) -> FaceMesh
where
    F: FnMut(ModelDownloadEvent),
{
    let (path, url) = config.face_topology_source();
    if let Err(err) = ensure_asset_ready(ModelKind::FaceTopology, &path, url, on_event) {
        log::warn!("face tesselation disabled: {err:#}");
        return FaceMesh::default();
    }
    FaceMesh::load(&path).unwrap_or_else(|err| {
        log::warn!("face tesselation disabled: {err}");
        FaceMesh::default()
    })
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ if downloaded > 0 => format!("[{:-<BAR_LEN$}] {} KB", ">", downloaded / 1024),
        _ => format!("[{}]", " ".repeat(BAR_LEN)),
    }
}
