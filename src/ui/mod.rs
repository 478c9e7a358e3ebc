use std::{mem, sync::Arc, thread, time::Instant};

use crossbeam_channel::{Receiver, bounded, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div, img, px,
};
use gpui_component::{ActiveTheme, Root, StyledExt, h_flex, tag::Tag, v_flex};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::AppConfig,
    model_download::ModelDownloadEvent,
    pipeline::{FaceMesh, PipelineConfig, PipelineHandle, PipelineMode, start_pipeline},
    types::RenderedFrame,
};

mod download;
mod main_view;
mod render_util;

const DEFAULT_FRAME_RATIO: f32 = 16.0 / 9.0;

pub fn launch_ui(app: &mut App, config: AppConfig) -> gpui::Result<()> {
    let title = match config.mode {
        PipelineMode::Holistic => "Holistic Mirror",
        PipelineMode::Segmentation => "Holistic Mirror: Segmentation",
    };
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some(title.into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    config: AppConfig,
    screen: Screen,
    asset_rx: Receiver<AssetMessage>,
    _asset_handle: thread::JoinHandle<()>,
    rendered_rx: Option<Receiver<RenderedFrame>>,
    pipeline: Option<PipelineHandle>,
    latest_frame: Option<FrameStats>,
    latest_image: Option<Arc<RenderImage>>,
}

enum Screen {
    Preparing(AssetState),
    Running,
    Failed(String),
}

struct AssetState {
    downloaded: u64,
    total: Option<u64>,
    message: String,
    error: Option<String>,
    prepared: Option<PreparedAssets>,
}

impl AssetState {
    fn new() -> Self {
        Self {
            downloaded: 0,
            total: None,
            message: "Checking assets...".to_string(),
            error: None,
            prepared: None,
        }
    }
}

/// Everything the pipeline needs from disk, resolved off the UI thread.
struct PreparedAssets {
    face_mesh: FaceMesh,
}

enum AssetMessage {
    Event(ModelDownloadEvent),
    Ready(PreparedAssets),
    Error(String),
}

struct FrameStats {
    width: u32,
    height: u32,
    sequence: u64,
    received: Instant,
    fps: f32,
}

impl AppView {
    fn new(config: AppConfig) -> Self {
        let (asset_tx, asset_rx) = unbounded();
        let asset_handle = download::spawn_asset_preparation(config.clone(), asset_tx);

        Self {
            config,
            screen: Screen::Preparing(AssetState::new()),
            asset_rx,
            _asset_handle: asset_handle,
            rendered_rx: None,
            pipeline: None,
            latest_frame: None,
            latest_image: None,
        }
    }

    /// Builds and starts the pipeline once assets are ready. Failures end up on
    /// the error screen; nothing is retried.
    fn launch_pipeline(&mut self, assets: PreparedAssets) -> Result<(), String> {
        let pipeline_config = PipelineConfig {
            camera: self.config.camera(),
            capture_size: self.config.capture_size(),
            engine: self.config.engine_source(),
            options: self.config.inference_options(),
            background: self.config.background,
            face_mesh: assets.face_mesh,
        };

        let (rendered_tx, rendered_rx) = bounded(2);
        let handle = start_pipeline(pipeline_config, rendered_tx).map_err(|err| {
            log::error!("failed to start pipeline: {err}");
            err.to_string()
        })?;
        self.pipeline = Some(handle);
        self.rendered_rx = Some(rendered_rx);
        Ok(())
    }
}

impl Drop for AppView {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let screen = mem::replace(&mut self.screen, Screen::Running);
        let (view, next) = match screen {
            Screen::Preparing(mut state) => {
                self.poll_asset_events(&mut state);
                let view = self.render_preparing_view(&state, cx);
                match state.prepared.take() {
                    Some(assets) => match self.launch_pipeline(assets) {
                        Ok(()) => (view, Screen::Running),
                        Err(err) => (view, Screen::Failed(err)),
                    },
                    None => (view, Screen::Preparing(state)),
                }
            }
            Screen::Running => (self.render_main(window, cx), Screen::Running),
            Screen::Failed(err) => {
                let view = render_failed_view(&err, cx);
                (view, Screen::Failed(err))
            }
        };
        self.screen = next;
        view
    }
}

fn render_failed_view(message: &str, cx: &mut Context<'_, AppView>) -> AnyElement {
    let theme = cx.theme();
    v_flex()
        .size_full()
        .items_center()
        .justify_center()
        .gap_3()
        .bg(theme.background)
        .child(
            div()
                .font_semibold()
                .text_color(theme.foreground)
                .child("Pipeline failed to start"),
        )
        .child(Tag::danger().rounded_full().child(message.to_string()))
        .into_any_element()
}
