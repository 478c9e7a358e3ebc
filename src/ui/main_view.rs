use super::render_util::rendered_to_image;
use super::{
    ActiveTheme, AnyElement, AppView, Context, DEFAULT_FRAME_RATIO, FrameStats, Instant,
    IntoElement, ObjectFit, ParentElement, PipelineMode, RenderImage, Styled, StyledImage,
    Window, div, h_flex, img, px, v_flex,
};
use std::sync::Arc;

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let newest = self
            .rendered_rx
            .as_ref()
            .and_then(|rx| rx.try_iter().last());
        if let Some(frame) = newest {
            if let Some(image) = rendered_to_image(&frame) {
                self.replace_latest_image(image, window, cx);
            }
            self.record_frame(frame.width, frame.height, frame.sequence);
        }

        let mode = match self.config.mode {
            PipelineMode::Holistic => "holistic",
            PipelineMode::Segmentation => "segmentation",
        };
        let status = self
            .latest_frame
            .as_ref()
            .map(|f| {
                format!(
                    "{mode} · {}x{} · frame {} · {:.1} fps",
                    f.width, f.height, f.sequence, f.fps
                )
            })
            .unwrap_or_else(|| format!("{mode} · waiting for camera..."));

        let frame_view: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for the first frame...")
                .into_any_element(),
        };

        let theme = cx.theme();
        let ratio = self.frame_aspect_ratio();
        let viewport_width = f32::from(window.viewport_size().width) - 32.0;
        let frame_height = (viewport_width / ratio).max(120.0);

        v_flex()
            .size_full()
            .gap_3()
            .p_4()
            .bg(gpui::rgb(0x1a2332))
            .child(
                div()
                    .w_full()
                    .h(px(frame_height))
                    .rounded_lg()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view),
            )
            .child(
                h_flex().justify_between().items_center().child(
                    div()
                        .text_xs()
                        .text_color(theme.muted_foreground)
                        .child(status),
                ),
            )
            .into_any_element()
    }

    fn record_frame(&mut self, width: u32, height: u32, sequence: u64) {
        let now = Instant::now();
        let fps = self
            .latest_frame
            .as_ref()
            .map(|prev| {
                let dt = now.duration_since(prev.received).as_secs_f32();
                let instant = if dt > 0.0 { 1.0 / dt } else { prev.fps };
                // Light smoothing so the readout does not flicker.
                prev.fps * 0.8 + instant * 0.2
            })
            .unwrap_or(0.0);

        self.latest_frame = Some(FrameStats {
            width,
            height,
            sequence,
            received: now,
            fps,
        });
    }

    fn frame_aspect_ratio(&self) -> f32 {
        match &self.latest_frame {
            Some(frame) if frame.height > 0 => frame.width as f32 / frame.height as f32,
            _ => DEFAULT_FRAME_RATIO,
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Release the previous GPU texture, the sprite atlas would otherwise
            // keep every frame.
            cx.drop_image(old_image, Some(window));
        }
    }
}
