use std::borrow::Cow;

use rayon::prelude::*;

use super::rgba_converter::resize_rgba;
use super::surface::{CompositeMode, DrawingSurface, ImageRef, Rect, Stroke, Transform};
use crate::types::{Color, RenderedFrame};

#[derive(Clone, Copy, Debug, Default)]
struct PaintState {
    transform: Transform,
    composite: CompositeMode,
}

/// CPU drawing surface backed by a straight-alpha RGBA buffer.
#[derive(Debug, Default)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    state: PaintState,
    stack: Vec<PaintState>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self::default();
        surface.resize(width, height);
        surface
    }

    #[cfg(test)]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn snapshot(&self, sequence: u64) -> RenderedFrame {
        RenderedFrame {
            rgba: self.pixels.clone(),
            width: self.width,
            height: self.height,
            sequence,
        }
    }

    /// Device-space bounding box clipped to the surface, as `[x0, x1) x [y0, y1)`.
    fn clip_box(&self, min: (f32, f32), max: (f32, f32)) -> Option<(u32, u32, u32, u32)> {
        let x0 = min.0.floor().max(0.0) as i64;
        let y0 = min.1.floor().max(0.0) as i64;
        let x1 = (max.0.ceil() as i64).min(self.width as i64);
        let y1 = (max.1.ceil() as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Blends `color` into every pixel of the box accepted by `covers`, which
    /// receives the device-space pixel centre.
    fn paint_where<F>(&mut self, bbox: (u32, u32, u32, u32), color: Color, covers: F)
    where
        F: Fn(f32, f32) -> bool + Sync,
    {
        let (x0, y0, x1, y1) = bbox;
        let stride = self.width as usize * 4;
        let mode = self.state.composite;
        let src = color.to_array();
        self.pixels
            .par_chunks_exact_mut(stride)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(y, row)| {
                let cy = y as f32 + 0.5;
                for x in x0..x1 {
                    if covers(x as f32 + 0.5, cy) {
                        let idx = x as usize * 4;
                        blend_pixel(&mut row[idx..idx + 4], src, mode);
                    }
                }
            });
    }

    fn scale_factor(&self) -> f32 {
        let t = self.state.transform;
        (t.sx.abs() + t.sy.abs()) / 2.0
    }
}

impl DrawingSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0u8; width as usize * height as usize * 4];
        self.state = PaintState::default();
        self.stack.clear();
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.state.transform.translate(dx, dy);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.state.transform.scale(sx, sy);
    }

    fn set_composite(&mut self, mode: CompositeMode) {
        self.state.composite = mode;
    }

    fn draw_image(&mut self, image: ImageRef<'_>, dest: Rect) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let expected = image.width as usize * image.height as usize * 4;
        if image.rgba.len() != expected {
            log::warn!(
                "skipping image with mismatched buffer: got {}, expected {expected}",
                image.rgba.len()
            );
            return;
        }

        let t = self.state.transform;
        let (ax, ay) = t.apply((dest.x, dest.y));
        let (bx, by) = t.apply((dest.x + dest.w, dest.y + dest.h));
        let flip_x = bx < ax;
        let flip_y = by < ay;
        let left = ax.min(bx).round() as i64;
        let top = ay.min(by).round() as i64;
        let dw = (ax.max(bx).round() as i64 - left).max(0) as u32;
        let dh = (ay.max(by).round() as i64 - top).max(0) as u32;
        if dw == 0 || dh == 0 {
            return;
        }

        let scaled: Cow<'_, [u8]> = if dw == image.width && dh == image.height {
            Cow::Borrowed(image.rgba)
        } else {
            match resize_rgba(image, dw, dh) {
                Ok(pixels) => Cow::Owned(pixels),
                Err(err) => {
                    log::warn!("failed to scale image to {dw}x{dh}: {err:?}");
                    return;
                }
            }
        };

        let stride = self.width as usize * 4;
        let mode = self.state.composite;
        let width = self.width as i64;
        let height = self.height as i64;
        self.pixels
            .par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let ry = y as i64 - top;
                if ry < 0 || ry >= dh as i64 || y as i64 >= height {
                    return;
                }
                let sy = (if flip_y { dh as i64 - 1 - ry } else { ry }) as usize;
                for rx in 0..dw as i64 {
                    let x = left + rx;
                    if x < 0 || x >= width {
                        continue;
                    }
                    let sx = (if flip_x { dw as i64 - 1 - rx } else { rx }) as usize;
                    let sidx = (sy * dw as usize + sx) * 4;
                    let src = [
                        scaled[sidx],
                        scaled[sidx + 1],
                        scaled[sidx + 2],
                        scaled[sidx + 3],
                    ];
                    let didx = x as usize * 4;
                    blend_pixel(&mut row[didx..didx + 4], src, mode);
                }
            });
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), stroke: Stroke) {
        let t = self.state.transform;
        let a = t.apply(from);
        let b = t.apply(to);
        let radius = (stroke.width * self.scale_factor() / 2.0).max(0.75);
        let min = (a.0.min(b.0) - radius, a.1.min(b.1) - radius);
        let max = (a.0.max(b.0) + radius, a.1.max(b.1) + radius);
        let Some(bbox) = self.clip_box(min, max) else {
            return;
        };
        self.paint_where(bbox, stroke.color, |x, y| {
            distance_to_segment((x, y), a, b) <= radius
        });
    }

    fn draw_circle(&mut self, center: (f32, f32), radius: f32, fill: Color, stroke: Stroke) {
        let c = self.state.transform.apply(center);
        let scale = self.scale_factor();
        let r = radius * scale;
        let half = stroke.width * scale / 2.0;
        let reach = r + half;
        let Some(bbox) = self.clip_box((c.0 - reach, c.1 - reach), (c.0 + reach, c.1 + reach))
        else {
            return;
        };
        let dist = move |x: f32, y: f32| ((x - c.0).powi(2) + (y - c.1).powi(2)).sqrt();
        self.paint_where(bbox, fill, |x, y| dist(x, y) <= r);
        if half > 0.0 {
            self.paint_where(bbox, stroke.color, |x, y| (dist(x, y) - r).abs() <= half);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let t = self.state.transform;
        let a = t.apply((rect.x, rect.y));
        let b = t.apply((rect.x + rect.w, rect.y + rect.h));
        let Some(bbox) = self.clip_box((a.0.min(b.0), a.1.min(b.1)), (a.0.max(b.0), a.1.max(b.1)))
        else {
            return;
        };
        self.paint_where(bbox, color, |_, _| true);
    }
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Porter-Duff compositing of one straight-alpha pixel.
fn blend_pixel(dst: &mut [u8], src: [u8; 4], mode: CompositeMode) {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let (fs, fd) = match mode {
        CompositeMode::SourceOver => (1.0, 1.0 - sa),
        CompositeMode::SourceIn => (da, 0.0),
        CompositeMode::DestinationAtop => (1.0 - da, sa),
    };

    let out_a = sa * fs + da * fd;
    if out_a <= 0.0 {
        dst.fill(0);
        return;
    }
    for c in 0..3 {
        let premul = src[c] as f32 * sa * fs + dst[c] as f32 * da * fd;
        dst[c] = (premul / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(255, 0, 0);

    #[test]
    fn source_over_blends_translucent_colour() {
        let mut px = [0u8, 0, 255, 255];
        blend_pixel(&mut px, [255, 255, 255, 128], CompositeMode::SourceOver);
        assert_eq!(px[3], 255);
        assert!(px[0] > 120 && px[0] < 135);
        assert!(px[2] == 255);
    }

    #[test]
    fn source_in_keeps_only_covered_pixels() {
        let mut covered = [255u8, 255, 255, 255];
        blend_pixel(&mut covered, [10, 20, 30, 255], CompositeMode::SourceIn);
        assert_eq!(covered, [10, 20, 30, 255]);

        let mut empty = [0u8; 4];
        blend_pixel(&mut empty, [10, 20, 30, 255], CompositeMode::SourceIn);
        assert_eq!(empty, [0, 0, 0, 0]);
    }

    #[test]
    fn destination_atop_fills_only_transparent_pixels() {
        let mut kept = [10u8, 20, 30, 255];
        blend_pixel(&mut kept, [0, 0, 255, 255], CompositeMode::DestinationAtop);
        assert_eq!(kept, [10, 20, 30, 255]);

        let mut filled = [0u8; 4];
        blend_pixel(&mut filled, [0, 0, 255, 255], CompositeMode::DestinationAtop);
        assert_eq!(filled, [0, 0, 255, 255]);
    }

    #[test]
    fn resize_clears_pixels_and_state() {
        let mut surface = RasterSurface::new(4, 4);
        surface.translate(2.0, 0.0);
        surface.fill_rect(Rect::from_size(4, 4), RED);
        assert_eq!(surface.pixel(3, 0), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));

        surface.resize(8, 2);
        assert_eq!(surface.pixels().len(), 8 * 2 * 4);
        assert!(surface.pixels().iter().all(|&b| b == 0));
        surface.fill_rect(Rect::from_size(1, 1), RED);
        assert_eq!(surface.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn mirrored_image_is_flipped_horizontally() {
        let mut surface = RasterSurface::new(2, 1);
        let rgba = [255u8, 0, 0, 255, 0, 255, 0, 255];
        surface.translate(2.0, 0.0);
        surface.scale(-1.0, 1.0);
        surface.draw_image(
            ImageRef {
                rgba: &rgba,
                width: 2,
                height: 1,
            },
            Rect::from_size(2, 1),
        );
        assert_eq!(surface.pixel(0, 0), Some([0, 255, 0, 255]));
        assert_eq!(surface.pixel(1, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn strokes_and_circles_stay_inside_the_surface() {
        let mut surface = RasterSurface::new(16, 16);
        surface.stroke_line((-10.0, 8.0), (30.0, 8.0), Stroke::new(RED, 2.0));
        assert_eq!(surface.pixel(0, 8), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(15, 8), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(8, 0), Some([0, 0, 0, 0]));

        surface.draw_circle(
            (8.0, 8.0),
            3.0,
            Color::CYAN,
            Stroke::new(Color::WHITE, 0.0),
        );
        assert_eq!(surface.pixel(8, 7), Some(Color::CYAN.to_array()));
        surface.draw_circle((100.0, 100.0), 3.0, Color::CYAN, Stroke::new(RED, 1.0));
    }
}
