//! Input geometry for the two hand models: a letterboxed square for the palm
//! detector and a rotated square crop around each palm for the landmark model.

use anyhow::{Result, anyhow};
use ndarray::Array4;
use rayon::prelude::*;

use crate::pipeline::rgba_converter::resize_rgba;
use crate::pipeline::surface::ImageRef;
use crate::types::Frame;

/// How a frame was fitted into the square detector input.
#[derive(Clone, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps landmark-model input pixels back onto the source frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.pixel_scale();
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        let ox = self.center.0 + dx * cos - dy * sin;
        let oy = self.center.1 + dx * sin + dy * cos;
        (
            ox.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            oy.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
        )
    }

    /// Frame pixels per model input pixel.
    pub fn pixel_scale(&self) -> f32 {
        self.side / self.output_size as f32
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Scales the frame to fit `target` x `target`, centred on black padding,
/// as NHWC floats in `[0, 1]`.
pub fn prepare_letterboxed(frame: &Frame, target: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_frame(frame)?;

    let scale = target as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target);
    let resized = resize_rgba(
        ImageRef {
            rgba: &frame.rgba,
            width: frame.width,
            height: frame.height,
        },
        new_w,
        new_h,
    )?;

    let pad_x = ((target - new_w) / 2) as usize;
    let pad_y = ((target - new_h) / 2) as usize;
    let side = target as usize;
    let mut canvas = vec![0.0f32; side * side * 3];
    canvas
        .par_chunks_exact_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(row, out)| {
            let src_row = &resized[(row - pad_y) * new_w as usize * 4..][..new_w as usize * 4];
            for (px, dst) in src_row
                .chunks_exact(4)
                .zip(out[pad_x * 3..].chunks_exact_mut(3))
            {
                dst[0] = px[0] as f32 / 255.0;
                dst[1] = px[1] as f32 / 255.0;
                dst[2] = px[2] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), canvas)
        .map_err(|err| anyhow!("failed to build detector input tensor: {err}"))?;
    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };
    Ok((input, letterbox))
}

/// Samples a `side`-pixel square rotated by `angle` around `center` into an
/// `output_size` square, bilinear, outside pixels black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };
    let half = output_size as f32 / 2.0;
    let scale = transform.pixel_scale();
    let (sin, cos) = angle.sin_cos();
    let size = output_size as usize;

    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_exact_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = (y as f32 + 0.5 - half) * scale;
            for (x, dst) in row.chunks_exact_mut(3).enumerate() {
                let dx = (x as f32 + 0.5 - half) * scale;
                let src_x = center.0 + dx * cos - dy * sin;
                let src_y = center.1 + dx * sin + dy * cos;
                dst.copy_from_slice(&sample_rgb(frame, src_x, src_y));
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build hand crop tensor: {err}"))?;
    Ok((input, transform))
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0; 3];
    }
    // Pixel centres sit at +0.5.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        if cx < 0.0 || cy < 0.0 || cx >= frame.width as f32 || cy >= frame.height as f32 {
            return [0.0; 3];
        }
        let idx = (cy as usize * frame.width as usize + cx as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}
