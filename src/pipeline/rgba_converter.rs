//! Pixel plumbing: camera buffers to RGBA frames, plus the scaling and
//! mirroring helpers shared by the surface and the segmentation engine.

use fast_image_resize as fir;
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use thiserror::Error;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use super::surface::ImageRef;
use crate::types::Frame;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{format} buffer too small: got {got}, expected {expected}")]
    BufferTooSmall {
        format: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("{format} conversion failed: {reason}")]
    Conversion {
        format: &'static str,
        reason: String,
    },
    #[error("image scaling failed: {0}")]
    Resize(String),
}

pub fn convert_camera_frame(buffer: &Buffer) -> Result<Frame, FrameError> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let (rgba, width, height) = match buffer.source_frame_format() {
        FrameFormat::NV12 => (nv12_to_rgba(data, width, height)?, width, height),
        FrameFormat::YUYV => (yuyv_to_rgba(data, width, height)?, width, height),
        FrameFormat::MJPEG => mjpeg_to_rgba(data)?,
        FrameFormat::RAWRGB => (packed_to_rgba(data, width, height, Packing::Rgb)?, width, height),
        FrameFormat::RAWBGR => (packed_to_rgba(data, width, height, Packing::Bgr)?, width, height),
        FrameFormat::GRAY => (packed_to_rgba(data, width, height, Packing::Gray)?, width, height),
    };

    Ok(Frame::new(rgba, width, height))
}

fn ensure_len(format: &'static str, got: usize, expected: usize) -> Result<(), FrameError> {
    if got < expected {
        return Err(FrameError::BufferTooSmall {
            format,
            got,
            expected,
        });
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let y_len = width as usize * height as usize;
    let uv_len = y_len / 2;
    ensure_len("NV12", data.len(), y_len + uv_len)?;

    let mut rgba = vec![0u8; y_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| FrameError::Conversion {
        format: "NV12",
        reason: format!("{err:?}"),
    })?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    ensure_len("YUYV", data.len(), width as usize * height as usize * 2)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| FrameError::Conversion {
        format: "YUYV",
        reason: format!("{err:?}"),
    })?;
    Ok(rgba)
}

/// MJPEG carries its own dimensions, which win over the negotiated ones.
fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder.decode().map_err(|err| FrameError::Conversion {
        format: "MJPEG",
        reason: format!("{err:?}"),
    })?;
    let info = decoder.info().ok_or(FrameError::Conversion {
        format: "MJPEG",
        reason: "decoder reported no image info".to_string(),
    })?;
    let (width, height) = (info.width as u32, info.height as u32);
    ensure_len("MJPEG", rgba.len(), width as usize * height as usize * 4)?;
    Ok((rgba, width, height))
}

#[derive(Clone, Copy)]
enum Packing {
    Rgb,
    Bgr,
    Gray,
}

fn packed_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    packing: Packing,
) -> Result<Vec<u8>, FrameError> {
    let (label, channels) = match packing {
        Packing::Rgb => ("RGB", 3),
        Packing::Bgr => ("BGR", 3),
        Packing::Gray => ("GRAY", 1),
    };
    let pixels = width as usize * height as usize;
    ensure_len(label, data.len(), pixels * channels)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            let [r, g, b] = match packing {
                Packing::Rgb => [src[0], src[1], src[2]],
                Packing::Bgr => [src[2], src[1], src[0]],
                Packing::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });
    Ok(rgba)
}

/// Bilinear scale of an RGBA image to `width`x`height`.
pub fn resize_rgba(image: ImageRef<'_>, width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let src = fir::images::Image::from_vec_u8(
        image.width,
        image.height,
        image.rgba.to_vec(),
        fir::PixelType::U8x4,
    )
    .map_err(|err| FrameError::Resize(err.to_string()))?;
    let mut dst = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .map_err(|err| FrameError::Resize(err.to_string()))?;
    Ok(dst.into_vec())
}

/// Flips an RGBA buffer left to right in place.
pub fn mirror_rgba(rgba: &mut [u8], width: u32) {
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    rgba.par_chunks_exact_mut(stride).for_each(|row| {
        let pixels = width as usize;
        for x in 0..pixels / 2 {
            let (a, b) = (x * 4, (pixels - 1 - x) * 4);
            for c in 0..4 {
                row.swap(a + c, b + c);
            }
        }
    });
}
