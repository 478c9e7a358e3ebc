use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::types::RenderedFrame;

/// Uploads a rendered surface as a GPUI image. The surface is straight-alpha
/// RGBA; GPUI wants BGRA.
pub(super) fn rendered_to_image(frame: &RenderedFrame) -> Option<Arc<RenderImage>> {
    let bgra = rgba_to_bgra(&frame.rgba);
    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    bgra
}
