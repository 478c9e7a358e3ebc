use super::surface::{CompositeMode, DrawingSurface, ImageRef, Rect};
use crate::types::{Color, SegmentationResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeOutcome {
    Composited,
    /// No mask came with the frame; the surface was left untouched.
    MissingMask,
}

/// Mattes the subject onto a solid background: the mask is painted first,
/// the frame is clipped to it, then the background fills what is left.
pub fn composite_mask<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    result: &SegmentationResult,
    background: Color,
) -> CompositeOutcome {
    let Some(mask) = &result.mask else {
        return CompositeOutcome::MissingMask;
    };

    let full = Rect::from_size(surface.width(), surface.height());
    // Only the mask's coverage matters for the next two passes.
    let background = Color { a: 255, ..background };

    surface.save();
    surface.clear();
    surface.draw_mask(mask, full);

    surface.set_composite(CompositeMode::SourceIn);
    surface.draw_image(
        ImageRef {
            rgba: &result.image.rgba,
            width: result.image.width,
            height: result.image.height,
        },
        full,
    );

    surface.set_composite(CompositeMode::DestinationAtop);
    surface.fill_rect(full, background);
    surface.restore();

    CompositeOutcome::Composited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::raster::RasterSurface;
    use crate::pipeline::recording::{DrawOp, RecordingSurface};
    use crate::types::{Frame, Mask};

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut rgba = Vec::new();
        for y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(&[(x * 20) as u8, (y * 30) as u8, 7, 255]);
            }
        }
        Frame::new(rgba, width, height)
    }

    fn composite(mask: Option<Mask>, frame: &Frame) -> (RasterSurface, CompositeOutcome) {
        let mut surface = RasterSurface::new(frame.width, frame.height);
        let result = SegmentationResult {
            image: frame.clone(),
            mask,
        };
        let outcome = composite_mask(&mut surface, &result, Color::BLUE);
        (surface, outcome)
    }

    #[test]
    fn opaque_mask_shows_the_frame_verbatim() {
        let frame = gradient_frame(6, 4);
        let (surface, outcome) = composite(Some(Mask::filled(6, 4, 255)), &frame);
        assert_eq!(outcome, CompositeOutcome::Composited);
        assert_eq!(surface.pixels(), frame.rgba.as_slice());
    }

    #[test]
    fn transparent_mask_shows_only_the_background() {
        let frame = gradient_frame(6, 4);
        let (surface, _) = composite(Some(Mask::filled(6, 4, 0)), &frame);
        assert!(
            surface
                .pixels()
                .chunks_exact(4)
                .all(|px| px == Color::BLUE.to_array())
        );
    }

    #[test]
    fn partial_mask_splits_subject_and_background() {
        let frame = gradient_frame(4, 1);
        let mask = Mask {
            alpha: vec![255, 255, 0, 0],
            width: 4,
            height: 1,
        };
        let (surface, _) = composite(Some(mask), &frame);
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 7, 255]));
        assert_eq!(surface.pixel(1, 0), Some([20, 0, 7, 255]));
        assert_eq!(surface.pixel(2, 0), Some(Color::BLUE.to_array()));
        assert_eq!(surface.pixel(3, 0), Some(Color::BLUE.to_array()));
    }

    #[test]
    fn output_is_fully_opaque_for_soft_masks() {
        let frame = gradient_frame(5, 5);
        let (surface, _) = composite(Some(Mask::filled(5, 5, 100)), &frame);
        assert!(surface.pixels().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn smaller_mask_is_scaled_to_the_surface() {
        let frame = gradient_frame(8, 8);
        let (surface, _) = composite(Some(Mask::filled(2, 2, 255)), &frame);
        for (got, want) in surface.pixels().iter().zip(&frame.rgba) {
            assert!(got.abs_diff(*want) <= 1, "{got} vs {want}");
        }
    }

    #[test]
    fn missing_mask_draws_nothing() {
        let frame = gradient_frame(3, 3);
        let mut surface = RecordingSurface::with_size(3, 3);
        let result = SegmentationResult {
            image: frame,
            mask: None,
        };
        assert_eq!(
            composite_mask(&mut surface, &result, Color::BLUE),
            CompositeOutcome::MissingMask
        );
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn paint_passes_run_in_matte_order() {
        let frame = gradient_frame(3, 3);
        let mut surface = RecordingSurface::with_size(3, 3);
        let result = SegmentationResult {
            image: frame,
            mask: Some(Mask::filled(1, 1, 255)),
        };
        composite_mask(&mut surface, &result, Color::BLUE);

        let full = Rect::from_size(3, 3);
        assert_eq!(
            surface.ops(),
            &[
                DrawOp::Save,
                DrawOp::Clear,
                DrawOp::Image {
                    width: 1,
                    height: 1,
                    dest: full
                },
                DrawOp::Composite(CompositeMode::SourceIn),
                DrawOp::Image {
                    width: 3,
                    height: 3,
                    dest: full
                },
                DrawOp::Composite(CompositeMode::DestinationAtop),
                DrawOp::FillRect {
                    rect: full,
                    color: Color::BLUE
                },
                DrawOp::Restore,
            ]
        );
    }
}
