use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::types::{Color, Mask};

/// Porter-Duff rule applied to every pixel a paint call touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositeMode {
    #[default]
    SourceOver,
    /// Paint only where the destination is already opaque.
    SourceIn,
    /// Paint only where the destination is still transparent, keeping the
    /// destination on top elsewhere.
    DestinationAtop,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

impl Stroke {
    pub const fn new(color: Color, width: f32) -> Self {
        Self { color, width }
    }
}

/// Axis-aligned affine transform; enough for translate/scale and mirroring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            sx: 1.0,
            sy: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }
}

impl Transform {
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.tx += self.sx * dx;
        self.ty += self.sy * dy;
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.sx *= sx;
        self.sy *= sy;
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.sx * x + self.tx, self.sy * y + self.ty)
    }
}

/// Borrowed RGBA pixels handed to `draw_image`.
#[derive(Clone, Copy, Debug)]
pub struct ImageRef<'a> {
    pub rgba: &'a [u8],
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: width as f32,
            h: height as f32,
        }
    }
}

/// A 2D paint target with canvas-like state: a transform stack and a
/// composite mode. Resizing discards both the pixels and the paint state.
pub trait DrawingSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, dx: f32, dy: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn set_composite(&mut self, mode: CompositeMode);
    fn draw_image(&mut self, image: ImageRef<'_>, dest: Rect);

    /// Paints a coverage mask as white, carrying the mask in the alpha channel.
    fn draw_mask(&mut self, mask: &Mask, dest: Rect) {
        let rgba = mask.to_rgba();
        self.draw_image(
            ImageRef {
                rgba: &rgba,
                width: mask.width,
                height: mask.height,
            },
            dest,
        );
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), stroke: Stroke);
    fn draw_circle(&mut self, center: (f32, f32), radius: f32, fill: Color, stroke: Stroke);
    fn fill_rect(&mut self, rect: Rect, color: Color);
}

/// Live video dimensions published by the frame source. Zero means the source
/// has not delivered a frame yet.
#[derive(Clone, Debug, Default)]
pub struct FrameDimensions(Arc<AtomicU64>);

impl FrameDimensions {
    pub fn set(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.0.store(packed, Ordering::Release);
    }

    pub fn get(&self) -> (u32, u32) {
        let packed = self.0.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Resized { width: u32, height: u32 },
    NotReady,
}

/// Matches the surface to the current video size. Must run before any paint
/// call of a frame since a resize wipes the surface.
pub fn sync_surface<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    dimensions: &FrameDimensions,
) -> SyncOutcome {
    let (width, height) = dimensions.get();
    if width == 0 || height == 0 {
        return SyncOutcome::NotReady;
    }
    if surface.width() == width && surface.height() == height {
        return SyncOutcome::Unchanged;
    }

    log::debug!(
        "resizing surface {}x{} -> {width}x{height}",
        surface.width(),
        surface.height()
    );
    surface.resize(width, height);
    SyncOutcome::Resized { width, height }
}
