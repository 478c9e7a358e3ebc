//! Draw-call recorder used to observe what the renderers emit.

use super::surface::{CompositeMode, DrawingSurface, ImageRef, Rect, Stroke, Transform};
use crate::types::Color;

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Resize {
        width: u32,
        height: u32,
    },
    Clear,
    Save,
    Restore,
    Translate(f32, f32),
    Scale(f32, f32),
    Composite(CompositeMode),
    Image {
        width: u32,
        height: u32,
        dest: Rect,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        stroke: Stroke,
    },
    Circle {
        center: (f32, f32),
        radius: f32,
        fill: Color,
        stroke: Stroke,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    transform: Transform,
    stack: Vec<Transform>,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn lines(&self) -> Vec<(&(f32, f32), &(f32, f32), &Stroke)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Line { from, to, stroke } => Some((from, to, stroke)),
                _ => None,
            })
            .collect()
    }

    pub fn circles(&self) -> Vec<(&(f32, f32), f32, &Color)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Circle {
                    center,
                    radius,
                    fill,
                    ..
                } => Some((center, *radius, fill)),
                _ => None,
            })
            .collect()
    }
}

impl DrawingSurface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.transform = Transform::default();
        self.stack.clear();
        self.ops.push(DrawOp::Resize { width, height });
    }

    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
        self.ops.push(DrawOp::Save);
    }

    fn restore(&mut self) {
        if let Some(t) = self.stack.pop() {
            self.transform = t;
        }
        self.ops.push(DrawOp::Restore);
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.transform.translate(dx, dy);
        self.ops.push(DrawOp::Translate(dx, dy));
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.transform.scale(sx, sy);
        self.ops.push(DrawOp::Scale(sx, sy));
    }

    fn set_composite(&mut self, mode: CompositeMode) {
        self.ops.push(DrawOp::Composite(mode));
    }

    fn draw_image(&mut self, image: ImageRef<'_>, dest: Rect) {
        self.ops.push(DrawOp::Image {
            width: image.width,
            height: image.height,
            dest,
        });
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), stroke: Stroke) {
        self.ops.push(DrawOp::Line { from, to, stroke });
    }

    fn draw_circle(&mut self, center: (f32, f32), radius: f32, fill: Color, stroke: Stroke) {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            fill,
            stroke,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }
}
