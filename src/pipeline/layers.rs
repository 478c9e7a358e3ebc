//! Ordered draw layers. A plan is executed front to back, so later layers
//! occlude earlier ones.

use super::surface::{DrawingSurface, ImageRef, Rect, Stroke};
use crate::types::{Color, Landmark};

/// Connectors with an endpoint below this visibility are not drawn.
pub const CONNECTOR_VISIBILITY_MIN: f32 = 0.1;

pub type Endpoints<'a> = (Option<&'a Landmark>, Option<&'a Landmark>);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarkerRadius {
    Fixed(f32),
    /// Interpolated from the landmark depth, closer points draw larger.
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerStyle {
    pub fill: Color,
    pub outline: Stroke,
    pub radius: MarkerRadius,
    pub visibility_min: f32,
}

#[derive(Debug)]
pub enum Layer<'a> {
    Image {
        image: ImageRef<'a>,
    },
    Connectors {
        name: &'static str,
        segments: Vec<Endpoints<'a>>,
        stroke: Stroke,
    },
    Markers {
        name: &'static str,
        points: Vec<Option<&'a Landmark>>,
        style: MarkerStyle,
    },
}

impl Layer<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Image { .. } => "image",
            Layer::Connectors { name, .. } | Layer::Markers { name, .. } => *name,
        }
    }
}

#[derive(Debug, Default)]
pub struct LayerPlan<'a> {
    /// Present the whole plan as a mirror view.
    pub mirrored: bool,
    pub layers: Vec<Layer<'a>>,
}

impl<'a> LayerPlan<'a> {
    pub fn push(&mut self, layer: Layer<'a>) {
        self.layers.push(layer);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(Layer::name).collect()
    }
}

/// Both endpoints, if the connector between them may be drawn.
pub fn drawable<'a>(
    from: Option<&'a Landmark>,
    to: Option<&'a Landmark>,
) -> Option<(&'a Landmark, &'a Landmark)> {
    let (from, to) = (from?, to?);
    let hidden = |p: &Landmark| p.visibility.is_some_and(|v| v < CONNECTOR_VISIBILITY_MIN);
    if hidden(from) || hidden(to) {
        return None;
    }
    Some((from, to))
}

/// Linear map of `x` from `[x0, x1]` onto `[y0, y1]`, clamped to the output range.
pub fn lerp(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    let t = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
    y0 + (y1 - y0) * t
}

pub fn depth_radius(z: f32) -> f32 {
    lerp(z, -0.15, 0.1, 10.0, 1.0)
}

fn to_pixels(p: &Landmark, width: f32, height: f32) -> (f32, f32) {
    (p.x * width, p.y * height)
}

pub fn paint_plan<S: DrawingSurface + ?Sized>(surface: &mut S, plan: &LayerPlan<'_>) {
    let width = surface.width() as f32;
    let height = surface.height() as f32;
    let full = Rect::from_size(surface.width(), surface.height());

    surface.save();
    if plan.mirrored {
        surface.translate(width, 0.0);
        surface.scale(-1.0, 1.0);
    }

    for layer in &plan.layers {
        match layer {
            Layer::Image { image } => {
                surface.draw_image(*image, full);
            }
            Layer::Connectors {
                segments, stroke, ..
            } => {
                for &(from, to) in segments {
                    if let Some((from, to)) = drawable(from, to) {
                        surface.stroke_line(
                            to_pixels(from, width, height),
                            to_pixels(to, width, height),
                            *stroke,
                        );
                    }
                }
            }
            Layer::Markers { points, style, .. } => {
                for point in points.iter().flatten() {
                    if point.visibility.is_some_and(|v| v < style.visibility_min) {
                        continue;
                    }
                    let radius = match style.radius {
                        MarkerRadius::Fixed(r) => r,
                        MarkerRadius::Depth => depth_radius(point.z),
                    };
                    surface.draw_circle(
                        to_pixels(point, width, height),
                        radius,
                        style.fill,
                        style.outline,
                    );
                }
            }
        }
    }

    surface.restore();
}
