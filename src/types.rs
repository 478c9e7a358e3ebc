use std::time::Instant;

use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Solid frame, mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        for px in rgba.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        Self::new(rgba, width, height)
    }
}

/// A normalized keypoint. `x`/`y` are fractions of the frame size, `z` is the
/// model's relative depth (smaller is closer to the camera).
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Fixed-slot landmark list. The slot index is the landmark's identity, so
/// removed points leave an empty slot instead of shifting the rest.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    slots: Vec<Option<Landmark>>,
}

impl LandmarkSet {
    pub fn from_points(points: impl IntoIterator<Item = Landmark>) -> Self {
        Self {
            slots: points.into_iter().map(Some).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Landmark> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, index: usize) -> Option<Landmark> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Landmark>> {
        self.slots.iter().map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Landmark> {
        self.slots.iter_mut().flatten()
    }
}

/// Per-pixel subject coverage, 0 is background and 255 is subject.
#[derive(Clone, Debug)]
pub struct Mask {
    pub alpha: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Mask {
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            alpha: vec![value; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Expands the coverage into an RGBA image whose alpha carries the mask.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.alpha.len() * 4);
        for &a in &self.alpha {
            rgba.extend_from_slice(&[255, 255, 255, a]);
        }
        rgba
    }
}

#[derive(Clone, Debug)]
pub struct HolisticResult {
    pub pose: Option<LandmarkSet>,
    pub left_hand: Option<LandmarkSet>,
    pub right_hand: Option<LandmarkSet>,
    pub face: Option<LandmarkSet>,
    pub image: Frame,
}

impl HolisticResult {
    pub fn empty(image: Frame) -> Self {
        Self {
            pose: None,
            left_hand: None,
            right_hand: None,
            face: None,
            image,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationResult {
    pub image: Frame,
    pub mask: Option<Mask>,
}

/// One inference cycle's output, handed to the controller for a single draw.
#[derive(Clone, Debug)]
pub enum InferenceResult {
    Holistic(HolisticResult),
    Segmentation(SegmentationResult),
}

/// The rendered drawing surface as handed to the presenter.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

/// 8-bit straight-alpha colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const ORANGE: Color = Color::rgb(255, 138, 0);
    pub const CYAN: Color = Color::rgb(0, 217, 231);
    pub const MESH_GRAY: Color = Color::rgba(0xC0, 0xC0, 0xC0, 0x70);
    pub const OUTLINE_GRAY: Color = Color::rgb(0xE0, 0xE0, 0xE0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parses `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().strip_prefix('#').unwrap_or(text.trim());
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => {
                let mut out = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let v = ch.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(Self::rgb(out[0], out[1], out[2]))
            }
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::from_hex(s).ok_or_else(|| format!("invalid colour {s:?}, expected #RRGGBB"))
    }
}
