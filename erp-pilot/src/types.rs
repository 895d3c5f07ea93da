//! Common types shared by the matcher, the executor and the platform layer

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in virtual-screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Best match of a template on the screen.
///
/// `x`/`y` is the center of the matched region in screen coordinates and
/// `confidence` the zero-mean normalized correlation score in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
}

impl MatchResult {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Holds the screenshot data
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// Raw RGBA image data
    pub image_data: Vec<u8>,
    /// Width of the image
    pub width: u32,
    /// Height of the image
    pub height: u32,
    /// Position of the captured monitor's top-left corner on the virtual screen
    pub origin: Point,
}

impl ScreenshotResult {
    pub fn from_image(image: RgbaImage, origin: Point) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            image_data: image.into_raw(),
            origin,
        }
    }

    /// Returns `None` when the buffer does not match the declared dimensions.
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.image_data.clone())
    }
}

/// Opaque native window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

/// Keys the workflows need to press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Control,
    Alt,
    Space,
    Enter,
    Escape,
    /// An ASCII letter, case-insensitive
    Letter(char),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Control => write!(f, "ctrl"),
            Key::Alt => write!(f, "alt"),
            Key::Space => write!(f, "space"),
            Key::Enter => write!(f, "enter"),
            Key::Escape => write!(f, "esc"),
            Key::Letter(c) => write!(f, "{}", c.to_ascii_lowercase()),
        }
    }
}
