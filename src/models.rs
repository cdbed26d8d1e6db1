use std::fmt;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::MarkerError;

/// Axis-aligned box in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from inclusive pixel extents
    pub fn from_extent(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    /// Exclusive right edge, saturating at `u32::MAX`
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    /// Larger of width and height, used to scale proximity tests
    pub fn size(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Smallest box covering both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(x, y, right - x, bottom - y)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Shrink and shift the box so it lies inside a `width` x `height` image.
    /// Oversized boxes are cut down to the image size first.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let w = self.width.min(width);
        let h = self.height.min(height);
        let x = self.x.min(width - w);
        let y = self.y.min(height - h);
        BoundingBox::new(x, y, w, h)
    }
}

/// Decoded RGBA raster owned by one pipeline invocation
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn from_dynamic(img: DynamicImage) -> Self {
        Self::new(img.to_rgba8())
    }

    /// Wrap a raw row-major RGBA buffer, rejecting buffers of the wrong length
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, MarkerError> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        RgbaImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or(MarkerError::MalformedBuffer { expected, actual })
    }

    /// Load and decode an image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MarkerError> {
        let img = ImageReader::open(path.as_ref())?.decode()?;
        Ok(Self::from_dynamic(img))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// Copy a region out of the raster; the box is clamped to the image first
    pub fn crop(&self, bbox: &BoundingBox) -> RgbaImage {
        let b = bbox.clamp_to(self.width(), self.height());
        image::imageops::crop_imm(&self.pixels, b.x, b.y, b.width, b.height).to_image()
    }
}

/// Foreground/background mask with the dimensions of its source raster.
/// Foreground pixels are stored as 255, background as 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    pub const FOREGROUND: u8 = 255;
    pub const BACKGROUND: u8 = 0;

    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let image = GrayImage::from_fn(width, height, |x, y| {
            if f(x, y) {
                Luma([Self::FOREGROUND])
            } else {
                Luma([Self::BACKGROUND])
            }
        });
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] == Self::FOREGROUND
    }

    pub fn foreground_count(&self) -> usize {
        self.image
            .pixels()
            .filter(|p| p[0] == Self::FOREGROUND)
            .count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    /// Render as black ink on white paper
    pub fn to_raster(&self) -> RasterImage {
        let rgba = RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            if self.is_foreground(x, y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        RasterImage::new(rgba)
    }
}

/// Maximal 4-connected region of foreground pixels
#[derive(Debug, Clone)]
pub struct Component {
    pub label: u32,
    pub pixels: Vec<(u32, u32)>,
    pub bbox: BoundingBox,
}

impl Component {
    pub fn width(&self) -> u32 {
        self.bbox.width
    }

    pub fn height(&self) -> u32 {
        self.bbox.height
    }

    pub fn area(&self) -> u32 {
        self.pixels.len() as u32
    }

    /// Height over width; digits are taller than wide
    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        if w == 0.0 {
            return 0.0;
        }
        self.height() as f32 / w
    }

    /// Fraction of the bounding box covered by the component
    pub fn density(&self) -> f32 {
        let box_area = self.bbox.area() as f32;
        if box_area == 0.0 {
            return 0.0;
        }
        self.area() as f32 / box_area
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

/// A decimal digit, always in `0..=9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digit(u8);

impl Digit {
    pub fn new(value: u8) -> Option<Digit> {
        (value <= 9).then_some(Digit(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// One character of the fixed marker alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Digit(Digit),
    Minus,
}

impl Symbol {
    pub const ALL: [Symbol; 11] = [
        Symbol::Digit(Digit(0)),
        Symbol::Digit(Digit(1)),
        Symbol::Digit(Digit(2)),
        Symbol::Digit(Digit(3)),
        Symbol::Digit(Digit(4)),
        Symbol::Digit(Digit(5)),
        Symbol::Digit(Digit(6)),
        Symbol::Digit(Digit(7)),
        Symbol::Digit(Digit(8)),
        Symbol::Digit(Digit(9)),
        Symbol::Minus,
    ];

    /// `None` unless `value` is a single decimal digit
    pub fn digit(value: u8) -> Option<Symbol> {
        Digit::new(value).map(Symbol::Digit)
    }

    pub fn from_char(c: char) -> Option<Symbol> {
        match c {
            '-' => Some(Symbol::Minus),
            _ => c.to_digit(10).and_then(|d| Symbol::digit(d as u8)),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Symbol::Digit(d) => char::from(b'0' + d.value()),
            Symbol::Minus => '-',
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A candidate accepted by a single template comparison
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSymbol {
    pub symbol: Symbol,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Where a number's box came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSource {
    /// Measured from the image (or reported by a provider)
    Measured,
    /// Looked up in the calibration layout
    Layout,
    /// Deterministic placement around the image centre
    Radial,
}

/// Adjacent symbols merged into one printed number
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedNumber {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub members: Vec<RecognizedSymbol>,
    pub source: CoordinateSource,
}

/// Result entry handed to downstream renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartMarker {
    pub id: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub source: CoordinateSource,
}

impl From<&RecognizedNumber> for PartMarker {
    fn from(number: &RecognizedNumber) -> Self {
        Self {
            id: number.text.clone(),
            bbox: number.bbox,
            confidence: number.confidence,
            source: number.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_box_inside_image() {
        let b = BoundingBox::new(90, 95, 20, 20).clamp_to(100, 100);
        assert_eq!(b, BoundingBox::new(80, 80, 20, 20));

        let oversized = BoundingBox::new(0, 0, 500, 10).clamp_to(100, 100);
        assert_eq!(oversized, BoundingBox::new(0, 0, 100, 10));
    }

    #[test]
    fn union_covers_both_boxes() {
        let a = BoundingBox::new(10, 10, 5, 5);
        let b = BoundingBox::new(20, 8, 4, 10);
        assert_eq!(a.union(&b), BoundingBox::new(10, 8, 14, 10));
    }

    #[test]
    fn symbols_round_trip_through_chars() {
        for symbol in Symbol::ALL {
            assert_eq!(Symbol::from_char(symbol.as_char()), Some(symbol));
        }
        assert_eq!(Symbol::from_char('x'), None);
    }

    #[test]
    fn digits_outside_zero_to_nine_are_rejected() {
        assert_eq!(Symbol::digit(9).map(|s| s.as_char()), Some('9'));
        assert_eq!(Symbol::digit(10), None);
        assert_eq!(Symbol::digit(12), None);
        assert_eq!(Digit::new(255), None);
    }

    #[test]
    fn edges_saturate_near_the_coordinate_limit() {
        let far = BoundingBox::new(u32::MAX - 10, u32::MAX - 5, 40, 20);
        assert_eq!(far.right(), u32::MAX);
        assert_eq!(far.bottom(), u32::MAX);
        assert!(!far.fits_within(800, 600));

        let near = BoundingBox::new(0, 0, 10, 10);
        assert_eq!(near.union(&far), BoundingBox::new(0, 0, u32::MAX, u32::MAX));
    }

    #[test]
    fn raw_buffer_length_is_checked() {
        let err = RasterImage::from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, MarkerError::MalformedBuffer { expected: 16, actual: 15 }));
    }
}
