use std::path::{Path, PathBuf};

use partmarks::detection::glyphs;
use partmarks::{
    BoundingBox, CoordinateSource, ProviderError, RasterImage, RecognizedNumber, RecognizedSymbol,
    Symbol, SymbolSource, TextRegion,
};

/// Glyph scale used for diagram labels: 30x42 cells
pub const LABEL_SCALE: u32 = 6;
/// Horizontal gap between the digits of one label
pub const LABEL_GAP: u32 = 10;

/// White diagram with each label drawn at its top-left corner
pub fn diagram(width: u32, height: u32, labels: &[(&str, u32, u32)]) -> RasterImage {
    diagram_at_scale(width, height, labels, LABEL_SCALE)
}

pub fn diagram_at_scale(
    width: u32,
    height: u32,
    labels: &[(&str, u32, u32)],
    scale: u32,
) -> RasterImage {
    let mut page = glyphs::blank_page(width, height);
    for (text, x, y) in labels {
        glyphs::draw_text(&mut page, text, *x, *y, scale, LABEL_GAP);
    }
    RasterImage::new(page)
}

/// Write an image as PNG into `dir` and return its path
pub fn save_png(image: &RasterImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image
        .pixels()
        .save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}

pub fn symbol_at(c: char, x: u32, y: u32, size: u32) -> RecognizedSymbol {
    RecognizedSymbol {
        symbol: Symbol::from_char(c).expect("test symbol outside alphabet"),
        confidence: 0.9,
        bbox: BoundingBox::new(x, y, size, size * 7 / 5),
    }
}

pub fn number_at(text: &str, x: u32, y: u32) -> RecognizedNumber {
    RecognizedNumber {
        text: text.to_string(),
        bbox: BoundingBox::new(x, y, 20, 20),
        confidence: 0.95,
        members: Vec::new(),
        source: CoordinateSource::Measured,
    }
}

/// Provider answering every image with the same regions
pub struct StaticProvider {
    pub regions: Vec<TextRegion>,
}

impl SymbolSource for StaticProvider {
    fn recognize(&self, _image: &RasterImage) -> Result<Vec<TextRegion>, ProviderError> {
        Ok(self.regions.clone())
    }

    fn name(&self) -> &str {
        "Static"
    }
}

/// Provider that is never reachable
pub struct OfflineProvider;

impl SymbolSource for OfflineProvider {
    fn recognize(&self, _image: &RasterImage) -> Result<Vec<TextRegion>, ProviderError> {
        Err(ProviderError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "Remote OCR"
    }
}
