use crate::error::ProviderError;
use crate::models::{BoundingBox, RasterImage, RecognizedSymbol, Symbol};

/// Text found by a recognizer, in source-image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Anything that can find text regions in a diagram.
/// Grouping, validation and calibration treat every source alike.
pub trait SymbolSource: Send + Sync {
    fn recognize(&self, image: &RasterImage) -> Result<Vec<TextRegion>, ProviderError>;

    /// Human-readable name (used in logs and status notes)
    fn name(&self) -> &str;
}

/// Providers report either fractions or percentages
pub fn normalize_confidence(confidence: f32) -> f32 {
    if confidence > 1.0 {
        (confidence / 100.0).clamp(0.0, 1.0)
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Split regions into per-character symbols.
/// A multi-character region is divided evenly along x; characters outside
/// the alphabet are skipped but still take up their slice of the box.
/// Any region that leaves the `width` x `height` image, or carries a
/// non-finite confidence, rejects the whole response.
pub fn regions_to_symbols(
    regions: &[TextRegion],
    width: u32,
    height: u32,
) -> Result<Vec<RecognizedSymbol>, ProviderError> {
    let mut symbols = Vec::new();

    for region in regions {
        if !region.bbox.fits_within(width, height) {
            return Err(ProviderError::Malformed(format!(
                "region '{}' at {:?} lies outside the {}x{} image",
                region.text, region.bbox, width, height
            )));
        }
        if !region.confidence.is_finite() {
            return Err(ProviderError::Malformed(format!(
                "region '{}' has confidence {}",
                region.text, region.confidence
            )));
        }

        let chars: Vec<char> = region.text.trim().chars().collect();
        if chars.is_empty() {
            continue;
        }

        let confidence = normalize_confidence(region.confidence);
        let slice = if region.bbox.width > 0 {
            (region.bbox.width / chars.len() as u32).max(1)
        } else {
            0
        };

        for (i, c) in chars.iter().enumerate() {
            let Some(symbol) = Symbol::from_char(*c) else {
                continue;
            };
            symbols.push(RecognizedSymbol {
                symbol,
                confidence,
                bbox: BoundingBox::new(
                    region.bbox.x.saturating_add((i as u32).saturating_mul(slice)),
                    region.bbox.y,
                    slice,
                    region.bbox.height,
                ),
            });
        }
    }

    Ok(symbols)
}
