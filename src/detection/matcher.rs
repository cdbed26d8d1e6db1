use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::config::MatcherConfig;
use crate::detection::glyphs;
use crate::detection::preprocessing::{adaptive_threshold, threshold_window, to_grayscale};
use crate::models::{BinaryMask, Component, RasterImage, RecognizedSymbol, Symbol};

/// Reference feature vector for one symbol
#[derive(Debug, Clone)]
pub struct DigitTemplate {
    pub symbol: Symbol,
    pub features: Vec<f32>,
}

/// The eleven symbol templates, built once and shared read-only
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: Vec<DigitTemplate>,
    config: MatcherConfig,
}

impl TemplateSet {
    /// Render every symbol centred in the template canvas and extract its features
    pub fn build(config: &MatcherConfig) -> Self {
        let scale = glyphs::fitting_scale(config.template_width, config.template_height);
        let templates = Symbol::ALL
            .iter()
            .map(|&symbol| {
                let cell = glyphs::render_glyph(symbol, scale);
                let ink = glyphs::ink_bounds(symbol, scale);
                let crop =
                    imageops::crop_imm(&cell, ink.x, ink.y, ink.width, ink.height).to_image();
                let features = extract_features(&crop, config);
                DigitTemplate { symbol, features }
            })
            .collect();

        debug!(
            "Built {} templates at {}x{} (glyph scale {})",
            Symbol::ALL.len(),
            config.template_width,
            config.template_height,
            scale
        );

        Self {
            templates,
            config: config.clone(),
        }
    }

    pub fn templates(&self) -> &[DigitTemplate] {
        &self.templates
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Highest-scoring symbol for a feature vector, accepted or not
    pub fn best_match(&self, features: &[f32]) -> Option<(Symbol, f32)> {
        self.templates
            .iter()
            .map(|t| (t.symbol, cosine_similarity(features, &t.features)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Classify a glyph crop; `None` when the best score misses the threshold
    pub fn classify(&self, crop: &RgbaImage) -> Option<(Symbol, f32)> {
        let features = extract_features(crop, &self.config);
        let (symbol, score) = self.best_match(&features)?;
        if score > self.config.match_threshold {
            Some((symbol, score.clamp(0.0, 1.0)))
        } else {
            None
        }
    }

    /// Crop a component from the source raster and classify it
    pub fn match_component(
        &self,
        component: &Component,
        source: &RasterImage,
    ) -> Option<RecognizedSymbol> {
        if !component.bbox.fits_within(source.width(), source.height()) {
            return None;
        }
        let crop = source.crop(&component.bbox);
        self.classify(&crop).map(|(symbol, confidence)| RecognizedSymbol {
            symbol,
            confidence,
            bbox: component.bbox,
        })
    }
}

/// Fit a crop into the template canvas, keeping its proportions, centred on white
pub fn normalize_glyph(crop: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let (cw, ch) = crop.dimensions();
    if cw == 0 || ch == 0 {
        return canvas;
    }

    let scale = (width as f32 / cw as f32).min(height as f32 / ch as f32);
    let scaled_w = ((cw as f32 * scale).round() as u32).clamp(1, width);
    let scaled_h = ((ch as f32 * scale).round() as u32).clamp(1, height);

    let scaled = if (scaled_w, scaled_h) == (cw, ch) {
        crop.clone()
    } else {
        imageops::resize(crop, scaled_w, scaled_h, FilterType::Triangle)
    };

    let offset_x = (width - scaled_w) / 2;
    let offset_y = (height - scaled_h) / 2;
    imageops::overlay(&mut canvas, &scaled, offset_x.into(), offset_y.into());
    canvas
}

/// Glyph-scale grayscale and adaptive threshold on a normalised crop
pub fn binarize_glyph(normalized: &RgbaImage, config: &MatcherConfig) -> BinaryMask {
    let gray = to_grayscale(normalized);
    let window = threshold_window(
        gray.width(),
        gray.height(),
        config.glyph_min_window,
        config.glyph_window_divisor,
    );
    adaptive_threshold(&gray, window, config.glyph_threshold_offset)
}

/// Foreground pixels as a unit-length vector; all zeros for an empty mask
pub fn feature_vector(mask: &BinaryMask) -> Vec<f32> {
    let mut features: Vec<f32> = mask
        .as_image()
        .pixels()
        .map(|p| if p[0] == BinaryMask::FOREGROUND { 1.0 } else { 0.0 })
        .collect();

    let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in features.iter_mut() {
            *v /= norm;
        }
    }
    features
}

/// Full feature path shared by templates and candidates
pub fn extract_features(crop: &RgbaImage, config: &MatcherConfig) -> Vec<f32> {
    let normalized = normalize_glyph(crop, config.template_width, config.template_height);
    let mask = binarize_glyph(&normalized, config);
    feature_vector(&mask)
}

/// Dot product of two unit vectors; 0 when lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
