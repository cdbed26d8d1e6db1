pub mod preprocessing;
pub mod components;
pub mod glyphs;
pub mod matcher;
pub mod source;

use std::sync::Arc;

use tracing::debug;

use crate::config::RecognitionConfig;
use crate::error::ProviderError;
use crate::models::{BinaryMask, Component, RasterImage, RecognizedSymbol};
use matcher::TemplateSet;
use source::{SymbolSource, TextRegion};

/// Everything the local recognizer produced for one image
#[derive(Debug, Clone)]
pub struct SymbolDetection {
    pub mask: BinaryMask,
    pub components: Vec<Component>,
    pub candidates: Vec<Component>,
    pub symbols: Vec<RecognizedSymbol>,
}

/// Local symbol recognizer: preprocessing, component extraction and template matching
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    config: RecognitionConfig,
    templates: Arc<TemplateSet>,
}

impl DetectionPipeline {
    pub fn new(config: RecognitionConfig) -> Self {
        let templates = Arc::new(TemplateSet::build(&config.matcher));
        Self { config, templates }
    }

    /// Reuse an already built template set
    pub fn with_templates(config: RecognitionConfig, templates: Arc<TemplateSet>) -> Self {
        Self { config, templates }
    }

    pub fn templates(&self) -> &Arc<TemplateSet> {
        &self.templates
    }

    /// Run stages 2-4 on an image
    pub fn detect(&self, img: &RasterImage) -> SymbolDetection {
        let mask = preprocessing::preprocess(img, &self.config.preprocess);
        let components = components::extract(&mask);
        let candidates = components::filter_digit_candidates(&components, &self.config.candidates);
        let symbols = match_candidates(&self.templates, &candidates, img);

        debug!(
            "Local detection: {} components, {} candidates, {} symbols",
            components.len(),
            candidates.len(),
            symbols.len()
        );

        SymbolDetection {
            mask,
            components,
            candidates,
            symbols,
        }
    }

    /// Get all components from an image (for debugging)
    pub fn get_components(&self, img: &RasterImage) -> Vec<Component> {
        let mask = preprocessing::preprocess(img, &self.config.preprocess);
        components::extract(&mask)
    }

    /// Get digit-shaped components from an image (for debugging)
    pub fn get_candidates(&self, img: &RasterImage) -> Vec<Component> {
        components::filter_digit_candidates(&self.get_components(img), &self.config.candidates)
    }
}

/// Classify each candidate; misses are dropped
pub fn match_candidates(
    templates: &TemplateSet,
    candidates: &[Component],
    img: &RasterImage,
) -> Vec<RecognizedSymbol> {
    candidates
        .iter()
        .filter_map(|c| templates.match_component(c, img))
        .collect()
}

impl SymbolSource for DetectionPipeline {
    fn recognize(&self, image: &RasterImage) -> Result<Vec<TextRegion>, ProviderError> {
        Ok(self
            .detect(image)
            .symbols
            .into_iter()
            .map(|s| TextRegion {
                text: s.symbol.to_string(),
                confidence: s.confidence,
                bbox: s.bbox,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Template Matching"
    }
}
