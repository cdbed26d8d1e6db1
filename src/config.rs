//! Recognition settings
//!
//! Every tunable of the pipeline lives here so a diagram family can be
//! described in one TOML file. Defaults match high-contrast line-art
//! catalog diagrams.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationLayout;
use crate::error::MarkerError;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub preprocess: PreprocessConfig,
    pub candidates: CandidateFilter,
    pub matcher: MatcherConfig,
    pub grouping: GroupingConfig,
    pub validation: ValidationConfig,
    pub calibration: CalibrationConfig,
}

impl RecognitionConfig {
    /// Load settings from a TOML file; missing keys keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MarkerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, MarkerError> {
        let config: RecognitionConfig =
            toml::from_str(text).map_err(|e| MarkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, MarkerError> {
        toml::to_string_pretty(self).map_err(|e| MarkerError::Config(e.to_string()))
    }

    /// Reject settings that would make a stage meaningless
    pub fn validate(&self) -> Result<(), MarkerError> {
        let p = &self.preprocess;
        if !(0.0..1.0).contains(&p.low_percentile)
            || !(0.0..=1.0).contains(&p.high_percentile)
            || p.low_percentile >= p.high_percentile
        {
            return Err(MarkerError::Config(format!(
                "percentiles must satisfy 0 <= low < high <= 1 (got {} and {})",
                p.low_percentile, p.high_percentile
            )));
        }
        if p.window_divisor == 0 || self.matcher.glyph_window_divisor == 0 {
            return Err(MarkerError::Config("window divisors must be positive".into()));
        }
        if self.matcher.template_width == 0 || self.matcher.template_height == 0 {
            return Err(MarkerError::Config("template size must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.matcher.match_threshold) {
            return Err(MarkerError::Config(format!(
                "match threshold {} outside [0, 1]",
                self.matcher.match_threshold
            )));
        }
        let c = &self.calibration;
        if !(c.radial_step_degrees > 0.0 && c.radial_step_degrees <= 360.0) || c.radial_rings == 0 {
            return Err(MarkerError::Config(format!(
                "radial placement needs a step in (0, 360] and at least one ring (got {} and {})",
                c.radial_step_degrees, c.radial_rings
            )));
        }
        for (id, rect) in self.calibration.layout.entries() {
            if !rect.is_normalized() {
                return Err(MarkerError::Config(format!(
                    "layout entry '{}' is not expressed in [0, 1] fractions",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Diagram-scale binarization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub low_percentile: f32,
    pub high_percentile: f32,
    /// Smallest threshold window in pixels
    pub min_window: u32,
    /// Window is `min(width, height) / window_divisor` when that is larger
    pub window_divisor: u32,
    /// Pixels darker than `local mean - offset` become foreground
    pub threshold_offset: i32,
    /// Interior pixels with fewer foreground neighbours are cleared
    pub min_neighbors: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            low_percentile: 0.02,
            high_percentile: 0.98,
            min_window: 15,
            window_divisor: 20,
            threshold_offset: 10,
            min_neighbors: 3,
        }
    }
}

/// Shape heuristics that keep digit-like components. All bounds are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateFilter {
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_area: u32,
    pub max_area: u32,
    pub min_density: f32,
    pub max_density: f32,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            min_aspect: 0.8,
            max_aspect: 3.0,
            min_area: 50,
            max_area: 5000,
            min_density: 0.3,
            max_density: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub template_width: u32,
    pub template_height: u32,
    /// Minimum cosine similarity for a candidate to be accepted
    pub match_threshold: f32,
    pub glyph_min_window: u32,
    pub glyph_window_divisor: u32,
    pub glyph_threshold_offset: i32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            template_width: 40,
            template_height: 60,
            match_threshold: 0.72,
            glyph_min_window: 7,
            glyph_window_divisor: 2,
            glyph_threshold_offset: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Centre distance limit as a multiple of the larger box size
    pub distance_factor: f32,
    /// Vertical centre offset limit as a fraction of the taller box
    pub line_factor: f32,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            distance_factor: 1.2,
            line_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Identifiers printed on the diagram family
    pub expected_ids: Vec<String>,
    /// Confidence needed to accept a partial (substring/superstring) match
    pub partial_match_confidence: f32,
    /// Boxes whose tops differ by less than this share a text line
    pub line_tolerance: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_ids: CalibrationLayout::engine_front().ids(),
            partial_match_confidence: 0.85,
            line_tolerance: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Spread below this fraction of the image size on both axes is degenerate
    pub degenerate_ratio: f32,
    /// Confidence multiplier for numbers relocated by the fallback
    pub fallback_confidence_factor: f32,
    /// Radial placement radius as a fraction of `min(width, height)`
    pub radial_radius_ratio: f32,
    pub radial_step_degrees: f32,
    /// Concentric circles used in turn once the angles of one circle run out
    pub radial_rings: u32,
    /// Radius added per ring, as a fraction of the base radius
    pub radial_ring_step: f32,
    /// Radial box size as a fraction of each image dimension
    pub radial_box_ratio: f32,
    pub layout: CalibrationLayout,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            degenerate_ratio: 0.1,
            fallback_confidence_factor: 0.9,
            radial_radius_ratio: 0.3,
            radial_step_degrees: 15.0,
            radial_rings: 3,
            radial_ring_step: 0.25,
            radial_box_ratio: 0.05,
            layout: CalibrationLayout::engine_front(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_toml_round_trip() {
        let config = RecognitionConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(RecognitionConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = RecognitionConfig::from_toml("[matcher]\nmatch_threshold = 0.8\n").unwrap();
        assert_eq!(config.matcher.match_threshold, 0.8);
        assert_eq!(config.matcher.template_width, 40);
        assert_eq!(config.preprocess, PreprocessConfig::default());
    }

    #[test]
    fn inverted_percentiles_are_rejected() {
        let err = RecognitionConfig::from_toml(
            "[preprocess]\nlow_percentile = 0.9\nhigh_percentile = 0.1\n",
        )
        .unwrap_err();
        assert!(matches!(err, MarkerError::Config(_)));
    }
}
