use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::calibration;
use crate::config::RecognitionConfig;
use crate::detection::matcher::{normalize_glyph, TemplateSet};
use crate::detection::source::{regions_to_symbols, SymbolSource};
use crate::detection::{components, match_candidates, preprocessing};
use crate::error::MarkerError;
use crate::grouping;
use crate::models::{PartMarker, RasterImage, RecognizedNumber, RecognizedSymbol};

/// Progress of one run. States only move forward; `Failed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Loaded,
    Preprocessed,
    ComponentsExtracted,
    SymbolsRecognized,
    NumbersGrouped,
    Validated,
    Done,
    Failed(String),
}

impl PipelineState {
    fn rank(&self) -> u8 {
        match self {
            PipelineState::Loaded => 0,
            PipelineState::Preprocessed => 1,
            PipelineState::ComponentsExtracted => 2,
            PipelineState::SymbolsRecognized => 3,
            PipelineState::NumbersGrouped => 4,
            PipelineState::Validated => 5,
            PipelineState::Done => 6,
            PipelineState::Failed(_) => 7,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context shared by all stages of a run
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    /// Save images to `NN_<step>/MM.png` when debug mode is on
    fn save_debug_images(
        &self,
        step_index: usize,
        step_name: &str,
        images: &[DynamicImage],
    ) -> Result<(), String> {
        let Some(debug_config) = &self.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let step_dir_name =
            format!("{:02}_{}", step_index, step_name.to_lowercase().replace(' ', "_"));
        let step_dir = debug_config.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir).map_err(|e| e.to_string())?;

        for (idx, img) in images.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            img.save(&output_path).map_err(|e| {
                format!("failed to save debug image {}: {}", output_path.display(), e)
            })?;
        }

        debug!("Debug: saved {} images to {}/", images.len(), step_dir_name);
        Ok(())
    }
}

/// Records state transitions of a single run
struct RunTracker {
    states: Vec<PipelineState>,
    width: u32,
    height: u32,
}

impl RunTracker {
    fn new(width: u32, height: u32) -> Self {
        Self {
            states: vec![PipelineState::Loaded],
            width,
            height,
        }
    }

    fn current(&self) -> &PipelineState {
        // states always holds at least `Loaded`
        &self.states[self.states.len() - 1]
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            next.rank() > self.current().rank(),
            "pipeline cannot move from {} back to {}",
            self.current(),
            next
        );
        debug!("Pipeline: {} -> {}", self.current(), next);
        self.states.push(next);
    }

    fn fail(&mut self, stage: &'static str, reason: impl Into<String>) -> MarkerError {
        let reason = reason.into();
        warn!(
            "Pipeline failed in {} after {} ({}x{}): {}",
            stage,
            self.current(),
            self.width,
            self.height,
            reason
        );
        self.states.push(PipelineState::Failed(reason.clone()));
        MarkerError::Processing {
            stage,
            width: self.width,
            height: self.height,
            reason,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub dimensions: (u32, u32),
    /// Ordered result contract for downstream renderers
    pub markers: Vec<PartMarker>,
    pub numbers: Vec<RecognizedNumber>,
    /// Validated numbers at their recognized positions, before calibration
    pub measured: Vec<RecognizedNumber>,
    pub symbols: Vec<RecognizedSymbol>,
    pub component_count: usize,
    pub candidate_count: usize,
    /// Whether the calibration layout replaced recognized coordinates
    pub calibrated: bool,
    /// Name of the symbol source that produced `symbols`
    pub source: String,
    /// Recoverable problems, e.g. a provider that could not be reached
    pub notes: Vec<String>,
    pub states: Vec<PipelineState>,
}

impl PipelineReport {
    /// Shift every marker so the one with `id` starts at (`x`, `y`).
    /// Returns false, leaving the report untouched, when `id` was not found.
    pub fn apply_anchor(&mut self, id: &str, x: u32, y: u32) -> bool {
        let Some((dx, dy)) = calibration::anchor_offset(&self.numbers, id, x, y) else {
            return false;
        };
        info!("Anchoring {} at ({}, {}): offset ({}, {})", id, x, y, dx, dy);
        self.numbers = calibration::translate(&self.numbers, dx, dy, self.dimensions);
        self.markers = self.numbers.iter().map(PartMarker::from).collect();
        self.notes.push(format!("positions shifted by ({}, {}) to anchor {}", dx, dy, id));
        true
    }
}

/// Part-marker recognition pipeline.
///
/// Stages run in a fixed order, each producing new data from the previous
/// one. An optional external provider can stand in for local symbol
/// recognition; if it fails, the run falls back to template matching.
pub struct Pipeline {
    config: RecognitionConfig,
    templates: Arc<TemplateSet>,
    provider: Option<Arc<dyn SymbolSource>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a pipeline with default settings
    pub fn new() -> Self {
        Self::with_config(RecognitionConfig::default())
    }

    pub fn with_config(config: RecognitionConfig) -> Self {
        let templates = Arc::new(TemplateSet::build(&config.matcher));
        Self {
            config,
            templates,
            provider: None,
            context: PipelineContext::default(),
        }
    }

    /// Use an external text-recognition provider before local matching
    pub fn with_provider(mut self, provider: Arc<dyn SymbolSource>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self, MarkerError> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(MarkerError::Config(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn templates(&self) -> &Arc<TemplateSet> {
        &self.templates
    }

    /// Recognize part markers in one diagram
    pub fn run(&self, image: &RasterImage) -> Result<PipelineReport, MarkerError> {
        let (width, height) = image.dimensions();
        if image.is_empty() {
            return Err(MarkerError::EmptyImage { width, height });
        }

        info!("Processing {}x{} diagram", width, height);
        let mut tracker = RunTracker::new(width, height);
        let mut notes = Vec::new();

        self.context
            .save_debug_images(0, "input", &[DynamicImage::ImageRgba8(image.pixels().clone())])
            .map_err(|e| tracker.fail("load", e))?;

        let provided = self.provider.as_ref().and_then(|provider| {
            let recognized = provider.recognize(image).and_then(|regions| {
                info!("{} returned {} text regions", provider.name(), regions.len());
                regions_to_symbols(&regions, width, height)
            });
            match recognized {
                Ok(symbols) => Some((provider.name().to_string(), symbols)),
                Err(e) => {
                    warn!("{} failed, falling back to template matching: {}", provider.name(), e);
                    notes.push(format!(
                        "{} unavailable ({}); used local template matching",
                        provider.name(),
                        e
                    ));
                    None
                }
            }
        });

        let (source, symbols, component_count, candidate_count) = match provided {
            Some((name, symbols)) => (name, symbols, 0, 0),
            None => {
                let (symbols, component_count, candidate_count) =
                    self.recognize_locally(image, &mut tracker)?;
                ("Template Matching".to_string(), symbols, component_count, candidate_count)
            }
        };
        tracker.advance(PipelineState::SymbolsRecognized);
        debug!("{} symbols from {}", symbols.len(), source);

        let grouped = grouping::group(&symbols, &self.config.grouping);
        tracker.advance(PipelineState::NumbersGrouped);

        let validated = calibration::validate(&grouped, &self.config.validation);
        tracker.advance(PipelineState::Validated);

        let calibrated = calibration::is_degenerate(
            &validated,
            width,
            height,
            self.config.calibration.degenerate_ratio,
        );
        let numbers = calibration::calibrate(&validated, (width, height), &self.config.calibration);
        if calibrated {
            notes.push(
                "recognized coordinates were degenerate; positions taken from calibration layout"
                    .to_string(),
            );
        }
        tracker.advance(PipelineState::Done);

        let markers: Vec<PartMarker> = numbers.iter().map(PartMarker::from).collect();
        info!(
            "Recognized {} markers from {} symbols ({} grouped numbers)",
            markers.len(),
            symbols.len(),
            grouped.len()
        );

        Ok(PipelineReport {
            dimensions: (width, height),
            markers,
            numbers,
            measured: validated,
            symbols,
            component_count,
            candidate_count,
            calibrated,
            source,
            notes,
            states: tracker.states,
        })
    }

    /// Stages 2-4 with state tracking and debug output
    fn recognize_locally(
        &self,
        image: &RasterImage,
        tracker: &mut RunTracker,
    ) -> Result<(Vec<RecognizedSymbol>, usize, usize), MarkerError> {
        let (width, height) = image.dimensions();

        let mask = preprocessing::preprocess(image, &self.config.preprocess);
        if mask.dimensions() != (width, height) {
            return Err(tracker.fail(
                "preprocess",
                format!("mask is {}x{}", mask.width(), mask.height()),
            ));
        }
        tracker.advance(PipelineState::Preprocessed);
        self.context
            .save_debug_images(
                1,
                "preprocess",
                &[DynamicImage::ImageLuma8(mask.as_image().clone())],
            )
            .map_err(|e| tracker.fail("preprocess", e))?;

        let all_components = components::extract(&mask);
        if let Some(outside) = all_components.iter().find(|c| !c.bbox.fits_within(width, height)) {
            return Err(tracker.fail(
                "extract",
                format!("component {} lies outside the image: {:?}", outside.label, outside.bbox),
            ));
        }
        let candidates =
            components::filter_digit_candidates(&all_components, &self.config.candidates);
        tracker.advance(PipelineState::ComponentsExtracted);
        debug!(
            "Found {} digit candidates (from {} components)",
            candidates.len(),
            all_components.len()
        );

        if self.context.debug.is_some() {
            let matcher = self.templates.config();
            let crops: Vec<RasterImage> = candidates
                .iter()
                .map(|c| RasterImage::new(image.crop(&c.bbox)))
                .collect();
            let raw: Vec<DynamicImage> = crops
                .iter()
                .map(|c| DynamicImage::ImageRgba8(c.pixels().clone()))
                .collect();
            let normalized: Vec<DynamicImage> = crops
                .iter()
                .map(|c| {
                    DynamicImage::ImageRgba8(normalize_glyph(
                        c.pixels(),
                        matcher.template_width,
                        matcher.template_height,
                    ))
                })
                .collect();
            self.context
                .save_debug_images(2, "components", &raw)
                .map_err(|e| tracker.fail("extract", e))?;
            self.context
                .save_debug_images(3, "templates", &normalized)
                .map_err(|e| tracker.fail("match", e))?;
        }

        let symbols = match_candidates(&self.templates, &candidates, image);
        Ok((symbols, all_components.len(), candidates.len()))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
