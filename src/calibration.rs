//! Validation of recognized numbers and correction of untrustworthy coordinates.
//!
//! Upstream sources sometimes return boxes collapsed onto a single point.
//! When every number sits inside a tiny fraction of the diagram, positions
//! are taken from a resolution-independent layout of the diagram family
//! instead of from the recognizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{CalibrationConfig, ValidationConfig};
use crate::models::{BoundingBox, CoordinateSource, RecognizedNumber};

/// Rectangle expressed as fractions of the diagram's width and height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_normalized(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let (w, h) = (width as f64, height as f64);
        PixelRect {
            x: self.x * w,
            y: self.y * h,
            width: self.width * w,
            height: self.height * h,
        }
    }
}

/// Rectangle in (fractional) pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn to_normalized(&self, width: u32, height: u32) -> NormalizedRect {
        let (w, h) = (width as f64, height as f64);
        NormalizedRect {
            x: self.x / w,
            y: self.y / h,
            width: self.width / w,
            height: self.height / h,
        }
    }

    /// Round to whole pixels (at least 1x1) inside a `width` x `height` image
    pub fn to_bounding_box(&self, width: u32, height: u32) -> BoundingBox {
        let w = (self.width.round().max(1.0) as u32).min(width);
        let h = (self.height.round().max(1.0) as u32).min(height);
        let x = self.x.round().max(0.0) as u32;
        let y = self.y.round().max(0.0) as u32;
        BoundingBox::new(x, y, w, h).clamp_to(width, height)
    }
}

/// Expected marker positions for one diagram family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationLayout {
    entries: BTreeMap<String, NormalizedRect>,
}

impl CalibrationLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Front view of a four-cylinder engine assembly
    pub fn engine_front() -> Self {
        let table: [(&str, [f64; 4]); 24] = [
            // Cylinder block
            ("16", [0.40, 0.35, 0.15, 0.20]),
            ("17", [0.42, 0.25, 0.10, 0.15]),
            ("15", [0.38, 0.30, 0.08, 0.10]),
            // Cooling
            ("24", [0.15, 0.10, 0.08, 0.08]),
            ("25", [0.20, 0.20, 0.08, 0.08]),
            ("26", [0.25, 0.25, 0.07, 0.07]),
            // Turbo
            ("12", [0.65, 0.25, 0.10, 0.10]),
            ("11", [0.60, 0.30, 0.08, 0.08]),
            ("10", [0.55, 0.15, 0.09, 0.09]),
            ("3", [0.53, 0.13, 0.06, 0.06]),
            // Timing
            ("23", [0.25, 0.45, 0.08, 0.06]),
            ("14", [0.20, 0.40, 0.07, 0.07]),
            ("13", [0.30, 0.35, 0.07, 0.07]),
            ("18", [0.22, 0.48, 0.08, 0.06]),
            // Mounting and lubrication
            ("21", [0.20, 0.65, 0.07, 0.07]),
            ("22", [0.25, 0.70, 0.07, 0.07]),
            ("19", [0.45, 0.60, 0.08, 0.08]),
            ("20", [0.50, 0.65, 0.06, 0.06]),
            // Small parts
            ("0", [0.05, 0.05, 0.05, 0.05]),
            ("2", [0.10, 0.08, 0.05, 0.05]),
            ("5", [0.35, 0.40, 0.05, 0.05]),
            ("8", [0.45, 0.15, 0.05, 0.05]),
            ("9", [0.50, 0.12, 0.05, 0.05]),
            ("-6", [0.03, 0.75, 0.06, 0.05]),
        ];

        let entries = table
            .iter()
            .map(|(id, [x, y, w, h])| (id.to_string(), NormalizedRect::new(*x, *y, *w, *h)))
            .collect();
        Self { entries }
    }

    /// Add or replace an entry; rejects rectangles outside `[0, 1]`
    pub fn insert(&mut self, id: impl Into<String>, rect: NormalizedRect) -> bool {
        if !rect.is_normalized() {
            return false;
        }
        self.entries.insert(id.into(), rect);
        true
    }

    pub fn get(&self, id: &str) -> Option<&NormalizedRect> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &NormalizedRect)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a number's text is acceptable for the expected identifier set.
/// An empty set accepts everything.
pub fn is_expected(number: &RecognizedNumber, config: &ValidationConfig) -> bool {
    if config.expected_ids.is_empty() {
        return true;
    }
    if config.expected_ids.iter().any(|id| *id == number.text) {
        return true;
    }

    let partial = config
        .expected_ids
        .iter()
        .any(|id| id.contains(number.text.as_str()) || number.text.contains(id.as_str()));
    partial && number.confidence > config.partial_match_confidence
}

/// Sort top to bottom by line, then left to right within a line.
/// A line starts at its topmost box and takes every box starting less than
/// `tolerance` pixels below it.
pub fn sort_reading_order(numbers: &mut Vec<RecognizedNumber>, tolerance: u32) {
    numbers.sort_by(|a, b| a.bbox.y.cmp(&b.bbox.y).then(a.bbox.x.cmp(&b.bbox.x)));

    let mut sorted = Vec::with_capacity(numbers.len());
    let mut line: Vec<RecognizedNumber> = Vec::new();
    let mut line_top = 0u32;

    for number in numbers.drain(..) {
        if !line.is_empty() && number.bbox.y - line_top >= tolerance {
            line.sort_by_key(|n| n.bbox.x);
            sorted.append(&mut line);
        }
        if line.is_empty() {
            line_top = number.bbox.y;
        }
        line.push(number);
    }
    line.sort_by_key(|n| n.bbox.x);
    sorted.append(&mut line);

    *numbers = sorted;
}

/// Drop unexpected numbers and order the rest for reading
pub fn validate(numbers: &[RecognizedNumber], config: &ValidationConfig) -> Vec<RecognizedNumber> {
    let mut kept: Vec<RecognizedNumber> = numbers
        .iter()
        .filter(|n| is_expected(n, config))
        .cloned()
        .collect();

    debug!("Validation kept {} of {} numbers", kept.len(), numbers.len());
    sort_reading_order(&mut kept, config.line_tolerance);
    kept
}

/// Range of box centres along x and y
pub fn coordinate_spread(numbers: &[RecognizedNumber]) -> (f32, f32) {
    let mut min = (f32::MAX, f32::MAX);
    let mut max = (f32::MIN, f32::MIN);
    for n in numbers {
        let (cx, cy) = n.bbox.center();
        min = (min.0.min(cx), min.1.min(cy));
        max = (max.0.max(cx), max.1.max(cy));
    }
    if numbers.is_empty() {
        return (0.0, 0.0);
    }
    (max.0 - min.0, max.1 - min.1)
}

/// Both spreads below `ratio` of the image size. A lone number has zero
/// spread and counts as degenerate; an empty list never does.
pub fn is_degenerate(numbers: &[RecognizedNumber], width: u32, height: u32, ratio: f32) -> bool {
    if numbers.is_empty() {
        return false;
    }
    let (spread_x, spread_y) = coordinate_spread(numbers);
    spread_x < width as f32 * ratio && spread_y < height as f32 * ratio
}

/// Deterministic spot around the image centre, keyed by the id.
/// Each full turn of `radial_step_degrees` steps moves out to the next ring,
/// so ids one turn apart land on the same ray at different radii.
pub fn radial_position(id: &str, width: u32, height: u32, config: &CalibrationConfig) -> PixelRect {
    let key = id
        .parse::<i64>()
        .unwrap_or_else(|_| id.chars().map(|c| c as i64).sum());
    let step = config.radial_step_degrees as f64;
    let steps_per_turn = ((360.0 / step).round() as i64).max(1);
    let ring = key.div_euclid(steps_per_turn).rem_euclid(config.radial_rings.max(1) as i64);

    let angle = (key as f64 * step).to_radians();
    let base = width.min(height) as f64 * config.radial_radius_ratio as f64;
    let radius = base * (1.0 + ring as f64 * config.radial_ring_step as f64);

    let box_w = width as f64 * config.radial_box_ratio as f64;
    let box_h = height as f64 * config.radial_box_ratio as f64;
    let cx = width as f64 / 2.0 + angle.cos() * radius;
    let cy = height as f64 / 2.0 + angle.sin() * radius;

    PixelRect {
        x: cx - box_w / 2.0,
        y: cy - box_h / 2.0,
        width: box_w,
        height: box_h,
    }
}

/// Replace collapsed coordinates with layout positions, or clamp sound ones
/// to the image.
pub fn calibrate(
    numbers: &[RecognizedNumber],
    dimensions: (u32, u32),
    config: &CalibrationConfig,
) -> Vec<RecognizedNumber> {
    let (width, height) = dimensions;

    if !is_degenerate(numbers, width, height, config.degenerate_ratio) {
        return numbers
            .iter()
            .map(|n| RecognizedNumber {
                bbox: n.bbox.clamp_to(width, height),
                ..n.clone()
            })
            .collect();
    }

    info!(
        "Coordinates of {} numbers collapse below {:.0}% of {}x{}, using calibration layout",
        numbers.len(),
        config.degenerate_ratio * 100.0,
        width,
        height
    );

    numbers
        .iter()
        .map(|n| {
            let (rect, source) = match config.layout.get(&n.text) {
                Some(entry) => (entry.to_pixels(width, height), CoordinateSource::Layout),
                None => (radial_position(&n.text, width, height, config), CoordinateSource::Radial),
            };
            RecognizedNumber {
                bbox: rect.to_bounding_box(width, height),
                confidence: n.confidence * config.fallback_confidence_factor,
                source,
                ..n.clone()
            }
        })
        .collect()
}

/// Shift every box by (`dx`, `dy`), keeping it inside the image
pub fn translate(
    numbers: &[RecognizedNumber],
    dx: i64,
    dy: i64,
    dimensions: (u32, u32),
) -> Vec<RecognizedNumber> {
    let (width, height) = dimensions;
    numbers
        .iter()
        .map(|n| {
            let x = (n.bbox.x as i64 + dx).clamp(0, width as i64) as u32;
            let y = (n.bbox.y as i64 + dy).clamp(0, height as i64) as u32;
            let moved = BoundingBox::new(x, y, n.bbox.width, n.bbox.height);
            RecognizedNumber {
                bbox: moved.clamp_to(width, height),
                ..n.clone()
            }
        })
        .collect()
}

/// Offset that moves the first number with `id` to the known top-left corner
pub fn anchor_offset(
    numbers: &[RecognizedNumber],
    id: &str,
    known_x: u32,
    known_y: u32,
) -> Option<(i64, i64)> {
    numbers.iter().find(|n| n.text == id).map(|n| {
        (
            known_x as i64 - n.bbox.x as i64,
            known_y as i64 - n.bbox.y as i64,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(text: &str, x: u32, y: u32, confidence: f32) -> RecognizedNumber {
        RecognizedNumber {
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, 20, 20),
            confidence,
            members: Vec::new(),
            source: CoordinateSource::Measured,
        }
    }

    #[test]
    fn default_layout_is_normalized() {
        let layout = CalibrationLayout::engine_front();
        assert_eq!(layout.len(), 24);
        assert!(layout.entries().all(|(_, r)| r.is_normalized()));
    }

    #[test]
    fn insert_rejects_pixel_rects() {
        let mut layout = CalibrationLayout::new();
        assert!(!layout.insert("7", NormalizedRect::new(120.0, 40.0, 0.1, 0.1)));
        assert!(layout.insert("7", NormalizedRect::new(0.1, 0.4, 0.1, 0.1)));
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn partial_matches_need_high_confidence() {
        let config = ValidationConfig {
            expected_ids: vec!["16".into(), "24".into()],
            ..ValidationConfig::default()
        };
        assert!(is_expected(&number("16", 0, 0, 0.1), &config));
        assert!(is_expected(&number("6", 0, 0, 0.95), &config));
        assert!(!is_expected(&number("6", 0, 0, 0.5), &config));
        assert!(is_expected(&number("241", 0, 0, 0.9), &config));
        assert!(!is_expected(&number("7", 0, 0, 1.0), &config));
    }

    #[test]
    fn reading_order_groups_lines() {
        let mut numbers = vec![
            number("3", 300, 112, 1.0),
            number("1", 100, 100, 1.0),
            number("4", 50, 200, 1.0),
            number("2", 200, 95, 1.0),
        ];
        sort_reading_order(&mut numbers, 20);
        let order: Vec<&str> = numbers.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn radial_placement_is_stable_and_distinct() {
        let config = CalibrationConfig::default();
        let a = radial_position("31", 800, 600, &config);
        let b = radial_position("32", 800, 600, &config);
        assert_eq!(a, radial_position("31", 800, 600, &config));
        assert!((a.x - b.x).abs() > 1.0 || (a.y - b.y).abs() > 1.0);
    }

    #[test]
    fn radial_turns_move_to_outer_rings() {
        let config = CalibrationConfig::default();
        for (inner, outer) in [("4", "28"), ("1", "49"), ("-6", "18")] {
            let a = radial_position(inner, 800, 600, &config).to_bounding_box(800, 600);
            let b = radial_position(outer, 800, 600, &config).to_bounding_box(800, 600);
            assert_ne!(a, b, "{} and {}", inner, outer);
            assert!(a.fits_within(800, 600) && b.fits_within(800, 600));
        }
    }

    #[test]
    fn single_number_is_degenerate() {
        let lone = vec![number("16", 300, 250, 0.95)];
        assert!(is_degenerate(&lone, 800, 600, 0.1));
        assert!(!is_degenerate(&[], 800, 600, 0.1));

        let moved = calibrate(&lone, (800, 600), &CalibrationConfig::default());
        assert_eq!(moved[0].source, CoordinateSource::Layout);
    }

    #[test]
    fn anchor_translation_moves_everything() {
        let numbers = vec![number("16", 100, 100, 1.0), number("17", 150, 300, 1.0)];
        let (dx, dy) = anchor_offset(&numbers, "16", 120, 90).unwrap();
        let moved = translate(&numbers, dx, dy, (800, 600));
        assert_eq!(moved[0].bbox, BoundingBox::new(120, 90, 20, 20));
        assert_eq!(moved[1].bbox, BoundingBox::new(170, 290, 20, 20));
        assert!(anchor_offset(&numbers, "99", 0, 0).is_none());
    }
}
