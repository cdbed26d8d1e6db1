//! Merging single symbols into printed numbers.

use std::cmp::Ordering;

use crate::config::GroupingConfig;
use crate::models::{CoordinateSource, RecognizedNumber, RecognizedSymbol};

/// Whether two symbols sit close enough to belong to the same number.
/// The test is symmetric: distances scale with the larger of the two boxes.
pub fn are_adjacent(a: &RecognizedSymbol, b: &RecognizedSymbol, config: &GroupingConfig) -> bool {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    let dx = ax - bx;
    let dy = ay - by;

    let size = a.bbox.size().max(b.bbox.size()) as f32;
    let line_height = a.bbox.height.max(b.bbox.height) as f32;

    (dx * dx + dy * dy).sqrt() <= config.distance_factor * size
        && dy.abs() <= config.line_factor * line_height
}

/// Total order used to visit symbols independently of input order
fn canonical_order(a: &RecognizedSymbol, b: &RecognizedSymbol) -> Ordering {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    ay.total_cmp(&by)
        .then(ax.total_cmp(&bx))
        .then(a.bbox.y.cmp(&b.bbox.y))
        .then(a.bbox.x.cmp(&b.bbox.x))
        .then(a.bbox.width.cmp(&b.bbox.width))
        .then(a.bbox.height.cmp(&b.bbox.height))
        .then(a.symbol.cmp(&b.symbol))
        .then(a.confidence.total_cmp(&b.confidence))
}

/// Greedy clustering of adjacent symbols into numbers.
///
/// Each unclustered symbol anchors a new cluster and absorbs every other
/// unclustered symbol adjacent to it. Members read left to right; the box is
/// the union of member boxes and the confidence their mean.
pub fn group(symbols: &[RecognizedSymbol], config: &GroupingConfig) -> Vec<RecognizedNumber> {
    let mut ordered: Vec<&RecognizedSymbol> = symbols.iter().collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    let mut used = vec![false; ordered.len()];
    let mut numbers = Vec::new();

    for i in 0..ordered.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let anchor = ordered[i];
        let mut members = vec![anchor.clone()];

        for j in i + 1..ordered.len() {
            if !used[j] && are_adjacent(anchor, ordered[j], config) {
                used[j] = true;
                members.push(ordered[j].clone());
            }
        }

        numbers.push(merge(members));
    }

    numbers
}

/// Combine cluster members into one number
pub fn merge(mut members: Vec<RecognizedSymbol>) -> RecognizedNumber {
    members.sort_by(|a, b| a.bbox.x.cmp(&b.bbox.x).then(a.bbox.y.cmp(&b.bbox.y)));

    let text: String = members.iter().map(|m| m.symbol.as_char()).collect();
    let bbox = members
        .iter()
        .skip(1)
        .fold(members[0].bbox, |acc, m| acc.union(&m.bbox));
    let confidence = members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32;

    RecognizedNumber {
        text,
        bbox,
        confidence,
        members,
        source: CoordinateSource::Measured,
    }
}
