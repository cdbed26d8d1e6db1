use std::collections::BTreeMap;

use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::config::CandidateFilter;
use crate::models::{BinaryMask, BoundingBox, Component};

/// Label 4-connected foreground regions of the mask
pub fn extract(mask: &BinaryMask) -> Vec<Component> {
    let labeled = connected_components(
        mask.as_image(),
        Connectivity::Four,
        Luma([BinaryMask::BACKGROUND]),
    );

    // label -> (min_x, min_y, max_x, max_y, pixels)
    let mut regions: BTreeMap<u32, (u32, u32, u32, u32, Vec<(u32, u32)>)> = BTreeMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Background
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, pixels)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                pixels.push((x, y));
            })
            .or_insert_with(|| (x, y, x, y, vec![(x, y)]));
    }

    regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, pixels))| Component {
            label,
            pixels,
            bbox: BoundingBox::from_extent(min_x, min_y, max_x, max_y),
        })
        .collect()
}

/// Whether a component has the proportions of a printed digit
pub fn is_digit_candidate(component: &Component, filter: &CandidateFilter) -> bool {
    let aspect = component.aspect_ratio();
    let area = component.area();
    let density = component.density();

    aspect > filter.min_aspect
        && aspect < filter.max_aspect
        && area > filter.min_area
        && area < filter.max_area
        && density > filter.min_density
        && density < filter.max_density
}

/// Keep digit-shaped components, largest first
pub fn filter_digit_candidates(
    components: &[Component],
    filter: &CandidateFilter,
) -> Vec<Component> {
    let mut candidates: Vec<Component> = components
        .iter()
        .filter(|c| is_digit_candidate(c, filter))
        .cloned()
        .collect();

    candidates.sort_by(|a, b| {
        b.area()
            .cmp(&a.area())
            .then(a.bbox.y.cmp(&b.bbox.y))
            .then(a.bbox.x.cmp(&b.bbox.x))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_pixels_are_separate_components() {
        let mask = BinaryMask::from_fn(4, 4, |x, y| (x, y) == (1, 1) || (x, y) == (2, 2));
        assert_eq!(extract(&mask).len(), 2);
    }

    #[test]
    fn components_carry_area_and_extent() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| (2..6).contains(&x) && (3..11).contains(&y));
        let components = extract(&mask);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area(), 32);
        assert_eq!(components[0].bbox, BoundingBox::new(2, 3, 4, 8));
    }

    #[test]
    fn filter_rejects_wide_and_solid_shapes() {
        let filter = CandidateFilter::default();
        // Horizontal bar: aspect far below 0.8
        let bar = BinaryMask::from_fn(60, 20, |x, y| (5..55).contains(&x) && (8..12).contains(&y));
        // Solid block: density 1.0
        let block =
            BinaryMask::from_fn(30, 30, |x, y| (5..15).contains(&x) && (5..20).contains(&y));
        assert!(filter_digit_candidates(&extract(&bar), &filter).is_empty());
        assert!(filter_digit_candidates(&extract(&block), &filter).is_empty());
    }
}
