mod common;

use std::sync::Arc;

use common::*;
use image::RgbaImage;
use partmarks::{BatchExecutor, DetectionPipeline, PipelineState};

#[test]
fn test_recognizes_two_digit_marker() -> anyhow::Result<()> {
    // 1. Draw "16" in the template font
    let image = diagram(800, 600, &[("16", 300, 250)]);

    // 2. Run the default pipeline
    let report = Pipeline::new().run(&image)?;

    // 3. Both digits merge into one number covering their ink
    assert_eq!(report.measured.len(), 1);
    let measured = &report.measured[0];
    assert_eq!(measured.text, "16");
    assert_eq!(measured.bbox, BoundingBox::new(306, 250, 64, 42));
    assert_eq!(measured.source, CoordinateSource::Measured);
    assert!(measured.confidence > 0.72 && measured.confidence <= 1.0);
    assert_eq!(report.candidate_count, 2);

    // 4. A single marker has no spread, so its position comes from the layout
    assert!(report.calibrated);
    assert_eq!(report.markers.len(), 1);
    let marker = &report.markers[0];
    assert_eq!(marker.id, "16");
    let rect = *Pipeline::new().config().calibration.layout.get("16").expect("16 in layout");
    assert_eq!(marker.bbox, rect.to_pixels(800, 600).to_bounding_box(800, 600));
    assert_eq!(marker.source, CoordinateSource::Layout);
    assert!((marker.confidence - measured.confidence * 0.9).abs() < 1e-5);
    assert_eq!(report.states.last(), Some(&PipelineState::Done));

    Ok(())
}

#[test]
fn test_markers_come_back_in_reading_order() -> anyhow::Result<()> {
    let image = diagram(
        800,
        600,
        &[("24", 500, 400), ("16", 100, 100), ("3", 300, 300)],
    );

    let report = Pipeline::new().run(&image)?;

    let ids: Vec<&str> = report.markers.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["16", "3", "24"]);
    assert!(!report.calibrated);

    Ok(())
}

#[test]
fn test_blank_image_yields_no_markers() -> anyhow::Result<()> {
    let image = RasterImage::new(RgbaImage::from_pixel(
        200,
        100,
        image::Rgba([255, 255, 255, 255]),
    ));

    let report = Pipeline::new().run(&image)?;

    assert!(report.markers.is_empty());
    assert_eq!(report.component_count, 0);
    assert_eq!(
        report.states,
        vec![
            PipelineState::Loaded,
            PipelineState::Preprocessed,
            PipelineState::ComponentsExtracted,
            PipelineState::SymbolsRecognized,
            PipelineState::NumbersGrouped,
            PipelineState::Validated,
            PipelineState::Done,
        ]
    );

    Ok(())
}

#[test]
fn test_zero_sized_image_is_rejected() {
    let image = RasterImage::new(RgbaImage::new(0, 0));

    let result = Pipeline::new().run(&image);

    assert!(matches!(result, Err(MarkerError::EmptyImage { width: 0, height: 0 })));
}

#[test]
fn test_unexpected_numbers_are_dropped() -> anyhow::Result<()> {
    // 1. Only "99" is acceptable
    let config = RecognitionConfig::from_toml(
        r#"
        [validation]
        expected_ids = ["99"]
        "#,
    )?;

    // 2. "16" is read but not expected
    let image = diagram(800, 600, &[("16", 300, 250)]);
    let report = Pipeline::with_config(config).run(&image)?;

    assert_eq!(report.symbols.len(), 2);
    assert!(report.markers.is_empty());

    Ok(())
}

#[test]
fn test_offline_provider_falls_back_to_templates() -> anyhow::Result<()> {
    let image = diagram(800, 600, &[("16", 300, 250)]);

    let report = Pipeline::new()
        .with_provider(Arc::new(OfflineProvider))
        .run(&image)?;

    assert_eq!(report.markers.len(), 1);
    assert_eq!(report.markers[0].id, "16");
    assert_eq!(report.source, "Template Matching");
    assert_eq!(report.notes.iter().filter(|n| n.contains("Remote OCR")).count(), 1);

    Ok(())
}

#[test]
fn test_provider_regions_replace_local_matching() -> anyhow::Result<()> {
    // 1. Provider reports "24" in percent confidence on a blank page
    let provider = StaticProvider {
        regions: vec![TextRegion {
            text: "24".to_string(),
            confidence: 88.0,
            bbox: BoundingBox::new(100, 100, 60, 42),
        }],
    };
    let image = diagram(800, 600, &[]);

    // 2. Its characters are split and grouped back together
    let report = Pipeline::new().with_provider(Arc::new(provider)).run(&image)?;

    assert_eq!(report.source, "Static");
    assert_eq!(report.symbols.len(), 2);
    assert_eq!(report.markers.len(), 1);
    assert_eq!(report.markers[0].id, "24");
    assert_eq!(report.measured[0].bbox, BoundingBox::new(100, 100, 60, 42));
    assert!((report.measured[0].confidence - 0.88).abs() < 1e-5);
    assert!(!report.states.contains(&PipelineState::Preprocessed));

    // 3. Alone on the page it is relocated with reduced confidence
    assert!(report.calibrated);
    assert_eq!(report.markers[0].source, CoordinateSource::Layout);
    assert!((report.markers[0].confidence - 0.88 * 0.9).abs() < 1e-5);

    Ok(())
}

#[test]
fn test_provider_regions_outside_the_image_fall_back() -> anyhow::Result<()> {
    // 1. Provider reports a box near the coordinate limit
    let provider = StaticProvider {
        regions: vec![TextRegion {
            text: "16".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(u32::MAX - 10, 100, 40, 20),
        }],
    };

    // 2. The answer is rejected and local matching runs on the blank page
    let report = Pipeline::new()
        .with_provider(Arc::new(provider))
        .run(&diagram(800, 600, &[]))?;

    assert_eq!(report.source, "Template Matching");
    assert!(report.markers.is_empty());
    assert_eq!(report.notes.len(), 1);
    assert!(report.notes[0].contains("Static"));
    assert!(report.states.contains(&PipelineState::Preprocessed));

    Ok(())
}

#[test]
fn test_local_detector_works_as_provider() -> anyhow::Result<()> {
    let pipeline = Pipeline::new();
    let detector =
        DetectionPipeline::with_templates(pipeline.config().clone(), pipeline.templates().clone());
    let image = diagram(800, 600, &[("16", 300, 250)]);

    let report = pipeline.with_provider(Arc::new(detector)).run(&image)?;

    assert_eq!(report.source, "Template Matching");
    assert_eq!(report.markers.len(), 1);
    assert_eq!(report.markers[0].id, "16");

    Ok(())
}

#[test]
fn test_anchor_shifts_all_markers() -> anyhow::Result<()> {
    let image = diagram(800, 600, &[("16", 100, 100), ("24", 500, 400)]);
    let mut report = Pipeline::new().run(&image)?;
    let before = report.markers[1].bbox;

    // 1. Move "16" ten pixels right and five up
    assert!(report.apply_anchor("16", 116, 95));

    // 2. The other marker moves by the same offset
    assert_eq!(report.markers[0].bbox.x, 116);
    assert_eq!(report.markers[1].bbox.x, before.x + 10);
    assert_eq!(report.markers[1].bbox.y, before.y - 5);

    // 3. Unknown ids leave the report alone
    assert!(!report.apply_anchor("99", 0, 0));
    assert_eq!(report.markers[0].bbox.x, 116);

    Ok(())
}

#[test]
fn test_debug_output_is_written_per_stage() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let image = diagram(800, 600, &[("16", 300, 250)]);

    let pipeline = Pipeline::new().with_debug(debug_dir.clone())?;
    pipeline.run(&image)?;

    assert!(debug_dir.join("00_input/01.png").exists());
    assert!(debug_dir.join("01_preprocess/01.png").exists());
    assert!(debug_dir.join("02_components/01.png").exists());
    assert!(debug_dir.join("02_components/02.png").exists());
    assert!(debug_dir.join("03_templates/02.png").exists());

    // A used directory is refused
    assert!(Pipeline::new().with_debug(debug_dir).is_err());

    Ok(())
}

#[test]
fn test_batch_keeps_input_order() -> anyhow::Result<()> {
    let pipeline = Pipeline::new();
    let images = vec![
        diagram(400, 300, &[]),
        diagram(800, 600, &[("16", 300, 250)]),
        RasterImage::new(RgbaImage::new(0, 10)),
        diagram(800, 600, &[("24", 100, 100)]),
    ];

    let results = BatchExecutor::new(&pipeline).with_workers(3).execute_images(&images);

    assert_eq!(results.len(), 4);
    assert!(results[0].result.as_ref().is_ok_and(|r| r.markers.is_empty()));
    let first_id = |i: usize| results[i].result.as_ref().map(|r| r.markers[0].id.clone()).ok();
    assert_eq!(first_id(1), Some("16".to_string()));
    assert!(matches!(results[2].result, Err(MarkerError::EmptyImage { .. })));
    assert_eq!(first_id(3), Some("24".to_string()));

    Ok(())
}

#[test]
fn test_batch_reads_files() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let first = save_png(&diagram(800, 600, &[("16", 300, 250)]), dir.path(), "first.png");
    let missing = dir.path().join("missing.png");

    let pipeline = Pipeline::new();
    let results = BatchExecutor::new(&pipeline).with_workers(2).execute(&[first.clone(), missing]);

    assert_eq!(results[0].path.as_ref(), Some(&first));
    assert_eq!(results[0].result.as_ref().map(|r| r.markers.len()).ok(), Some(1));
    assert!(results[1].result.is_err());

    Ok(())
}
