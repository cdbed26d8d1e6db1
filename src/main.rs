use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use partmarks::catalog::PartsCatalog;
use partmarks::{
    BatchExecutor, BoundingBox, CoordinateSource, InMemoryCatalog, MarkerError, Pipeline,
    PipelineReport, RasterImage, RecognitionConfig,
};

#[derive(Parser)]
#[command(name = "partmarks")]
#[command(about = "Recognize numeric part markers in exploded-view diagrams")]
struct Cli {
    /// Input image files
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Recognition settings (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty, single image only)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Parts catalog used to annotate results (JSON array of records)
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Override the template match threshold
    #[arg(long, value_name = "F")]
    threshold: Option<f32>,

    /// Known top-left corner of one marker; shifts all markers to match
    #[arg(long, value_name = "ID:X:Y", value_parser = parse_anchor)]
    anchor: Option<Anchor>,
}

#[derive(Clone, Debug)]
struct Anchor {
    id: String,
    x: u32,
    y: u32,
}

/// Parse `ID:X:Y`; the id itself may start with a minus sign
fn parse_anchor(value: &str) -> Result<Anchor, String> {
    let mut parts = value.rsplitn(3, ':');
    let (Some(y), Some(x), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected ID:X:Y, got '{}'", value));
    };
    if id.is_empty() {
        return Err("anchor id is empty".to_string());
    }
    Ok(Anchor {
        id: id.to_string(),
        x: x.parse().map_err(|e| format!("bad x '{}': {}", x, e))?,
        y: y.parse().map_err(|e| format!("bad y '{}': {}", y, e))?,
    })
}

/// One input path and the outcome of processing it
type ImageResult = (PathBuf, Result<PipelineReport, MarkerError>);

#[derive(Serialize)]
struct MarkerOutput<'a> {
    id: &'a str,
    bbox: BoundingBox,
    confidence: f32,
    source: CoordinateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
}

#[derive(Serialize)]
struct ImageOutput<'a> {
    image: String,
    width: u32,
    height: u32,
    calibrated: bool,
    markers: Vec<MarkerOutput<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn image_output<'a>(
    path: &Path,
    report: &'a PipelineReport,
    catalog: Option<&'a InMemoryCatalog>,
) -> ImageOutput<'a> {
    let markers = report
        .markers
        .iter()
        .map(|m| {
            let record = catalog.and_then(|c| c.lookup(&m.id));
            MarkerOutput {
                id: &m.id,
                bbox: m.bbox,
                confidence: m.confidence,
                source: m.source,
                name: record.map(|r| r.name.as_str()),
                price: record.and_then(|r| r.price),
            }
        })
        .collect();

    ImageOutput {
        image: path.display().to_string(),
        width: report.dimensions.0,
        height: report.dimensions.1,
        calibrated: report.calibrated,
        markers,
        notes: &report.notes,
        error: None,
    }
}

fn print_report(
    path: &Path,
    report: &PipelineReport,
    catalog: Option<&InMemoryCatalog>,
    verbose: bool,
) {
    println!("\n=== {} ===", path.display());
    println!(
        "Image: {}x{}, {} components, {} candidates, {} symbols ({})",
        report.dimensions.0,
        report.dimensions.1,
        report.component_count,
        report.candidate_count,
        report.symbols.len(),
        report.source
    );

    if report.markers.is_empty() {
        println!("No part markers detected.");
    } else {
        println!("Detected part markers:");
        for marker in &report.markers {
            let label = catalog
                .and_then(|c| c.lookup(&marker.id))
                .map(|r| format!(" - {}", r.name))
                .unwrap_or_default();
            println!(
                "  {} at ({}, {}) {}x{} - confidence: {:.2} [{:?}]{}",
                marker.id,
                marker.bbox.x,
                marker.bbox.y,
                marker.bbox.width,
                marker.bbox.height,
                marker.confidence,
                marker.source,
                label
            );
        }
    }

    for note in &report.notes {
        println!("Note: {}", note);
    }

    if verbose {
        let states: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
        println!("States: {}", states.join(" -> "));
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if args.debug_out.is_some() && args.images.len() > 1 {
        anyhow::bail!("--debug-out works with a single image only");
    }

    let mut config = match &args.config {
        Some(path) => RecognitionConfig::load(path)?,
        None => RecognitionConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.matcher.match_threshold = threshold;
        config.validate()?;
    }

    let catalog = match &args.catalog {
        Some(path) => Some(InMemoryCatalog::load(path)?),
        None => None,
    };

    let mut pipeline = Pipeline::with_config(config);
    if let Some(debug_dir) = args.debug_out.clone() {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let results: Vec<ImageResult> = if args.images.len() == 1 {
        let path = args.images[0].clone();
        let result = RasterImage::open(&path).and_then(|img| pipeline.run(&img));
        vec![(path, result)]
    } else {
        BatchExecutor::new(&pipeline)
            .execute(&args.images)
            .into_iter()
            .map(|r| (r.path.unwrap_or_default(), r.result))
            .collect()
    };

    let mut failures = Vec::new();
    let mut reports = Vec::new();
    for (path, result) in results {
        match result {
            Ok(mut report) => {
                if let Some(anchor) = &args.anchor {
                    if !report.apply_anchor(&anchor.id, anchor.x, anchor.y) {
                        report.notes.push(format!(
                            "anchor id {} not recognized; positions unchanged",
                            anchor.id
                        ));
                    }
                }
                reports.push((path, report));
            }
            Err(e) => failures.push((path, e.to_string())),
        }
    }

    if args.json {
        let mut outputs: Vec<ImageOutput> = reports
            .iter()
            .map(|(path, report)| image_output(path, report, catalog.as_ref()))
            .collect();
        outputs.extend(failures.iter().map(|(path, error)| ImageOutput {
            image: path.display().to_string(),
            width: 0,
            height: 0,
            calibrated: false,
            markers: Vec::new(),
            notes: &[],
            error: Some(error.clone()),
        }));
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        for (path, report) in &reports {
            print_report(path, report, catalog.as_ref(), args.verbose);
        }
        for (path, error) in &failures {
            eprintln!("{}: {}", path.display(), error);
        }
    }

    if reports.is_empty() {
        anyhow::bail!("no image could be processed");
    }

    Ok(())
}
