pub mod batch;
pub mod calibration;
pub mod catalog;
pub mod config;
pub mod detection;
pub mod error;
pub mod grouping;
pub mod models;
pub mod pipeline;

pub use batch::{BatchExecutor, BatchResult};
pub use calibration::CalibrationLayout;
pub use catalog::{InMemoryCatalog, PartRecord, PartsCatalog};
pub use config::RecognitionConfig;
pub use detection::DetectionPipeline;
pub use detection::source::{SymbolSource, TextRegion};
pub use error::{MarkerError, ProviderError};
pub use models::{
    BinaryMask, BoundingBox, Component, CoordinateSource, PartMarker, RasterImage,
    Digit, RecognizedNumber, RecognizedSymbol, Symbol,
};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext, PipelineReport, PipelineState};
