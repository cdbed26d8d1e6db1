#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from partmarks for tests
pub use partmarks::{
    BoundingBox, CoordinateSource, MarkerError, Pipeline, ProviderError, RasterImage,
    RecognitionConfig, RecognizedNumber, RecognizedSymbol, Symbol, SymbolSource, TextRegion,
};
