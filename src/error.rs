use thiserror::Error;

/// Errors surfaced to callers of the recognition pipeline
#[derive(Debug, Error)]
pub enum MarkerError {
    /// Zero-width or zero-height input; raised before any stage runs
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("malformed pixel buffer: expected {expected} bytes, got {actual}")]
    MalformedBuffer { expected: usize, actual: usize },

    /// Unrecoverable failure inside a stage; the run ends in `Failed`
    #[error("stage '{stage}' failed on {width}x{height} image: {reason}")]
    Processing {
        stage: &'static str,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid parts catalog: {0}")]
    Catalog(String),
}

/// Failure of an external text-recognition provider.
/// Never aborts a run: the pipeline falls back to local template matching.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, MarkerError>;
