// Error handling for the ingest pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("No geometry found: {0}")]
    NoGeometryFound(String),

    #[error("Transform unavailable: {0}")]
    TransformUnavailable(String),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Writer error: {0}")]
    Writer(String),

    #[error("Run panicked: {0}")]
    RunPanicked(String),
}

impl IngestError {
    /// Short category tag, used as the prefix of envelope error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Io(_) => "Io",
            IngestError::MalformedInput(_) => "MalformedInput",
            IngestError::NoGeometryFound(_) => "NoGeometryFound",
            IngestError::TransformUnavailable(_) => "TransformUnavailable",
            IngestError::UnsupportedCompression(_) => "UnsupportedCompression",
            IngestError::DecompressionFailed(_) => "DecompressionFailed",
            IngestError::Zip(_) => "MalformedInput",
            IngestError::Shapefile(_) => "MalformedInput",
            IngestError::Json(_) => "Json",
            IngestError::Writer(_) => "Writer",
            IngestError::RunPanicked(_) => "RunPanicked",
        }
    }

    /// `[Kind] message`, the form errors take in an envelope.
    pub fn tagged(&self) -> String {
        format!("[{}] {}", self.kind(), self)
    }
}
