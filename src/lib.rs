// Field-log ingest pipeline
// Main library entry point

pub mod core;
pub mod crs;
pub mod decode;
pub mod pipeline;

// Re-export main types
pub use crate::core::error::{IngestError, Result};
pub use crate::core::metadata::{MemoryGraph, MetadataStore, Triple};
pub use crate::core::settings::IngestSettings;
pub use crate::core::writer::{ChannelStore, ChannelWriter, MemoryChannelStore, WriterHandle};
pub use crate::crs::ReprojectionPolicy;
pub use crate::decode::{CsvProfile, SourceFormat};
pub use crate::pipeline::{Envelope, Pipeline, RunState};
