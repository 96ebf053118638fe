pub mod compression;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod metadata;
pub mod model;
pub mod quantize;
pub mod settings;
pub mod writer;
