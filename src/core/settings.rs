// Per-run ingest settings

use crate::crs::ReprojectionPolicy;
use crate::decode::{CsvProfile, SourceFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub reprojection_policy: ReprojectionPolicy,
    /// Schema-declared source CRS for vector input; wins over the `.prj`.
    pub assume_source_wkt: Option<String>,
    /// Parent of the shapefile scratch area, system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Profile for the generic `delimited` / `csv` format names.
    pub csv_profile: CsvProfile,
}

impl IngestSettings {
    /// Reads settings from an extension `configuration` object. `null` and
    /// missing keys fall back to defaults.
    pub fn from_value(value: &serde_json::Value) -> crate::core::error::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Maps a request format name to a [`SourceFormat`].
    pub fn source_format(&self, name: &str) -> crate::core::error::Result<SourceFormat> {
        SourceFormat::resolve(name, self.csv_profile)
    }
}
