//! Format decoders.
//!
//! Each time-log decoder turns one input stream into a [`TimeLog`]: an
//! ordered list of raw records plus the static channel declarations the
//! pipeline registers for the batch. The shapefile decoder instead yields a
//! scoped [`shape_archive::ShapefileArchive`] of vector features.

pub mod delimited;
pub mod position_log;
pub mod shape_archive;

use crate::core::error::IngestError;
use crate::core::model::ChannelSpec;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

pub use delimited::CsvProfile;

/// Caller-selected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PositionLog,
    DelimitedText(CsvProfile),
    Shapefile,
}

impl FromStr for SourceFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "position_log" => Ok(SourceFormat::PositionLog),
            "shapefile" => Ok(SourceFormat::Shapefile),
            other => other
                .parse::<CsvProfile>()
                .map(SourceFormat::DelimitedText)
                .map_err(|_| IngestError::MalformedInput(format!("unknown format: {}", s))),
        }
    }
}

impl SourceFormat {
    /// Like `parse`, but also accepts the generic `delimited` / `csv` names,
    /// which pick `default_profile`.
    pub fn resolve(name: &str, default_profile: CsvProfile) -> Result<Self, IngestError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "delimited" | "csv" => Ok(SourceFormat::DelimitedText(default_profile)),
            _ => name.parse(),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::PositionLog => f.write_str("position_log"),
            SourceFormat::DelimitedText(profile) => write!(f, "{}", profile),
            SourceFormat::Shapefile => f.write_str("shapefile"),
        }
    }
}

/// One decoded record, before quantization. Every field may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub north: Option<f64>,
    pub east: Option<f64>,
    pub up: Option<f64>,
    /// One slot per channel, in declaration order.
    pub values: Vec<Option<f64>>,
}

impl LogRecord {
    /// Timestamp and full 3-D position, if all four are present.
    pub fn fix(&self) -> Option<(DateTime<Utc>, f64, f64, f64)> {
        Some((self.timestamp?, self.north?, self.east?, self.up?))
    }
}

/// A fully decoded time-log input.
#[derive(Debug, Clone)]
pub struct TimeLog {
    pub label: String,
    pub channels: &'static [ChannelSpec],
    pub records: Vec<LogRecord>,
}

impl TimeLog {
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.iter().find_map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.iter().rev().find_map(|r| r.timestamp)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
