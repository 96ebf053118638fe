// Delimited-text decoder bound to explicit column schemas

use crate::core::error::{IngestError, Result};
use crate::core::model::ChannelSpec;
use crate::decode::{LogRecord, TimeLog};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Timestamp,
    Real,
    Integer,
    Text,
}

/// Where a bound column lands in a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Time,
    North,
    East,
    Up,
    Channel(usize),
    Ignored,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub role: ColumnRole,
    /// Required columns must be present in the header; their cells may
    /// still be empty.
    pub required: bool,
}

const fn column(name: &'static str, kind: ColumnKind, role: ColumnRole, required: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        role,
        required,
    }
}

static SENSOR_LOG_COLUMNS: [ColumnSpec; 9] = [
    column("Timestamp", ColumnKind::Timestamp, ColumnRole::Time, true),
    column("Latitude", ColumnKind::Real, ColumnRole::North, true),
    column("Longitude", ColumnKind::Real, ColumnRole::East, true),
    column("Altitude", ColumnKind::Real, ColumnRole::Up, true),
    column("Speed", ColumnKind::Real, ColumnRole::Channel(0), true),
    column("Heading", ColumnKind::Real, ColumnRole::Channel(1), true),
    column("Moisture", ColumnKind::Real, ColumnRole::Channel(2), true),
    column("Temperature", ColumnKind::Real, ColumnRole::Channel(3), true),
    column("Ndvi", ColumnKind::Real, ColumnRole::Channel(4), false),
];

static SENSOR_LOG_CHANNELS: [ChannelSpec; 5] = [
    ChannelSpec::new("Speed", 0.001, 3).with_unit("m/s"),
    ChannelSpec::new("Heading", 0.01, 2).with_unit("deg"),
    ChannelSpec::new("Soil moisture", 0.1, 1).with_unit("%"),
    ChannelSpec::new("Soil temperature", 0.1, 1).with_unit("degC"),
    ChannelSpec::new("NDVI", 0.0001, 4),
];

static YIELD_EXPORT_COLUMNS: [ColumnSpec; 9] = [
    column("Timestamp", ColumnKind::Timestamp, ColumnRole::Time, true),
    column("Latitude", ColumnKind::Real, ColumnRole::North, true),
    column("Longitude", ColumnKind::Real, ColumnRole::East, true),
    column("Elevation", ColumnKind::Real, ColumnRole::Up, true),
    column("WetMass", ColumnKind::Real, ColumnRole::Channel(0), true),
    column("Moisture", ColumnKind::Real, ColumnRole::Channel(1), true),
    column("SwathWidth", ColumnKind::Real, ColumnRole::Channel(2), false),
    column("PassNumber", ColumnKind::Integer, ColumnRole::Channel(3), false),
    column("Product", ColumnKind::Text, ColumnRole::Ignored, false),
];

static YIELD_EXPORT_CHANNELS: [ChannelSpec; 4] = [
    ChannelSpec::new("Wet mass flow", 0.01, 2).with_unit("kg/s"),
    ChannelSpec::new("Grain moisture", 0.1, 1).with_unit("%"),
    ChannelSpec::new("Swath width", 0.001, 3).with_unit("m"),
    ChannelSpec::new("Pass number", 1.0, 0),
];

/// Known delimited-text layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvProfile {
    #[default]
    SensorLog,
    YieldExport,
}

impl CsvProfile {
    pub fn delimiter(self) -> u8 {
        match self {
            CsvProfile::SensorLog => b';',
            CsvProfile::YieldExport => b',',
        }
    }

    pub fn columns(self) -> &'static [ColumnSpec] {
        match self {
            CsvProfile::SensorLog => &SENSOR_LOG_COLUMNS,
            CsvProfile::YieldExport => &YIELD_EXPORT_COLUMNS,
        }
    }

    pub fn channels(self) -> &'static [ChannelSpec] {
        match self {
            CsvProfile::SensorLog => &SENSOR_LOG_CHANNELS,
            CsvProfile::YieldExport => &YIELD_EXPORT_CHANNELS,
        }
    }

    /// Leading header columns every export of this profile starts with.
    pub fn header_line(self) -> &'static str {
        match self {
            CsvProfile::SensorLog => "Timestamp;Latitude;Longitude;Altitude;Speed;Heading;Moisture;Temperature",
            CsvProfile::YieldExport => "Timestamp,Latitude,Longitude,Elevation,WetMass,Moisture",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CsvProfile::SensorLog => "sensor log",
            CsvProfile::YieldExport => "yield export",
        }
    }
}

impl FromStr for CsvProfile {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sensor_log" => Ok(CsvProfile::SensorLog),
            "yield_export" => Ok(CsvProfile::YieldExport),
            other => Err(IngestError::MalformedInput(format!("unknown csv profile: {}", other))),
        }
    }
}

impl fmt::Display for CsvProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvProfile::SensorLog => f.write_str("sensor_log"),
            CsvProfile::YieldExport => f.write_str("yield_export"),
        }
    }
}

/// Schema columns resolved against a concrete header.
struct Binding {
    slots: Vec<(usize, &'static ColumnSpec)>,
}

impl Binding {
    fn bind(profile: CsvProfile, header: &StringRecord) -> Result<Self> {
        let names: Vec<String> = header
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
            .collect();

        let mut slots = Vec::new();
        for spec in profile.columns() {
            match names.iter().position(|n| n.eq_ignore_ascii_case(spec.name)) {
                Some(index) => slots.push((index, spec)),
                None if spec.required => {
                    return Err(IngestError::MalformedInput(format!(
                        "{} header is missing column '{}' (found {} column(s))",
                        profile,
                        spec.name,
                        names.len()
                    )))
                }
                None => debug!("optional column '{}' not present", spec.name),
            }
        }
        Ok(Self { slots })
    }

    fn record(&self, profile: CsvProfile, row: &StringRecord, line: u64) -> Result<LogRecord> {
        let mut record = LogRecord {
            values: vec![None; profile.channels().len()],
            ..Default::default()
        };

        for (index, spec) in &self.slots {
            let cell = row.get(*index).unwrap_or("").trim();
            if cell.is_empty() {
                continue;
            }
            let bad = || {
                IngestError::MalformedInput(format!(
                    "line {}: column '{}' cannot be read as {:?}: '{}'",
                    line, spec.name, spec.kind, cell
                ))
            };
            match (spec.kind, spec.role) {
                (_, ColumnRole::Ignored) | (ColumnKind::Text, _) => {}
                (ColumnKind::Timestamp, role) => {
                    let ts = parse_timestamp(cell).ok_or_else(bad)?;
                    if role == ColumnRole::Time {
                        record.timestamp = Some(ts);
                    }
                }
                (ColumnKind::Real, role) => {
                    let value = parse_real(cell, profile.delimiter()).ok_or_else(bad)?;
                    assign(&mut record, role, value);
                }
                (ColumnKind::Integer, role) => {
                    let value = cell.parse::<i64>().map_err(|_| bad())?;
                    assign(&mut record, role, value as f64);
                }
            }
        }
        Ok(record)
    }
}

fn assign(record: &mut LogRecord, role: ColumnRole, value: f64) {
    match role {
        ColumnRole::North => record.north = Some(value),
        ColumnRole::East => record.east = Some(value),
        ColumnRole::Up => record.up = Some(value),
        ColumnRole::Channel(slot) => {
            if let Some(v) = record.values.get_mut(slot) {
                *v = Some(value);
            }
        }
        ColumnRole::Time | ColumnRole::Ignored => {}
    }
}

/// Semicolon-delimited exports may use a decimal comma.
fn parse_real(cell: &str, delimiter: u8) -> Option<f64> {
    cell.parse::<f64>().ok().or_else(|| {
        if delimiter == b';' {
            cell.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) or epoch milliseconds.
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(cell) {
        return Some(ts.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cell, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    cell.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn malformed(e: csv::Error) -> IngestError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    IngestError::MalformedInput(format!("line {}: {}", line, e))
}

/// Decodes every row against the profile schema, in file order.
pub fn decode<R: Read>(input: R, profile: CsvProfile) -> Result<TimeLog> {
    let mut reader = ReaderBuilder::new()
        .delimiter(profile.delimiter())
        .has_headers(true)
        .flexible(false)
        .trim(Trim::All)
        .from_reader(input);

    let header = reader.headers().map_err(malformed)?.clone();
    let binding = Binding::bind(profile, &header)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(malformed)?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        records.push(binding.record(profile, &row, line)?);
    }

    info!("{} decoded: {} rows", profile, records.len());

    Ok(TimeLog {
        label: profile.label().to_string(),
        channels: profile.channels(),
        records,
    })
}

const PROBE_LIMIT: u64 = 8 * 1024;

/// Shallow probe: does the first line carry the profile's header?
pub fn test<R: Read>(input: R, profile: CsvProfile) -> bool {
    let mut first = String::new();
    let mut reader = BufReader::new(input.take(PROBE_LIMIT));
    match reader.read_line(&mut first) {
        Ok(_) => first.contains(profile.header_line()),
        Err(e) => {
            debug!("{} probe failed: {}", profile, e);
            false
        }
    }
}
