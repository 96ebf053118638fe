// Binary position-log decoder
//
// Wire format is protobuf, optionally wrapped in a gzip/zlib/zstd/lz4 frame.

use crate::core::compression::decompress_auto;
use crate::core::error::{IngestError, Result};
use crate::core::model::ChannelSpec;
use crate::decode::{LogRecord, TimeLog};
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;
use std::io::Read;
use tracing::{debug, info};

#[derive(Clone, PartialEq, Message)]
pub struct PositionLog {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<PositionEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PositionEntry {
    /// Milliseconds since the Unix epoch.
    #[prost(int64, optional, tag = "1")]
    pub timestamp_ms: Option<i64>,
    #[prost(double, optional, tag = "2")]
    pub north: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub east: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub up: Option<f64>,
    #[prost(uint32, optional, tag = "5")]
    pub position_status: Option<u32>,
    #[prost(double, optional, tag = "6")]
    pub pdop: Option<f64>,
    #[prost(double, optional, tag = "7")]
    pub hdop: Option<f64>,
    #[prost(uint32, optional, tag = "8")]
    pub satellites: Option<u32>,
    #[prost(double, optional, tag = "9")]
    pub ground_speed: Option<f64>,
}

pub static CHANNELS: [ChannelSpec; 5] = [
    ChannelSpec::new("Position status", 1.0, 0),
    ChannelSpec::new("PDOP", 0.1, 1),
    ChannelSpec::new("HDOP", 0.1, 1),
    ChannelSpec::new("Satellite count", 1.0, 0),
    ChannelSpec::new("Ground speed", 0.001, 3).with_unit("m/s"),
];

const DEFAULT_LABEL: &str = "position log";

impl PositionEntry {
    fn timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        match self.timestamp_ms {
            None => Ok(None),
            Some(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(Some)
                .ok_or_else(|| IngestError::MalformedInput(format!("timestamp out of range: {}", ms))),
        }
    }

    fn into_record(self) -> Result<LogRecord> {
        Ok(LogRecord {
            timestamp: self.timestamp()?,
            north: self.north,
            east: self.east,
            up: self.up,
            values: vec![
                self.position_status.map(f64::from),
                self.pdop,
                self.hdop,
                self.satellites.map(f64::from),
                self.ground_speed,
            ],
        })
    }
}

fn read_message<R: Read>(mut input: R) -> Result<PositionLog> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let payload = decompress_auto(raw)?;
    PositionLog::decode(payload.as_slice())
        .map_err(|e| IngestError::MalformedInput(format!("position log: {}", e)))
}

/// Decodes the whole stream into a time-log, entries in stream order.
pub fn decode<R: Read>(input: R) -> Result<TimeLog> {
    let message = read_message(input)?;
    let label = if message.label.trim().is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        message.label
    };

    let records = message
        .entries
        .into_iter()
        .map(PositionEntry::into_record)
        .collect::<Result<Vec<_>>>()?;

    info!("position log '{}' decoded: {} entries", label, records.len());

    Ok(TimeLog {
        label,
        channels: &CHANNELS,
        records,
    })
}

/// True iff the stream decodes to at least one entry.
pub fn test<R: Read>(input: R) -> bool {
    match read_message(input) {
        Ok(message) => !message.entries.is_empty(),
        Err(e) => {
            debug!("position log probe failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) fn entry(ms: i64, north: f64, east: f64, up: f64) -> PositionEntry {
        PositionEntry {
            timestamp_ms: Some(ms),
            north: Some(north),
            east: Some(east),
            up: Some(up),
            position_status: Some(4),
            pdop: Some(1.8),
            hdop: Some(0.9),
            satellites: Some(12),
            ground_speed: Some(2.345),
        }
    }

    pub(crate) fn encode(entries: Vec<PositionEntry>) -> Vec<u8> {
        PositionLog {
            label: "tractor-1".to_string(),
            entries,
        }
        .encode_to_vec()
    }

    #[test]
    fn test_decode_keeps_stream_order() {
        let bytes = encode(vec![
            entry(3_000, 48.1, 9.1, 400.0),
            entry(1_000, 48.2, 9.2, 401.0),
        ]);
        let log = decode(Cursor::new(bytes)).unwrap();

        assert_eq!(log.label, "tractor-1");
        assert_eq!(log.channels.len(), 5);
        assert_eq!(log.records[0].timestamp.unwrap().timestamp_millis(), 3_000);
        assert_eq!(log.records[1].north, Some(48.2));
        assert_eq!(log.records[0].values[3], Some(12.0));
    }

    #[test]
    fn test_missing_fields_stay_missing() {
        let mut sparse = entry(0, 1.0, 2.0, 3.0);
        sparse.up = None;
        sparse.pdop = None;
        let log = decode(Cursor::new(encode(vec![sparse]))).unwrap();

        assert!(log.records[0].fix().is_none());
        assert_eq!(log.records[0].values[1], None);
    }

    #[test]
    fn test_truncated_stream_is_malformed() {
        let mut bytes = encode(vec![entry(0, 1.0, 2.0, 3.0), entry(1, 1.0, 2.0, 3.0)]);
        bytes.truncate(bytes.len() - 5);

        let err = decode(Cursor::new(bytes.clone())).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
        assert!(!test(Cursor::new(bytes)));
    }

    #[test]
    fn test_gzip_framed_log() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&encode(vec![entry(10, 1.0, 2.0, 3.0)])).unwrap();
        let framed = encoder.finish().unwrap();

        let log = decode(Cursor::new(framed)).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_probe() {
        assert!(test(Cursor::new(encode(vec![entry(0, 1.0, 2.0, 3.0)]))));
        assert!(!test(Cursor::new(encode(vec![]))));
    }
}
