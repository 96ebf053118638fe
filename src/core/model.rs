// Batch and channel descriptors shared by every time-log format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mints a fresh URI-like identity.
pub fn new_identity() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Aggregate descriptor of one decoded time-log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub label: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sample_count: usize,
}

impl Batch {
    /// `start`/`end` are the first and last timestamps in decode order.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count: usize,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            start_time: start,
            end_time: end,
            sample_count: count,
        }
    }

    pub fn is_chronological(&self) -> bool {
        self.start_time <= self.end_time
    }
}

/// Static declaration of a channel by a decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSpec {
    pub designator: &'static str,
    pub scale: f64,
    pub decimal_digits: u32,
    pub unit: Option<&'static str>,
}

impl ChannelSpec {
    pub const fn new(designator: &'static str, scale: f64, decimal_digits: u32) -> Self {
        Self {
            designator,
            scale,
            decimal_digits,
            unit: None,
        }
    }

    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Builds the per-batch descriptor for this channel.
    pub fn describe(&self, batch: &Batch) -> ChannelDescriptor {
        let mut descriptor = ChannelDescriptor::new(new_identity())
            .designator(self.designator)
            .scale(self.scale)
            .decimal_digits(self.decimal_digits)
            .attach_to(batch);
        if let Some(unit) = self.unit {
            descriptor = descriptor.unit(unit);
        }
        descriptor
    }
}

/// One named, scaled value channel. Scale and precision are fixed for the
/// lifetime of the owning batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub id: String,
    pub designator: String,
    pub scale: f64,
    pub decimal_digits: u32,
    pub unit: Option<String>,
    pub batch_id: Option<String>,
}

impl ChannelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            designator: String::new(),
            scale: 1.0,
            decimal_digits: 0,
            unit: None,
            batch_id: None,
        }
    }

    pub fn designator(mut self, designator: impl Into<String>) -> Self {
        self.designator = designator.into();
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn decimal_digits(mut self, digits: u32) -> Self {
        self.decimal_digits = digits;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn attach_to(mut self, batch: &Batch) -> Self {
        self.batch_id = Some(batch.id.clone());
        self
    }
}

/// One quantized sample, in the order the decoder produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub north: f64,
    pub east: f64,
    pub up: f64,
    pub values: Vec<Option<i64>>,
}
