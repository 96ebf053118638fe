// Streaming channel writer contract

use crate::core::error::{IngestError, Result};
use crate::core::model::{Batch, ChannelDescriptor, Sample};
use serde::Serialize;
use tracing::{debug, warn};

/// Append-only sink for the samples of one batch.
pub trait ChannelWriter {
    fn write(&mut self, sample: &Sample) -> Result<()>;

    /// Flushes and finalizes. Called exactly once per opened writer.
    fn close(&mut self) -> Result<()>;
}

/// The time-series store collaborator.
pub trait ChannelStore {
    fn open<'a>(
        &'a mut self,
        batch: &Batch,
        channels: &[ChannelDescriptor],
    ) -> Result<Box<dyn ChannelWriter + 'a>>;
}

/// Scoped writer: checks the channel-slot contract, counts writes and closes
/// the underlying writer exactly once, on drop if not explicitly.
pub struct WriterHandle<'a> {
    inner: Box<dyn ChannelWriter + 'a>,
    channel_count: usize,
    written: usize,
    closed: bool,
}

impl<'a> WriterHandle<'a> {
    pub fn open<S: ChannelStore + ?Sized>(
        store: &'a mut S,
        batch: &Batch,
        channels: &[ChannelDescriptor],
    ) -> Result<Self> {
        let inner = store.open(batch, channels)?;
        debug!("writer opened for batch {} ({} channels)", batch.id, channels.len());
        Ok(Self {
            inner,
            channel_count: channels.len(),
            written: 0,
            closed: false,
        })
    }

    pub fn write(&mut self, sample: &Sample) -> Result<()> {
        if self.closed {
            return Err(IngestError::Writer("write after close".to_string()));
        }
        if sample.values.len() != self.channel_count {
            return Err(IngestError::Writer(format!(
                "sample carries {} values, writer opened with {} channels",
                sample.values.len(),
                self.channel_count
            )));
        }
        self.inner.write(sample)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Closes the writer and returns the number of samples written.
    pub fn close(mut self) -> Result<usize> {
        self.closed = true;
        self.inner.close()?;
        Ok(self.written)
    }
}

impl Drop for WriterHandle<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.inner.close() {
                warn!("writer close on drop failed: {}", e);
            }
        }
    }
}

/// One batch as recorded by [`MemoryChannelStore`].
#[derive(Debug, Clone, Serialize)]
pub struct StoredSeries {
    pub batch: Batch,
    pub channels: Vec<ChannelDescriptor>,
    pub samples: Vec<Sample>,
    pub closed: bool,
}

/// In-process time-series store.
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    pub series: Vec<StoredSeries>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemorySeriesWriter<'a> {
    series: &'a mut StoredSeries,
}

impl ChannelWriter for MemorySeriesWriter<'_> {
    fn write(&mut self, sample: &Sample) -> Result<()> {
        if self.series.closed {
            return Err(IngestError::Writer("series already closed".to_string()));
        }
        self.series.samples.push(sample.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.series.closed {
            return Err(IngestError::Writer("series closed twice".to_string()));
        }
        self.series.closed = true;
        Ok(())
    }
}

impl ChannelStore for MemoryChannelStore {
    fn open<'a>(
        &'a mut self,
        batch: &Batch,
        channels: &[ChannelDescriptor],
    ) -> Result<Box<dyn ChannelWriter + 'a>> {
        self.series.push(StoredSeries {
            batch: batch.clone(),
            channels: channels.to_vec(),
            samples: Vec::new(),
            closed: false,
        });
        let series = self
            .series
            .last_mut()
            .ok_or_else(|| IngestError::Writer("series not registered".to_string()))?;
        Ok(Box::new(MemorySeriesWriter { series }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn batch_and_channels() -> (Batch, Vec<ChannelDescriptor>) {
        let t0 = Utc.timestamp_millis_opt(0).unwrap();
        let batch = Batch::new("urn:batch:w", "writer", t0, t0, 2);
        let channels = vec![
            ChannelDescriptor::new("urn:c:1").attach_to(&batch),
            ChannelDescriptor::new("urn:c:2").attach_to(&batch),
        ];
        (batch, channels)
    }

    fn sample(ms: i64, values: Vec<Option<i64>>) -> Sample {
        Sample {
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
            north: 48.0,
            east: 9.0,
            up: 400.0,
            values,
        }
    }

    #[test]
    fn test_writes_in_order_and_closes_once() {
        let (batch, channels) = batch_and_channels();
        let mut store = MemoryChannelStore::new();
        {
            let mut handle = WriterHandle::open(&mut store, &batch, &channels).unwrap();
            handle.write(&sample(2, vec![Some(1), None])).unwrap();
            handle.write(&sample(1, vec![Some(0), Some(5)])).unwrap();
            assert_eq!(handle.close().unwrap(), 2);
        }
        let series = &store.series[0];
        assert!(series.closed);
        let order: Vec<i64> = series.samples.iter().map(|s| s.timestamp.timestamp_millis()).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_rejects_wrong_value_count() {
        let (batch, channels) = batch_and_channels();
        let mut store = MemoryChannelStore::new();
        let mut handle = WriterHandle::open(&mut store, &batch, &channels).unwrap();
        let err = handle.write(&sample(0, vec![Some(1)])).unwrap_err();
        assert!(matches!(err, IngestError::Writer(_)));
        assert_eq!(handle.written(), 0);
    }

    #[test]
    fn test_drop_closes_writer() {
        let (batch, channels) = batch_and_channels();
        let mut store = MemoryChannelStore::new();
        {
            let mut handle = WriterHandle::open(&mut store, &batch, &channels).unwrap();
            handle.write(&sample(0, vec![None, None])).unwrap();
        }
        assert!(store.series[0].closed);
        assert_eq!(store.series[0].samples.len(), 1);
    }
}
