//! Per-run driver: decode, emit metadata, stream samples, build the envelope.
//!
//! A run moves `Decoding -> MetadataEmitted -> Streaming -> Done`, or ends in
//! `Failed`. Either way [`Pipeline::parse`] returns an [`Envelope`]: errors are
//! collected into it, never propagated, and the graph store and channel
//! writer are closed on every path.

use crate::core::error::{IngestError, Result};
use crate::core::geometry::{AttributeValue, Feature};
use crate::core::metadata::{batch_triples, channel_triples, feature_triples, MetadataStore};
use crate::core::model::{new_identity, Batch, ChannelDescriptor, Sample};
use crate::core::quantize::quantize;
use crate::core::settings::IngestSettings;
use crate::core::writer::{ChannelStore, WriterHandle};
use crate::crs::ReprojectionEngine;
use crate::decode::shape_archive::{self, ShapefileArchive};
use crate::decode::{delimited, position_log, SourceFormat, TimeLog};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Decoding,
    MetadataEmitted,
    Streaming,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureOutput {
    pub geometry_id: String,
    pub element_type: String,
    pub geometry: Value,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl From<Feature> for FeatureOutput {
    fn from(feature: Feature) -> Self {
        Self {
            element_type: feature.geometry.element_type().to_string(),
            geometry: feature.geometry.to_geojson(),
            geometry_id: feature.geometry_id,
            attributes: feature.attributes,
        }
    }
}

/// Result of one run. `errors` is the only failure signal.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub parse_time_ms: u64,
    pub errors: Vec<String>,
    pub state: RunState,
    pub batch: Option<Batch>,
    pub channels: Vec<ChannelDescriptor>,
    pub samples_written: usize,
    pub records_skipped: usize,
    pub features: Vec<FeatureOutput>,
}

impl Envelope {
    fn new() -> Self {
        Self {
            parse_time_ms: 0,
            errors: Vec::new(),
            state: RunState::Decoding,
            batch: None,
            channels: Vec::new(),
            samples_written: 0,
            records_skipped: 0,
            features: Vec::new(),
        }
    }

    /// Error envelope for a run that could not even start.
    pub fn failed(message: impl Into<String>) -> Self {
        let mut envelope = Self::new();
        envelope.errors.push(message.into());
        envelope.state = RunState::Failed;
        envelope
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn advance(&mut self, state: RunState) {
        debug!("run state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn fail(&mut self, e: &IngestError) {
        let message = e.tagged();
        error!("run failed in {:?}: {}", self.state, message);
        self.errors.push(message);
        self.state = RunState::Failed;
    }
}

pub struct Pipeline {
    settings: IngestSettings,
}

impl Pipeline {
    pub fn new(settings: IngestSettings) -> Self {
        Self { settings }
    }

    /// Cheap feasibility probe. Never builds an envelope.
    pub fn test<R: Read + Seek>(format: SourceFormat, input: R) -> bool {
        let feasible = match format {
            SourceFormat::PositionLog => position_log::test(input),
            SourceFormat::DelimitedText(profile) => delimited::test(input, profile),
            SourceFormat::Shapefile => shape_archive::test(input),
        };
        debug!("{} probe: {}", format, feasible);
        feasible
    }

    /// Runs the whole pipeline over `input`.
    pub fn parse<R, G, S>(&self, format: SourceFormat, input: R, graph: &mut G, store: &mut S) -> Envelope
    where
        R: Read + Seek,
        G: MetadataStore + ?Sized,
        S: ChannelStore + ?Sized,
    {
        let started = Instant::now();
        let mut envelope = Envelope::new();
        info!("parse started: {}", format);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match format {
            SourceFormat::PositionLog => self.time_log(position_log::decode(input), graph, store, &mut envelope),
            SourceFormat::DelimitedText(profile) => {
                self.time_log(delimited::decode(input, profile), graph, store, &mut envelope)
            }
            SourceFormat::Shapefile => self.vector(input, graph, &mut envelope),
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => envelope.fail(&e),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let during = envelope.state;
                envelope.fail(&IngestError::RunPanicked(format!(
                    "{} run in {:?}: {}",
                    format, during, reason
                )));
            }
        }

        if let Err(e) = graph.close() {
            envelope.fail(&e);
        }
        if envelope.state != RunState::Failed {
            envelope.advance(RunState::Done);
        }
        envelope.parse_time_ms = started.elapsed().as_millis() as u64;

        info!(
            "parse finished: {} in {} ms ({:?}, {} samples, {} features, {} errors)",
            format,
            envelope.parse_time_ms,
            envelope.state,
            envelope.samples_written,
            envelope.features.len(),
            envelope.errors.len()
        );
        envelope
    }

    fn time_log<G, S>(
        &self,
        decoded: Result<TimeLog>,
        graph: &mut G,
        store: &mut S,
        envelope: &mut Envelope,
    ) -> Result<()>
    where
        G: MetadataStore + ?Sized,
        S: ChannelStore + ?Sized,
    {
        let log = decoded?;

        // first/last in decode order, not sorted
        let fallback = Utc::now();
        let start = log.first_timestamp().unwrap_or(fallback);
        let end = log.last_timestamp().unwrap_or(start);
        let batch = Batch::new(new_identity(), log.label.as_str(), start, end, log.len());
        if !batch.is_chronological() {
            warn!("batch {} ends before it starts ({} > {})", batch.id, start, end);
        }
        let channels: Vec<ChannelDescriptor> = log.channels.iter().map(|c| c.describe(&batch)).collect();

        graph.insert(batch_triples(&batch))?;
        for channel in &channels {
            graph.insert(channel_triples(channel))?;
        }
        envelope.batch = Some(batch.clone());
        envelope.channels = channels.clone();
        envelope.advance(RunState::MetadataEmitted);

        let mut handle = WriterHandle::open(store, &batch, &channels)?;
        envelope.advance(RunState::Streaming);
        let streamed = stream(&log, &mut handle, envelope);
        envelope.samples_written = handle.written();
        streamed?;
        handle.close()?;

        if envelope.records_skipped > 0 {
            info!(
                "{} of {} records lacked a timestamp or position and were skipped",
                envelope.records_skipped,
                log.len()
            );
        }
        Ok(())
    }

    fn vector<R, G>(&self, input: R, graph: &mut G, envelope: &mut Envelope) -> Result<()>
    where
        R: Read + Seek,
        G: MetadataStore + ?Sized,
    {
        let archive = ShapefileArchive::open(input, self.settings.scratch_dir.as_deref())?;
        let features = archive.read_features()?;
        let engine = ReprojectionEngine::resolve(
            self.settings.assume_source_wkt.as_deref(),
            archive.projection_wkt(),
            self.settings.reprojection_policy,
        )?;
        drop(archive);

        let reprojected = engine.run(features);
        if !reprojected.errors.is_empty() {
            for message in reprojected.errors {
                envelope.errors.push(format!("[TransformUnavailable] {}", message));
            }
            if reprojected.features.is_empty() {
                envelope.advance(RunState::Failed);
                return Ok(());
            }
        }

        for feature in &reprojected.features {
            graph.insert(feature_triples(feature))?;
        }
        envelope.advance(RunState::MetadataEmitted);
        envelope.features = reprojected.features.into_iter().map(FeatureOutput::from).collect();
        Ok(())
    }
}

fn stream(log: &TimeLog, handle: &mut WriterHandle<'_>, envelope: &mut Envelope) -> Result<()> {
    for record in &log.records {
        let Some((timestamp, north, east, up)) = record.fix() else {
            envelope.records_skipped += 1;
            continue;
        };
        let values = log
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| quantize(record.values.get(i).copied().flatten(), channel.scale))
            .collect();
        handle.write(&Sample {
            timestamp,
            north,
            east,
            up,
            values,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::MemoryGraph;
    use crate::core::writer::{ChannelWriter, MemoryChannelStore};
    use crate::crs::system::tests::{UTM_32N, WGS84_GEO};
    use crate::crs::ReprojectionPolicy;
    use crate::decode::position_log::tests::{encode, entry};
    use crate::decode::shape_archive::tests::{latin1_wgs84_prj, point_archive, point_layer, zip_entries};
    use crate::decode::CsvProfile;
    use std::io::Cursor;

    fn run(pipeline: &Pipeline, format: SourceFormat, bytes: Vec<u8>) -> (Envelope, MemoryGraph, MemoryChannelStore) {
        let mut graph = MemoryGraph::new();
        let mut store = MemoryChannelStore::new();
        let envelope = pipeline.parse(format, Cursor::new(bytes), &mut graph, &mut store);
        (envelope, graph, store)
    }

    fn default_pipeline() -> Pipeline {
        Pipeline::new(IngestSettings::default())
    }

    #[test]
    fn test_binary_log_three_entries() {
        let bytes = encode(vec![
            entry(1_000, 48.1, 9.1, 400.0),
            entry(2_000, 48.2, 9.2, 401.0),
            entry(3_000, 48.3, 9.3, 402.0),
        ]);
        let (envelope, graph, store) = run(&default_pipeline(), SourceFormat::PositionLog, bytes);

        assert!(envelope.errors.is_empty(), "{:?}", envelope.errors);
        assert_eq!(envelope.state, RunState::Done);
        let batch = envelope.batch.as_ref().unwrap();
        assert_eq!(batch.sample_count, 3);
        assert_eq!(batch.start_time.timestamp_millis(), 1_000);
        assert_eq!(batch.end_time.timestamp_millis(), 3_000);
        assert_eq!(envelope.channels.len(), 5);
        assert_eq!(envelope.samples_written, 3);

        let series = &store.series[0];
        assert!(series.closed);
        let order: Vec<i64> = series.samples.iter().map(|s| s.timestamp.timestamp_millis()).collect();
        assert_eq!(order, vec![1_000, 2_000, 3_000]);
        // HDOP 0.9 at scale 0.1
        assert_eq!(series.samples[0].values[2], Some(9));
        assert!(graph.closed);
        assert_eq!(graph.objects(&batch.id, "sampleCount")[0].as_str(), "3");
    }

    #[test]
    fn test_batch_times_follow_decode_order() {
        let bytes = encode(vec![entry(5_000, 48.0, 9.0, 1.0), entry(2_000, 48.0, 9.0, 1.0)]);
        let (envelope, _, store) = run(&default_pipeline(), SourceFormat::PositionLog, bytes);
        let batch = envelope.batch.unwrap();
        assert_eq!(batch.start_time.timestamp_millis(), 5_000);
        assert_eq!(batch.end_time.timestamp_millis(), 2_000);
        assert_eq!(store.series[0].samples.len(), 2);
    }

    #[test]
    fn test_sensor_log_row_without_altitude_is_skipped() {
        let text = "\
Timestamp;Latitude;Longitude;Altitude;Speed;Heading;Moisture;Temperature
2024-05-01T08:00:00Z;48.1;9.2;410.5;2.5;181.25;23.4;14.1
2024-05-01T08:00:01Z;48.1;9.2;;2.5;181.25;23.4;14.1
2024-05-01T08:00:02Z;48.1;9.2;410.7;2.5;181.25;23.4;14.1
";
        let format = SourceFormat::DelimitedText(CsvProfile::SensorLog);
        let (envelope, graph, store) = run(&default_pipeline(), format, text.as_bytes().to_vec());

        assert!(envelope.errors.is_empty(), "{:?}", envelope.errors);
        assert_eq!(envelope.batch.as_ref().unwrap().sample_count, 3);
        assert_eq!(envelope.samples_written, 2);
        assert_eq!(envelope.records_skipped, 1);
        let seconds: Vec<i64> = store.series[0].samples.iter().map(|s| s.timestamp.timestamp() % 60).collect();
        assert_eq!(seconds, vec![0, 2]);
        assert_eq!(store.series[0].samples[0].values, vec![Some(2_500), Some(18_125), Some(234), Some(141), None]);
        assert!(graph.closed);
    }

    #[test]
    fn test_truncated_binary_yields_one_error() {
        let bytes = encode(vec![entry(1_000, 48.1, 9.1, 400.0), entry(2_000, 48.2, 9.2, 401.0)]);
        let truncated = bytes[..bytes.len() - 5].to_vec();
        let (envelope, graph, store) = run(&default_pipeline(), SourceFormat::PositionLog, truncated);

        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].starts_with("[MalformedInput]"), "{}", envelope.errors[0]);
        assert_eq!(envelope.state, RunState::Failed);
        assert_eq!(envelope.samples_written, 0);
        assert!(store.series.is_empty());
        assert!(envelope.batch.is_none());
        assert!(graph.closed);
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json["parse_time_ms"].is_u64());
    }

    #[test]
    fn test_archive_without_geometry() {
        let bytes = zip_entries(&[("readme.txt", &b"no shapes here"[..]), ("plots.dbf", &b"x"[..])]);
        assert!(!Pipeline::test(SourceFormat::Shapefile, Cursor::new(bytes.clone())));

        let (envelope, graph, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert!(envelope.features.is_empty());
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].starts_with("[NoGeometryFound]"));
        assert!(graph.triples.is_empty());
        assert!(graph.closed);
    }

    #[test]
    fn test_projected_archive_lands_in_wgs84() {
        let source = [(512_000.0, 5_300_000.0, "a"), (498_500.0, 5_310_250.0, "b")];
        let bytes = point_archive(&source, Some(UTM_32N));
        assert!(Pipeline::test(SourceFormat::Shapefile, Cursor::new(bytes.clone())));

        let (envelope, graph, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert!(envelope.errors.is_empty(), "{:?}", envelope.errors);
        assert_eq!(envelope.features.len(), 2);
        for (feature, (x, y, name)) in envelope.features.iter().zip(source) {
            assert_eq!(feature.element_type, "Point");
            let lon = feature.geometry["coordinates"][0].as_f64().unwrap();
            let lat = feature.geometry["coordinates"][1].as_f64().unwrap();
            assert!(lon != x && lat != y);
            assert!((-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat));
            assert!((lon - 9.0).abs() < 0.5 && (lat - 47.9).abs() < 0.5, "{} {}", lon, lat);
            assert_eq!(feature.attributes["NAME"], AttributeValue::Text(name.to_string()));
        }
        assert!(!graph.objects(&envelope.features[0].geometry_id, "elementType").is_empty());
    }

    #[test]
    fn test_wgs84_archive_is_unchanged() {
        let source = [(9.25, 48.5, "a")];
        let bytes = point_archive(&source, Some(WGS84_GEO));
        let (envelope, _, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert_eq!(envelope.features[0].geometry["coordinates"], serde_json::json!([9.25, 48.5]));
    }

    #[test]
    fn test_non_utf8_projection_file_still_resolves() {
        let (shp, shx, dbf) = point_layer(&[(9.25, 48.5, "a")]);
        let prj = latin1_wgs84_prj();
        let bytes = zip_entries(&[
            ("plots.shp", shp.as_slice()),
            ("plots.shx", shx.as_slice()),
            ("plots.dbf", dbf.as_slice()),
            ("plots.prj", prj.as_slice()),
        ]);
        let (envelope, _, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert!(envelope.errors.is_empty(), "{:?}", envelope.errors);
        assert_eq!(envelope.state, RunState::Done);
        assert_eq!(envelope.features[0].geometry["coordinates"], serde_json::json!([9.25, 48.5]));
    }

    #[test]
    fn test_declared_crs_overrides_prj() {
        let settings = IngestSettings {
            assume_source_wkt: Some(WGS84_GEO.to_string()),
            ..Default::default()
        };
        let bytes = point_archive(&[(512_000.0, 5_300_000.0, "a")], Some(UTM_32N));
        let (envelope, _, _) = run(&Pipeline::new(settings), SourceFormat::Shapefile, bytes);
        // declared lon/lat wins, the UTM values are passed through as-is
        assert_eq!(
            envelope.features[0].geometry["coordinates"],
            serde_json::json!([512_000.0, 5_300_000.0])
        );
    }

    #[test]
    fn test_reprojection_failure_policies() {
        let points = [(512_000.0, 5_300_000.0, "good"), (500_000.0, 1.0e9, "bad")];

        let bytes = point_archive(&points, Some(UTM_32N));
        let (closed, graph, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert!(closed.features.is_empty());
        assert_eq!(closed.errors.len(), 1);
        assert_eq!(closed.state, RunState::Failed);
        assert!(graph.triples.is_empty());

        let settings = IngestSettings {
            reprojection_policy: ReprojectionPolicy::PartialSuccess,
            ..Default::default()
        };
        let bytes = point_archive(&points, Some(UTM_32N));
        let (partial, _, _) = run(&Pipeline::new(settings), SourceFormat::Shapefile, bytes);
        assert_eq!(partial.features.len(), 1);
        assert_eq!(partial.errors.len(), 1);
        assert_eq!(partial.state, RunState::Done);
    }

    #[test]
    fn test_unresolvable_prj_is_transform_unavailable() {
        let bytes = point_archive(&[(1.0, 2.0, "a")], Some("PROJCS[\"x\",PROJECTION[\"Polyconic\"]]"));
        let (envelope, _, _) = run(&default_pipeline(), SourceFormat::Shapefile, bytes);
        assert!(envelope.features.is_empty());
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].starts_with("[TransformUnavailable]"));
    }

    struct FailingStore {
        closes: usize,
    }

    struct FailingWriter<'a> {
        closes: &'a mut usize,
        writes: usize,
    }

    impl ChannelWriter for FailingWriter<'_> {
        fn write(&mut self, _sample: &Sample) -> Result<()> {
            self.writes += 1;
            if self.writes > 1 {
                return Err(IngestError::Writer("disk full".to_string()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            *self.closes += 1;
            Ok(())
        }
    }

    impl ChannelStore for FailingStore {
        fn open<'a>(
            &'a mut self,
            _batch: &Batch,
            _channels: &[ChannelDescriptor],
        ) -> Result<Box<dyn ChannelWriter + 'a>> {
            Ok(Box::new(FailingWriter {
                closes: &mut self.closes,
                writes: 0,
            }))
        }
    }

    #[test]
    fn test_writer_closed_once_after_write_failure() {
        let bytes = encode(vec![
            entry(1_000, 48.1, 9.1, 400.0),
            entry(2_000, 48.2, 9.2, 401.0),
            entry(3_000, 48.3, 9.3, 402.0),
        ]);
        let mut graph = MemoryGraph::new();
        let mut store = FailingStore { closes: 0 };
        let envelope = default_pipeline().parse(SourceFormat::PositionLog, Cursor::new(bytes), &mut graph, &mut store);

        assert_eq!(store.closes, 1);
        assert_eq!(envelope.samples_written, 1);
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].contains("disk full"));
        // metadata was emitted before streaming failed
        assert!(envelope.batch.is_some());
        assert!(graph.closed);
    }

    struct PanickingStore {
        closes: usize,
    }

    struct PanickingWriter<'a> {
        closes: &'a mut usize,
    }

    impl ChannelWriter for PanickingWriter<'_> {
        fn write(&mut self, _sample: &Sample) -> Result<()> {
            panic!("sensor bus gone");
        }

        fn close(&mut self) -> Result<()> {
            *self.closes += 1;
            Ok(())
        }
    }

    impl ChannelStore for PanickingStore {
        fn open<'a>(
            &'a mut self,
            _batch: &Batch,
            _channels: &[ChannelDescriptor],
        ) -> Result<Box<dyn ChannelWriter + 'a>> {
            Ok(Box::new(PanickingWriter {
                closes: &mut self.closes,
            }))
        }
    }

    #[test]
    fn test_writer_panic_fails_the_run() {
        let bytes = encode(vec![entry(1_000, 48.1, 9.1, 400.0), entry(2_000, 48.2, 9.2, 401.0)]);
        let mut graph = MemoryGraph::new();
        let mut store = PanickingStore { closes: 0 };
        let envelope = default_pipeline().parse(SourceFormat::PositionLog, Cursor::new(bytes), &mut graph, &mut store);

        assert_eq!(envelope.state, RunState::Failed);
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].starts_with("[RunPanicked]"), "{}", envelope.errors[0]);
        assert!(envelope.errors[0].contains("sensor bus gone"));
        assert!(!envelope.errors[0].contains("MalformedInput"));
        assert!(graph.closed);
        // the handle still closed the writer while unwinding
        assert_eq!(store.closes, 1);
    }
}
