// Runs the ingest pipeline over one file and logs what it produced.
//
//   cargo run --example ingest_file -- <format> <path>
//
// <format> is one of position_log, sensor_log, yield_export, shapefile, or
// delimited (the configured default profile).

use fieldlog_ingest::core::quantize;
use fieldlog_ingest::{IngestSettings, MemoryChannelStore, MemoryGraph, Pipeline, Result};
use std::fs::File;
use std::io::BufReader;
use tracing::{info, warn, Level};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let settings = IngestSettings::default();
    let mut args = std::env::args().skip(1);
    let format = settings.source_format(args.next().as_deref().unwrap_or("position_log"))?;
    let path = args.next().unwrap_or_else(|| "data/field.log".to_string());

    // Cheap probe first
    if !Pipeline::test(format, BufReader::new(File::open(&path)?)) {
        warn!("{} does not look like {}", path, format);
    }

    let mut graph = MemoryGraph::new();
    let mut store = MemoryChannelStore::new();
    let envelope = Pipeline::new(settings).parse(
        format,
        BufReader::new(File::open(&path)?),
        &mut graph,
        &mut store,
    );

    info!("State: {:?} after {} ms", envelope.state, envelope.parse_time_ms);
    for error in &envelope.errors {
        warn!("  {}", error);
    }

    if let Some(batch) = &envelope.batch {
        info!(
            "Batch '{}': {} records from {} to {}",
            batch.label, batch.sample_count, batch.start_time, batch.end_time
        );
        info!(
            "Samples written: {}, skipped: {}",
            envelope.samples_written, envelope.records_skipped
        );
    }

    // Decode the first sample back to physical values
    if let Some(first) = store.series.first().and_then(|s| s.samples.first()) {
        for (channel, value) in envelope.channels.iter().zip(&first.values) {
            match value {
                Some(ticks) => info!(
                    "  {} = {:.*} {}",
                    channel.designator,
                    channel.decimal_digits as usize,
                    quantize::decode(*ticks, channel.scale),
                    channel.unit.as_deref().unwrap_or("")
                ),
                None => info!("  {} unset", channel.designator),
            }
        }
    }

    for feature in envelope.features.iter().take(5) {
        info!("Feature {} ({}): {}", feature.geometry_id, feature.element_type, feature.geometry);
    }

    info!("Triples emitted: {}", graph.triples.len());
    if envelope.is_success() {
        info!("Run completed cleanly");
    }
    Ok(())
}
