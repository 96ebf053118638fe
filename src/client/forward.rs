use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use fieldlog_ingest::core::writer::StoredSeries;
use fieldlog_ingest::{Envelope, Triple};

/// Everything one run produced: the envelope plus the metadata triples and
/// the streamed samples the storage side persists.
#[derive(Serialize, Debug)]
pub struct EnvelopePayload<'a> {
    pub id: &'a str,
    pub run_id: &'a str,
    pub envelope: &'a Envelope,
    pub triples: &'a [Triple],
    pub series: &'a [StoredSeries],
}

/// Posts a finished run to the storage collaborator.
pub async fn forward_envelope(
    client: &Client,
    post_url: &str,
    payload: &EnvelopePayload<'_>,
) -> Result<(), String> {
    client
        .post(post_url)
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            error!("Envelope forward failed: {}", e);
            format!("HTTP error: {}", e)
        })?
        .error_for_status()
        .map_err(|e| format!("Storage returned error: {}", e))?;

    info!(
        "Run {} forwarded to {} ({} triples, {} series)",
        payload.run_id,
        post_url,
        payload.triples.len(),
        payload.series.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlog_ingest::{CsvProfile, IngestSettings, MemoryChannelStore, MemoryGraph, Pipeline, SourceFormat};
    use std::io::Cursor;

    #[test]
    fn test_payload_carries_triples_and_samples() {
        let text = "\
Timestamp;Latitude;Longitude;Altitude;Speed;Heading;Moisture;Temperature
2024-05-01T08:00:00Z;48.1;9.2;410.5;2.5;181.25;23.4;14.1
2024-05-01T08:00:01Z;48.1;9.2;410.6;2.6;181.50;23.5;14.2
";
        let mut graph = MemoryGraph::new();
        let mut store = MemoryChannelStore::new();
        let envelope = Pipeline::new(IngestSettings::default()).parse(
            SourceFormat::DelimitedText(CsvProfile::SensorLog),
            Cursor::new(text.as_bytes().to_vec()),
            &mut graph,
            &mut store,
        );
        assert!(envelope.is_success(), "{:?}", envelope.errors);

        let payload = EnvelopePayload {
            id: "fieldlog-ingest",
            run_id: "urn:uuid:run",
            envelope: &envelope,
            triples: &graph.triples,
            series: &store.series,
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["id"], "fieldlog-ingest");
        assert_eq!(json["envelope"]["state"], "done");
        assert!(!graph.triples.is_empty());
        assert_eq!(json["triples"].as_array().unwrap().len(), graph.triples.len());
        assert_eq!(json["triples"][0]["subject"], graph.triples[0].subject.as_str());
        let series = json["series"].as_array().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0]["samples"].as_array().unwrap().len(), 2);
        assert_eq!(series[0]["closed"], true);
    }
}
