// Metadata triples and the graph-store collaborator

use crate::core::constants::{RDF_TYPE, VOCAB, XSD};
use crate::core::error::Result;
use crate::core::geometry::{AttributeValue, Feature};
use crate::core::model::{Batch, ChannelDescriptor};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripleObject {
    Iri { value: String },
    Literal { value: String, datatype: Option<String> },
}

impl TripleObject {
    pub fn iri(value: impl Into<String>) -> Self {
        TripleObject::Iri { value: value.into() }
    }

    pub fn text(value: impl Into<String>) -> Self {
        TripleObject::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl ToString, xsd_type: &str) -> Self {
        TripleObject::Literal {
            value: value.to_string(),
            datatype: Some(format!("{}{}", XSD, xsd_type)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TripleObject::Iri { value } => value,
            TripleObject::Literal { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: TripleObject,
}

impl Triple {
    pub fn new(subject: &str, term: &str, object: TripleObject) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: vocab(term),
            object,
        }
    }

    fn typed_as(subject: &str, class: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: RDF_TYPE.to_string(),
            object: TripleObject::iri(vocab(class)),
        }
    }
}

pub fn vocab(term: &str) -> String {
    format!("{}{}", VOCAB, term)
}

/// The graph-store collaborator. Triples are additive; nothing already
/// inserted is ever rewritten.
pub trait MetadataStore {
    fn insert(&mut self, triples: Vec<Triple>) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// In-process graph store.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    pub triples: Vec<Triple>,
    pub closed: bool,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self, subject: &str, term: &str) -> Vec<&TripleObject> {
        let predicate = vocab(term);
        self.triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
            .collect()
    }
}

impl MetadataStore for MemoryGraph {
    fn insert(&mut self, mut triples: Vec<Triple>) -> Result<()> {
        debug!("graph insert: {} triples", triples.len());
        self.triples.append(&mut triples);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub fn batch_triples(batch: &Batch) -> Vec<Triple> {
    let id = batch.id.as_str();
    vec![
        Triple::typed_as(id, "TimeLog"),
        Triple::new(id, "label", TripleObject::text(&batch.label)),
        Triple::new(
            id,
            "startTime",
            TripleObject::typed(
                batch.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                "dateTime",
            ),
        ),
        Triple::new(
            id,
            "endTime",
            TripleObject::typed(
                batch.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                "dateTime",
            ),
        ),
        Triple::new(id, "sampleCount", TripleObject::typed(batch.sample_count, "long")),
    ]
}

pub fn channel_triples(channel: &ChannelDescriptor) -> Vec<Triple> {
    let id = channel.id.as_str();
    let mut triples = vec![
        Triple::typed_as(id, "Channel"),
        Triple::new(id, "designator", TripleObject::text(&channel.designator)),
        Triple::new(id, "scale", TripleObject::typed(channel.scale, "double")),
        Triple::new(
            id,
            "decimalDigits",
            TripleObject::typed(channel.decimal_digits, "int"),
        ),
    ];
    if let Some(unit) = &channel.unit {
        triples.push(Triple::new(id, "unit", TripleObject::text(unit)));
    }
    if let Some(batch_id) = &channel.batch_id {
        triples.push(Triple::new(id, "partOf", TripleObject::iri(batch_id)));
    }
    triples
}

pub fn feature_triples(feature: &Feature) -> Vec<Triple> {
    let id = feature.geometry_id.as_str();
    let mut triples = vec![
        Triple::typed_as(id, "Feature"),
        Triple::new(
            id,
            "elementType",
            TripleObject::text(feature.geometry.element_type()),
        ),
    ];
    for (name, value) in &feature.attributes {
        let object = match value {
            AttributeValue::Null => continue,
            AttributeValue::Integer(v) => TripleObject::typed(v, "long"),
            AttributeValue::Number(v) => TripleObject::typed(v, "double"),
            AttributeValue::Boolean(v) => TripleObject::typed(v, "boolean"),
            AttributeValue::Text(v) => TripleObject::text(v),
        };
        triples.push(Triple::new(id, &format!("attribute/{}", name), object));
    }
    triples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Coord, Geometry};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[test]
    fn test_batch_and_channel_triples() {
        let t0 = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let t1 = Utc.timestamp_millis_opt(1_700_000_060_000).unwrap();
        let batch = Batch::new("urn:batch:7", "field 7", t0, t1, 60);
        let channel = ChannelDescriptor::new("urn:channel:hdop")
            .designator("HDOP")
            .scale(0.1)
            .decimal_digits(1)
            .attach_to(&batch);

        let mut graph = MemoryGraph::new();
        graph.insert(batch_triples(&batch)).unwrap();
        graph.insert(channel_triples(&channel)).unwrap();

        assert_eq!(graph.objects("urn:batch:7", "sampleCount")[0].as_str(), "60");
        assert_eq!(
            graph.objects("urn:batch:7", "startTime")[0].as_str(),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(
            graph.objects("urn:channel:hdop", "partOf")[0],
            &TripleObject::iri("urn:batch:7")
        );
        assert!(graph.objects("urn:channel:hdop", "unit").is_empty());
    }

    #[test]
    fn test_feature_triples_skip_null_attributes() {
        let mut attributes = BTreeMap::new();
        attributes.insert("crop".to_string(), AttributeValue::Text("wheat".into()));
        attributes.insert("note".to_string(), AttributeValue::Null);
        let feature = Feature {
            geometry_id: "plots.1".to_string(),
            geometry: Geometry::Point(Coord::new(9.0, 48.0)),
            attributes,
        };

        let triples = feature_triples(&feature);
        assert_eq!(triples.len(), 3);
        assert!(triples
            .iter()
            .any(|t| t.predicate == vocab("attribute/crop") && t.object.as_str() == "wheat"));
    }
}
