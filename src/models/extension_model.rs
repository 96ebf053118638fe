use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension descriptor read from `plugin.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub category: String,
    /// Storage collaborator that receives every envelope; empty disables
    /// forwarding.
    #[serde(default)]
    pub post_url: String,
    #[serde(default)]
    pub file_formats: Vec<String>,
    pub connection: Connection,
    /// Ingest settings, see `IngestSettings`.
    #[serde(default)]
    pub configuration: Value,
}

impl ExtensionConfig {
    pub fn post_target(&self) -> Option<&str> {
        let url = self.post_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Connection {
    pub ip: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let config: ExtensionConfig = serde_json::from_str(
            r#"{"name":"ingest","id":"fieldlog-ingest","version":"0.1.0",
                "connection":{"ip":"127.0.0.1","port":0},"post_url":"  "}"#,
        )
        .unwrap();
        assert!(config.post_target().is_none());
        assert!(config.configuration.is_null());
        assert!(config.file_formats.is_empty());
    }
}
