use tokio::fs;
use std::sync::OnceLock;
use tracing::info;
use crate::models::extension_model::ExtensionConfig;
use fieldlog_ingest::IngestSettings;
use tokio::net::TcpListener;

static CONFIG_CACHE: OnceLock<ExtensionConfig> = OnceLock::new();

const CONFIG_FILE: &str = "plugin.json";

/// Reads the extension descriptor, binds the listener and caches the
/// descriptor with the port actually bound.
pub async fn init_config_and_bind() -> Result<(TcpListener, IngestSettings), String> {
    let data = fs::read_to_string(CONFIG_FILE)
        .await
        .map_err(|e| format!("File read error: {e} {CONFIG_FILE}"))?;

    let mut config: ExtensionConfig = serde_json::from_str(&data)
        .map_err(|e| format!("JSON parse error: {e}"))?;

    let settings = IngestSettings::from_value(&config.configuration)
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    let bind_addr = format!(
        "{}:{}",
        config.connection.ip,
        config.connection.port
    );

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Bind failed: {e}"))?;

    let actual_port = listener
        .local_addr()
        .map_err(|e| format!("Addr error: {e}"))?
        .port();

    // port 0 in the descriptor means "any"
    config.connection.port = actual_port;

    CONFIG_CACHE
        .set(config)
        .map_err(|_| "Config already initialized".to_string())?;

    info!(
        "Config initialized on port {} (reprojection policy {:?})",
        actual_port,
        settings.reprojection_policy
    );

    Ok((listener, settings))
}

pub fn get_cached_config() -> Option<&'static ExtensionConfig> {
    CONFIG_CACHE.get()
}
