use axum::{
    routing::{get, post},
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
    extract::State,
};

use std::fs::File;
use std::io::BufReader;

use tracing::{info, debug, error};
use serde::{Serialize, Deserialize};

use crate::client::forward::{forward_envelope, EnvelopePayload};
use crate::state::app_state::{AppState, RunSummary};
use fieldlog_ingest::core::model::new_identity;
use fieldlog_ingest::core::writer::StoredSeries;
use fieldlog_ingest::{
    Envelope, IngestError, IngestSettings, MemoryChannelStore, MemoryGraph, Pipeline, SourceFormat, Triple,
};

#[derive(Deserialize, Debug)]
pub struct IngestRequest {
    pub format: String,
    pub path: String,
}

#[derive(Serialize, Debug)]
pub struct TestResponse {
    pub feasible: bool,
}

#[derive(Serialize, Debug)]
pub struct ParseResponse {
    pub run_id: String,
    pub envelope: Envelope,
    pub triples: Vec<Triple>,
    pub series: Vec<StoredSeries>,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: String,
}

/// =======================
/// ROUTER
/// =======================

pub fn ingest_routes(state: AppState) -> Router {
    Router::new()
        .route("/test", post(test_file))
        .route("/parse", post(parse_file))
        .route("/runs", get(list_runs))
        .with_state(state)
}

fn bad_format(format: &str, e: IngestError) -> Response {
    error!("Rejected format {}: {}", format, e);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: e.to_string() }),
    )
        .into_response()
}

fn open_input(path: &str) -> Result<BufReader<File>, IngestError> {
    Ok(BufReader::new(File::open(path)?))
}

/// Runs one parse with fresh in-memory collaborators.
fn run_pipeline(
    settings: &IngestSettings,
    format: SourceFormat,
    path: &str,
) -> (Envelope, Vec<Triple>, Vec<StoredSeries>) {
    let input = match open_input(path) {
        Ok(input) => input,
        Err(e) => return (Envelope::failed(e.tagged()), Vec::new(), Vec::new()),
    };
    let mut graph = MemoryGraph::new();
    let mut store = MemoryChannelStore::new();
    let envelope = Pipeline::new(settings.clone()).parse(format, input, &mut graph, &mut store);
    (envelope, graph.triples, store.series)
}

/// =======================
/// HANDLERS
/// =======================

async fn test_file(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Response {
    debug!("Test request: format={}, path={}", request.format, request.path);

    let format = match state.settings.source_format(&request.format) {
        Ok(f) => f,
        Err(e) => return bad_format(&request.format, e),
    };

    let path = request.path.clone();
    let feasible = tokio::task::spawn_blocking(move || match open_input(&path) {
        Ok(input) => Pipeline::test(format, input),
        Err(e) => {
            debug!("Probe could not open {}: {}", path, e);
            false
        }
    })
    .await
    .unwrap_or_else(|e| {
        error!("Probe task failed: {}", e);
        false
    });

    Json(TestResponse { feasible }).into_response()
}

async fn parse_file(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Response {
    info!("Parse request: format={}, path={}", request.format, request.path);

    let format = match state.settings.source_format(&request.format) {
        Ok(f) => f,
        Err(e) => return bad_format(&request.format, e),
    };

    let run_id = new_identity();
    let settings = state.settings.clone();
    let path = request.path.clone();

    // A panic inside the run surfaces as a JoinError, never as a crash.
    let (mut envelope, triples, series) =
        tokio::task::spawn_blocking(move || run_pipeline(&settings, format, &path))
            .await
            .unwrap_or_else(|e| {
                error!("Run {} aborted: {}", run_id, e);
                (
                    Envelope::failed(format!("[Aborted] run did not complete: {}", e)),
                    Vec::new(),
                    Vec::new(),
                )
            });

    if let Some(config) = crate::utils::conf_helper::get_cached_config() {
        if let Some(post_url) = config.post_target() {
            let payload = EnvelopePayload {
                id: &config.id,
                run_id: &run_id,
                envelope: &envelope,
                triples: &triples,
                series: &series,
            };
            let forwarded = forward_envelope(&state.client, post_url, &payload).await;
            if let Err(e) = forwarded {
                envelope.errors.push(format!("[Forward] {}", e));
            }
        }
    }

    state
        .record_run(RunSummary::new(&run_id, &request.format, &request.path, &envelope))
        .await;

    Json(ParseResponse {
        run_id,
        envelope,
        triples,
        series,
    })
    .into_response()
}

async fn list_runs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.recent_runs().await)
}
