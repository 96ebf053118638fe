use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use chrono::{DateTime, Utc};
use fieldlog_ingest::{Envelope, IngestSettings, RunState};
use serde::Serialize;

/// What `/runs` reports about one finished parse.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub format: String,
    pub path: String,
    pub state: RunState,
    pub errors: Vec<String>,
    pub samples_written: usize,
    pub feature_count: usize,
    pub parse_time_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(run_id: &str, format: &str, path: &str, envelope: &Envelope) -> Self {
        Self {
            run_id: run_id.to_string(),
            format: format.to_string(),
            path: path.to_string(),
            state: envelope.state,
            errors: envelope.errors.clone(),
            samples_written: envelope.samples_written,
            feature_count: envelope.features.len(),
            parse_time_ms: envelope.parse_time_ms,
            finished_at: Utc::now(),
        }
    }
}

/// Number of recent run summaries kept for `/runs`.
pub const MAX_RUNS: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<IngestSettings>,
    pub client: reqwest::Client,
    // Runs never share mutable state; this log only collects their summaries.
    runs: Arc<RwLock<VecDeque<RunSummary>>>,
    run_limit: usize,
}

impl AppState {
    pub fn new(settings: IngestSettings) -> Self {
        Self::with_run_limit(settings, MAX_RUNS)
    }

    pub fn with_run_limit(settings: IngestSettings, run_limit: usize) -> Self {
        Self {
            settings: Arc::new(settings),
            client: reqwest::Client::new(),
            runs: Arc::new(RwLock::new(VecDeque::with_capacity(run_limit.min(MAX_RUNS)))),
            run_limit: run_limit.max(1),
        }
    }

    /// Appends a summary, evicting the oldest ones beyond the limit.
    pub async fn record_run(&self, summary: RunSummary) {
        let mut runs = self.runs.write().await;
        while runs.len() >= self.run_limit {
            runs.pop_front();
        }
        runs.push_back(summary);
    }

    /// Oldest first.
    pub async fn recent_runs(&self) -> Vec<RunSummary> {
        self.runs.read().await.iter().cloned().collect()
    }
}
