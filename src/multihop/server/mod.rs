// SPDX-License-Identifier: MIT

//! HTTP surface
//!
//! JSON endpoints for configuration, usage and one-shot runs, plus an SSE
//! endpoint that streams graph steps as they happen.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{ConfigError, Result};
use crate::adk::model::GenerationConfig;
use crate::multihop::config::Settings;
use crate::multihop::graph::GraphEvent;
use crate::multihop::runner::{answer_of, Runner};
use crate::multihop::usage::RequestCounter;

/// Example multi-hop questions offered to new users
pub const EXAMPLE_QUESTIONS: [(&str, &str); 3] = [
    (
        "FanoutQA",
        "What is the batting hand of each of the first five picks in the 1998 MLB draft?",
    ),
    (
        "Frames",
        "I am the narrator character in the final novel written by the recipient of the 1963 Hugo Award for Best Novel. Who am I?",
    ),
    (
        "Musique",
        "What is the symbol of the Saints from the headquarters location of Ten High's manufacturer called?",
    ),
];

const STEP_PREVIEW: usize = 100;

pub struct AppState {
    pub runner: Runner,
    pub counter: RequestCounter,
    pub settings: Settings,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/config", get(get_config))
        .route("/api/examples", get(list_examples))
        .route("/api/usage", get(get_usage))
        .route("/api/runs", post(create_run))
        .route("/api/runs/stream", post(stream_run))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the configured address and serve until the process exits
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Error body `{"error": "..."}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub question: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl RunRequest {
    /// Request tunables over the configured defaults, range-checked
    fn generation_config(&self, settings: &Settings) -> std::result::Result<GenerationConfig, ConfigError> {
        let defaults = settings.generation;
        GenerationConfig::sampling(
            self.temperature.unwrap_or(defaults.temperature),
            self.top_p.unwrap_or(defaults.top_p),
            self.top_k.unwrap_or(defaults.top_k),
        )
        .validated()
    }
}

/// One row of the execution-flow table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRow {
    pub step: usize,
    pub node: String,
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub answer: String,
    pub steps: Vec<StepRow>,
    pub tokens_used: u64,
}

/// Split each log line at its first `:` into node and a shortened output
pub fn execution_steps(log: &[String]) -> Vec<StepRow> {
    log.iter()
        .enumerate()
        .map(|(i, entry)| {
            let (node, output) = match entry.split_once(':') {
                Some((node, output)) => (node.trim().to_string(), output.trim()),
                None => ("Unknown".to_string(), entry.as_str()),
            };
            StepRow {
                step: i + 1,
                node,
                output: shorten(output),
            }
        })
        .collect()
}

fn shorten(text: &str) -> String {
    if text.chars().count() > STEP_PREVIEW {
        let head: String = text.chars().take(STEP_PREVIEW).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.settings.generation;
    Json(json!({
        "model": state.runner.model_name(),
        "defaults": {
            "temperature": generation.temperature,
            "top_p": generation.top_p,
            "top_k": generation.top_k,
        },
        "ranges": {
            "temperature": [0.0, 2.0],
            "top_p": [0.0, 1.0],
            "top_k": [1, 100],
        },
        "credentials": state.settings.credentials_status(),
    }))
}

async fn list_examples() -> Json<Value> {
    let examples: Vec<Value> = EXAMPLE_QUESTIONS
        .iter()
        .map(|(source, question)| json!({ "source": source, "question": question }))
        .collect();
    Json(json!(examples))
}

async fn get_usage(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Value>, ApiError> {
    let stats = state
        .counter
        .stats()
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!(stats)))
}

/// Shared admission checks: non-empty question, valid tunables, quota left
async fn admit(
    state: &AppState,
    request: &RunRequest,
) -> std::result::Result<GenerationConfig, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Please enter a question",
        ));
    }
    let config = request.generation_config(&state.settings)?;

    let increment = state
        .counter
        .increment(&request.question)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !increment.accepted {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            increment.message,
        ));
    }
    Ok(config)
}

async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> std::result::Result<Json<RunResponse>, ApiError> {
    let config = admit(&state, &payload).await?;
    let run_id = uuid::Uuid::new_v4().to_string();
    log::info!("Run {} started", run_id);

    let result = state
        .runner
        .run_with(&payload.question, config)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    log::info!("Run {} finished", run_id);
    Ok(Json(RunResponse {
        run_id,
        answer: answer_of(&result).to_string(),
        steps: execution_steps(&result.log),
        tokens_used: result.tokens_used,
    }))
}

async fn stream_run(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let config = admit(&state, &payload).await?;
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming run for: {}", payload.question);
        if let Err(e) = state
            .runner
            .run_stream(&payload.question, Some(config), tx.clone())
            .await
        {
            log::error!("Streaming run failed: {}", e);
            let _ = tx
                .send(GraphEvent::Failed {
                    error: e.to_string(),
                    partial_answer: None,
                    tokens_used: 0,
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
