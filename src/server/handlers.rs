//! Request handlers for the files route.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::server::error::{ApiError, Result};
use crate::server::ServerState;
use crate::sync::{encode_content, MutationOutcome};

const EVENT_STREAM: &str = "text/event-stream";

// =============================================================================
// Request and Response Bodies
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    pub stream: Option<String>,
}

/// Body of POST and PUT.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub path: Option<String>,
    pub content: Option<Value>,
    pub message: Option<String>,
    /// `"move"` turns a PUT into a move to `new_path`.
    pub action: Option<String>,
    pub new_path: Option<String>,
}

/// Body of DELETE.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub path: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: MutationOutcome,
}

impl From<MutationOutcome> for MutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        Self { ok: true, outcome }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET: the current snapshot, or a push stream of snapshots.
pub async fn read(
    State(state): State<ServerState>,
    Query(params): Query<ReadParams>,
    headers: HeaderMap,
) -> Result<Response> {
    if wants_stream(&params, &headers) {
        return stream_snapshots(state);
    }

    let snapshot = state
        .context
        .read_snapshot()
        .await
        .map_err(ApiError::Read)?;
    let payload = snapshot.to_payload().map_err(|e| ApiError::Read(e.into()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], payload).into_response())
}

/// POST: create or update a file.
pub async fn create(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<MutationResponse>> {
    let request: SaveRequest = parse_body(&body)?;
    save(&state, request).await
}

/// PUT: create or update a file, or move one when `action` is `"move"`.
pub async fn update(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<MutationResponse>> {
    let request: SaveRequest = parse_body(&body)?;
    match request.action.as_deref() {
        None => save(&state, request).await,
        Some("move") => move_path(&state, request).await,
        Some(other) => Err(ApiError::BadRequest(format!("unknown action '{}'", other))),
    }
}

/// DELETE: remove a file.
pub async fn remove(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<MutationResponse>> {
    let request: DeleteRequest = parse_body(&body)?;
    let path = required(request.path, "path")?;
    let message = request
        .message
        .unwrap_or_else(|| format!("Delete {}", path));

    let outcome = state
        .coordinator
        .remove(&path, &message)
        .await
        .map_err(ApiError::Mutation)?;
    Ok(Json(outcome.into()))
}

pub async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Helpers
// =============================================================================

async fn save(state: &ServerState, request: SaveRequest) -> Result<Json<MutationResponse>> {
    let path = required(request.path, "path")?;
    let content = required(request.content, "content")?;
    let bytes = encode_content(&content)
        .map_err(|e| ApiError::BadRequest(format!("unencodable content: {}", e)))?;
    let message = request
        .message
        .unwrap_or_else(|| format!("Update {}", path));

    let outcome = state
        .coordinator
        .save(&path, &bytes, &message)
        .await
        .map_err(ApiError::Mutation)?;
    Ok(Json(outcome.into()))
}

async fn move_path(state: &ServerState, request: SaveRequest) -> Result<Json<MutationResponse>> {
    let old_path = required(request.path, "path")?;
    let new_path = required(request.new_path, "newPath")?;
    let message = request
        .message
        .unwrap_or_else(|| format!("Move {} to {}", old_path, new_path));

    let outcome = state
        .coordinator
        .move_path(&old_path, &new_path, &message)
        .await
        .map_err(ApiError::Mutation)?;
    Ok(Json(outcome.into()))
}

fn stream_snapshots(state: ServerState) -> Result<Response> {
    let subscription = state.context.subscribe().map_err(ApiError::Read)?;
    debug!(subscriber = subscription.id(), "stream opened");
    state.context.start_polling();

    let events = stream::unfold(subscription, |mut subscription| async move {
        subscription.recv().await.map(|payload| {
            let event = Event::default().event("snapshot").data(&*payload);
            (Ok::<_, Infallible>(event), subscription)
        })
    });

    let sse = Sse::new(events);
    Ok(match state.keep_alive {
        Some(interval) => sse.keep_alive(KeepAlive::new().interval(interval)).into_response(),
        None => sse.into_response(),
    })
}

fn wants_stream(params: &ReadParams, headers: &HeaderMap) -> bool {
    let flag = params
        .stream
        .as_deref()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let accepts = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(EVENT_STREAM));
    flag || accepts
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is required".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| ApiError::BadRequest(format!("missing '{}'", field)))
}
