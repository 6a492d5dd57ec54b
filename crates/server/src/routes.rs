//! HTTP request handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use pipeline::{Identity, Message, PipelineError, PipelineOutcome, PipelineRequest, UsageStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiError, AppState};

/// Build all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline", post(pipeline))
        .route("/detect", post(detect))
        .route("/conversation", post(conversation))
        .route("/translate", post(translate))
        .route("/rewrite", post(rewrite))
        .route("/usage", get(usage))
}

/// `{text, targetLanguage?}` as sent by the detect and translate forms.
#[derive(Debug, Deserialize)]
struct TextBody {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "targetLanguage")]
    target_language: Option<String>,
}

/// `{messages, targetLanguage?}` as sent by the conversation and rewrite forms.
#[derive(Debug, Deserialize)]
struct MessagesBody {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default, rename = "targetLanguage")]
    target_language: Option<String>,
}

async fn pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PipelineOutcome>, ApiError> {
    run(&state, &headers, &body, |request: PipelineRequest| request).await
}

async fn detect(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PipelineOutcome>, ApiError> {
    run(&state, &headers, &body, |b: TextBody| PipelineRequest::Detect {
        text: b.text,
    })
    .await
}

async fn conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PipelineOutcome>, ApiError> {
    run(&state, &headers, &body, |b: MessagesBody| {
        PipelineRequest::Generate {
            messages: b.messages,
        }
    })
    .await
}

async fn translate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PipelineOutcome>, ApiError> {
    run(&state, &headers, &body, |b: TextBody| {
        PipelineRequest::TranslateOnly {
            text: b.text,
            target_language: b.target_language,
        }
    })
    .await
}

async fn rewrite(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PipelineOutcome>, ApiError> {
    run(&state, &headers, &body, |b: MessagesBody| {
        PipelineRequest::GenerateThenTranslate {
            messages: b.messages,
            target_language: b.target_language,
        }
    })
    .await
}

async fn usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageStatus>, ApiError> {
    let identity = identity(&state, &headers).ok_or(PipelineError::Unauthorized)?;
    Ok(Json(state.orchestrator.usage(&identity).await?))
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Identity check, then body decoding, then the orchestrator.
async fn run<B, F>(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    into_request: F,
) -> Result<Json<PipelineOutcome>, ApiError>
where
    B: DeserializeOwned,
    F: FnOnce(B) -> PipelineRequest,
{
    let identity = identity(state, headers).ok_or(PipelineError::Unauthorized)?;
    let request = into_request(decode(body)?);
    let outcome = state.orchestrator.run(Some(identity), request).await?;
    Ok(Json(outcome))
}

fn identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    headers
        .get(&state.identity_header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Identity::new(v.trim()))
}

fn decode<B: DeserializeOwned>(body: &[u8]) -> Result<B, PipelineError> {
    // An empty body decodes like `{}` so missing fields get their own message.
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| PipelineError::invalid(format!("Malformed body: {e}")))
}
