pub mod error;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State as AxumState},
    http::{header::HeaderName, HeaderValue},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};

use crate::core::{Generator, GeneratorRegistry};
use crate::openai::{
    ChatCompletionRequest, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, GenerateRequest, GenerateResponse, ModelList,
};
use crate::template;

pub use error::ApiError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GeneratorRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<GeneratorRegistry>) -> Self {
        Self { registry }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/models", get(models))
        .route("/api/generate", post(legacy_generate))
        .route("/api/generate/", post(legacy_generate))
        .layer(axum::middleware::from_fn(crate::middleware::trace_requests))
        .with_state(state)
}

/// Runs registry lookups and model work off the async executor.
async fn run_blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

fn resolve(state: &AppState, name: &str) -> ApiResult<Arc<Generator>> {
    Ok(state.registry.get(name)?)
}

async fn root() -> Redirect {
    Redirect::temporary("/v1/models")
}

async fn completions(
    AxumState(state): AxumState<AppState>,
    body: Result<Json<CompletionRequest>, JsonRejection>,
) -> ApiResult<Json<CompletionResponse>> {
    let Json(req) = body?;
    tracing::info!(model = %req.model, "completion request");

    run_blocking(move || {
        let generator = resolve(&state, &req.model)?;
        let text = generator.generate(&req.prompt, &req.parameters())?;
        Ok(Json(CompletionResponse::text_completion(req.model, &req.prompt, text)))
    })
    .await
}

async fn chat_completions(
    AxumState(state): AxumState<AppState>,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> ApiResult<Json<CompletionResponse>> {
    let Json(req) = body?;
    tracing::info!(model = %req.model, turns = req.messages.len(), "chat completion request");

    run_blocking(move || {
        let generator = resolve(&state, &req.model)?;
        let text = generator.generate_chat(&req.messages, &req.parameters())?;
        let prompt = template::flatten(&req.messages);
        Ok(Json(CompletionResponse::chat_completion(req.model, &prompt, text)))
    })
    .await
}

async fn embeddings(
    AxumState(state): AxumState<AppState>,
    body: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> ApiResult<Json<EmbeddingResponse>> {
    let Json(req) = body?;
    tracing::info!(model = %req.model, "embedding request");

    run_blocking(move || {
        state.registry.peek(&req.model)?.ensure_embeddings()?;
        let generator = resolve(&state, &req.model)?;
        let embeddings = generator.generate_embeddings(&req.input)?;
        Ok(Json(EmbeddingResponse {
            model: req.model,
            input: req.input,
            embeddings,
        }))
    })
    .await
}

async fn models(AxumState(state): AxumState<AppState>) -> Json<ModelList> {
    Json(ModelList::new(state.registry.list_names()))
}

async fn legacy_generate(
    AxumState(state): AxumState<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    tracing::warn!("/api/generate is deprecated, use /v1/completions");

    let text = run_blocking(move || {
        let generator = state.registry.get_default()?;
        Ok(generator.generate(&req.inputs, &req.parameters)?)
    })
    .await?;

    Ok((
        [(HeaderName::from_static("deprecation"), HeaderValue::from_static("true"))],
        Json(GenerateResponse::new(text)),
    ))
}
