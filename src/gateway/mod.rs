//! HTTP surface.
//!
//! Thin axum handlers over [`ChatService`]. Every error leaves as
//! `{"detail": ...}` (plus `available_models` when the upstream listing
//! produced any) with the status class of the underlying [`Error`].

use crate::config::Config;
use crate::conversation::Turn;
use crate::error::{Error, Result};
use crate::observability::{self, LogObserver, MultiObserver, Observer, PrometheusObserver};
use crate::persona::{PersonaDetail, PersonaSummary};
use crate::providers;
use crate::service::{ChatReply, ChatRequest, ChatService, NewConversation, TestRequest};
use crate::store::{CharacterProfile, Conversation, RecordStore, TestResult, TestStats};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

pub enum ApiError {
    Service(Error),
    /// The request body could not be read or decoded.
    Body { status: StatusCode, detail: String },
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Service(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other decode failure is a 400.
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::Body {
            status,
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::Body { status, detail } => {
                tracing::debug!(%status, error = %detail, "request body rejected");
                return (status, Json(json!({ "detail": detail }))).into_response();
            }
            Self::Service(error) => error,
        };

        let status = match &error {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::UpstreamUnavailable(_) | Error::Upstream { .. } | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %error, "request failed");
        } else {
            tracing::debug!(error = %error, "request rejected");
        }

        let body = match &error {
            Error::Upstream {
                available_models, ..
            } if !available_models.is_empty() => json!({
                "detail": error.to_string(),
                "available_models": available_models,
            }),
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/api/health", get(handle_health))
        .route(
            "/api/characters",
            get(handle_list_characters).post(handle_create_character),
        )
        .route(
            "/api/characters/{id}",
            get(handle_get_character)
                .put(handle_update_character)
                .delete(handle_delete_character),
        )
        .route("/api/character", get(handle_character_detail))
        .route("/api/chat", post(handle_chat))
        .route("/api/test", post(handle_run_test))
        .route("/api/tests", get(handle_list_tests))
        .route("/api/tests/stats", get(handle_test_stats))
        .route("/api/tests/{id}", get(handle_get_test))
        .route(
            "/api/conversations",
            get(handle_list_conversations).post(handle_create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(handle_get_conversation).delete(handle_delete_conversation),
        )
        .route("/api/conversations/{id}/messages", post(handle_add_message))
        .route("/metrics", get(handle_metrics))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire config, personas, gateway and store into a service.
pub fn build_service(config: &Config, observer: Arc<dyn Observer>) -> Result<ChatService> {
    let registry = config.load_registry()?;
    let gateway = providers::create_gateway(&config.model)?;
    Ok(ChatService::new(
        Arc::new(registry),
        RecordStore::in_memory(),
        gateway,
        observer,
        config.default_persona.clone(),
    ))
}

/// Run the HTTP server until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let prometheus =
        PrometheusObserver::new().context("failed to register Prometheus metrics")?;
    let observer: Arc<dyn Observer> = Arc::new(MultiObserver::new(vec![
        Arc::new(LogObserver::new()),
        Arc::new(prometheus),
    ]));

    let service = build_service(config, Arc::clone(&observer))?;
    tracing::info!(
        personas = service.registry().len(),
        provider = %config.model.provider,
        model = %config.model.model,
        "persona service ready"
    );

    let state = AppState {
        service: Arc::new(service),
    };
    let app = router(state, config.server.max_body_bytes);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    observer.flush();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Character persona API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn handle_list_characters(State(state): State<AppState>) -> Json<Vec<PersonaSummary>> {
    Json(state.service.list_characters())
}

#[derive(Debug, Deserialize)]
struct CharacterQuery {
    character: Option<String>,
}

async fn handle_character_detail(
    State(state): State<AppState>,
    Query(query): Query<CharacterQuery>,
) -> ApiResult<Json<PersonaDetail>> {
    let resolved = state.service.resolve_persona(query.character.as_deref())?;
    Ok(Json(resolved.persona.detail(resolved.source)))
}

async fn handle_chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let Json(request) = body?;
    Ok(Json(state.service.chat(request).await?))
}

async fn handle_run_test(
    State(state): State<AppState>,
    body: std::result::Result<Json<TestRequest>, JsonRejection>,
) -> ApiResult<Json<TestResult>> {
    let Json(request) = body?;
    Ok(Json(state.service.run_test(request).await?))
}

#[derive(Debug, Deserialize)]
struct TestsQuery {
    test_type: Option<String>,
}

async fn handle_list_tests(
    State(state): State<AppState>,
    Query(query): Query<TestsQuery>,
) -> Json<Vec<TestResult>> {
    let store = state.service.store();
    Json(match query.test_type.as_deref() {
        Some(test_type) => store.tests_by_category(test_type),
        None => store.tests.list(),
    })
}

async fn handle_get_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TestResult>> {
    Ok(Json(state.service.store().tests.get(&id)?))
}

async fn handle_test_stats(State(state): State<AppState>) -> Json<TestStats> {
    Json(state.service.store().test_stats())
}

async fn handle_create_character(
    State(state): State<AppState>,
    body: std::result::Result<Json<CharacterProfile>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CharacterProfile>)> {
    let Json(profile) = body?;
    let created = state.service.create_character(profile)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn handle_get_character(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CharacterProfile>> {
    Ok(Json(state.service.store().characters.get(&id)?))
}

async fn handle_update_character(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<CharacterProfile>, JsonRejection>,
) -> ApiResult<Json<CharacterProfile>> {
    let Json(profile) = body?;
    Ok(Json(state.service.update_character(&id, profile)?))
}

async fn handle_delete_character(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CharacterProfile>> {
    Ok(Json(state.service.delete_character(&id)?))
}

#[derive(Debug, Deserialize)]
struct ConversationsQuery {
    character_id: Option<String>,
}

async fn handle_list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
) -> Json<Vec<Conversation>> {
    let store = state.service.store();
    Json(match query.character_id.as_deref() {
        Some(character_id) => store.conversations_for_character(character_id),
        None => store.conversations.list(),
    })
}

async fn handle_create_conversation(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewConversation>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let Json(input) = body?;
    let created = state.service.create_conversation(input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.service.store().conversations.get(&id)?))
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.service.store().conversations.remove(&id)?))
}

async fn handle_add_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<Turn>, JsonRejection>,
) -> ApiResult<Json<Conversation>> {
    let Json(turn) = body?;
    Ok(Json(state.service.add_message(&id, turn)?))
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    match observability::prometheus_text(state.service.observer()) {
        Some(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "metrics exporter is not enabled" })),
        )
            .into_response(),
    }
}
