//! HTTP route handlers for the memory API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::memory::context::builder::AssembledContext;
use crate::memory::core::errors::MemoryError;
use crate::memory::core::ids::MemoryId;
use crate::memory::engine::{
    ContextRequest, EngineStats, HookEvent, HookOutcome, SearchRequest,
};
use crate::memory::governor::outcome::Outcome;
use crate::memory::retrieval::hybrid_search::SearchHit;
use crate::memory::storage::memory_store::EmbeddingUpdate;

use super::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/memories", post(store_memory))
        .route("/api/memories/{id}", delete(delete_memory))
        .route("/api/memories/{id}/embedding", put(update_embedding))
        .route("/api/search", post(search))
        .route("/api/context", post(assemble_context))
        .route("/api/hooks", post(handle_hook))
        .route("/api/stats", get(stats))
        .with_state(state)
}

fn error_response(err: &MemoryError) -> (StatusCode, String) {
    let status = match err {
        MemoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MemoryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "semantic-memory",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Store request.
#[derive(Debug, Deserialize)]
pub struct StoreBody {
    /// Record text.
    pub content: String,
    /// Content type name.
    pub content_type: String,
    /// Extra keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Store response.
#[derive(Debug, Serialize)]
pub struct StoredBody {
    /// New record id.
    pub id: MemoryId,
}

async fn store_memory(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StoreBody>,
) -> ApiResult<(StatusCode, Json<StoredBody>)> {
    let id = state
        .engine
        .store(&body.content, &body.content_type, &body.keywords)
        .await
        .map_err(|err| error_response(&err))?;
    Ok((StatusCode::CREATED, Json(StoredBody { id })))
}

async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemoryId>,
) -> ApiResult<StatusCode> {
    match state.engine.delete(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(error_response(&MemoryError::NotFound(id))),
        Err(err) => Err(error_response(&err)),
    }
}

/// Embedding update request.
#[derive(Debug, Deserialize)]
pub struct EmbeddingBody {
    /// Vector of the configured dimension.
    pub embedding: Vec<f32>,
}

/// Embedding update response.
#[derive(Debug, Serialize)]
pub struct EmbeddingUpdatedBody {
    /// Whether the index changed.
    pub update: EmbeddingUpdate,
}

async fn update_embedding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MemoryId>,
    Json(body): Json<EmbeddingBody>,
) -> ApiResult<Json<EmbeddingUpdatedBody>> {
    let update = state
        .engine
        .update_embedding(id, body.embedding)
        .await
        .map_err(|err| error_response(&err))?;
    Ok(Json(EmbeddingUpdatedBody { update }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Json<Outcome<Vec<SearchHit>>> {
    Json(state.engine.search(request).await)
}

async fn assemble_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContextRequest>,
) -> Json<AssembledContext> {
    Json(state.engine.assemble_context(request).await)
}

async fn handle_hook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<HookEvent>,
) -> Json<HookOutcome> {
    Json(state.engine.handle_hook(event).await)
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<EngineStats>> {
    state
        .engine
        .stats()
        .await
        .map(Json)
        .map_err(|err| error_response(&err))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::memory::core::config::{EngineConfig, StorageConfig};
    use crate::memory::embedding::testing::FailingEmbedder;
    use crate::memory::engine::{MemoryBackends, MemoryEngine};
    use crate::memory::storage::memory_store::SqliteMemoryStore;

    const DIMS: usize = 4;

    async fn router() -> Router {
        let mut config = EngineConfig::default();
        config.storage = StorageConfig::in_memory();
        config.embedding.ndims = DIMS;
        let store = Arc::new(SqliteMemoryStore::open(&config.storage, DIMS).await.unwrap());
        let embedder = Arc::new(FailingEmbedder::new(DIMS));
        let engine = MemoryEngine::new(config, MemoryBackends { store, embedder }).unwrap();
        create_router(AppState::new(engine))
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn store_then_search() {
        let app = router().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/memories",
                &json!({"content": "vec0 needs a partition key", "content_type": "learning"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request("POST", "/api/search", &json!({"query": "partition"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "executed");
        assert_eq!(body["value"][0]["record"]["id"], id.as_str());
    }

    #[tokio::test]
    async fn invalid_content_type_is_unprocessable() {
        let app = router().await;
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/memories",
                &json!({"content": "text", "content_type": "note"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = router().await;
        let id = MemoryId::new();

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/memories/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/memories/{id}/embedding"),
                &json!({"embedding": [0.1, 0.2, 0.3, 0.4]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn embedding_dimension_is_validated() {
        let app = router().await;
        let (_, body) = send(
            &app,
            json_request(
                "POST",
                "/api/memories",
                &json!({"content": "needs a vector", "content_type": "context"}),
            ),
        )
        .await;
        let id = body["id"].as_str().unwrap().to_string();

        let uri = format!("/api/memories/{id}/embedding");
        let (status, _) = send(&app, json_request("PUT", &uri, &json!({"embedding": [1.0]}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let vector = json!({"embedding": [0.1, 0.2, 0.3, 0.4]});
        let (status, body) = send(&app, json_request("PUT", &uri, &vector)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["update"], "updated");
    }

    #[tokio::test]
    async fn context_and_stats() {
        let app = router().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/context",
                &json!({"doc_blob": "reference docs", "query": "anything"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "[DOCUMENTATION]\nreference docs\n");

        let request = Request::builder().uri("/api/stats").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"]["records"], 0);
    }

    #[tokio::test]
    async fn hooks_never_fail() {
        let app = router().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/hooks",
                &json!({
                    "event": "after",
                    "key": "session",
                    "content": "text",
                    "content_type": "diary"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "skipped");
        assert_eq!(body["reason"], "degraded");
    }
}
