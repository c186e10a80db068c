//! HTTP routes of the sync server.
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `PUT /v1/users/{user_id}/{collection}`: Commit a batch of documents
//! - `GET /v1/users/{user_id}/{collection}?since={ms}`: Documents changed after `since`

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, ApiKeyStore, AuthUser};
use super::storage::{DocumentStore, StorageError};
use crate::models::ReadingKind;
use crate::remote::{BatchRequest, BatchResponse, QueryResponse};

/// Largest accepted request body.
///
/// Clients keep commits under [`crate::remote::MAX_BATCH_BYTES`]; a single
/// oversized document still has to fit.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentStore>,
    pub api_keys: Arc<ApiKeyStore>,
}

/// Error response body: `{ "error": code, "message": text }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidUserId(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_user", e.to_string())
            }
            StorageError::InvalidDocument(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_document", e.to_string())
            }
            StorageError::BatchTooLarge(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "batch_too_large", e.to_string())
            }
            StorageError::IoError(..) | StorageError::Corrupt(..) | StorageError::Encode(..) => {
                tracing::error!("Storage failure: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access document storage",
                )
            }
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct SinceParams {
    #[serde(default)]
    since: i64,
}

/// Resolves the path to a collection the authenticated user may access.
fn authorize(user: &AuthUser, user_id: &str, collection: &str) -> Result<ReadingKind, ApiError> {
    if user.user_id != user_id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not grant access to this user",
        ));
    }
    ReadingKind::from_collection(collection).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_collection",
            format!("Unknown collection: {}", collection),
        )
    })
}

async fn commit_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((user_id, collection)): Path<(String, String)>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let kind = authorize(&user, &user_id, &collection)?;
    let committed = state
        .documents
        .put_documents(&user_id, kind, body.documents)
        .await?;
    Ok(Json(BatchResponse { committed }))
}

async fn query_changed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((user_id, collection)): Path<(String, String)>,
    Query(params): Query<SinceParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let kind = authorize(&user, &user_id, &collection)?;
    let since = DateTime::from_timestamp_millis(params.since).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_since",
            format!("Timestamp out of range: {}", params.since),
        )
    })?;
    let documents = state
        .documents
        .changed_since(&user_id, kind, since)
        .await?;
    Ok(Json(QueryResponse { documents }))
}

/// Builds the sync server router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/v1/users/{user_id}/{collection}",
            get(query_changed).put(commit_batch),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ApiKeyEntry;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let keys = ApiKeyStore::from_entries(vec![ApiKeyEntry {
            key: "secret".to_string(),
            user_id: "user1".to_string(),
        }]);
        router(AppState {
            documents: Arc::new(DocumentStore::in_memory()),
            api_keys: Arc::new(keys),
        })
    }

    fn request(method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn glucose_doc(id: &str, updated_at: i64) -> Value {
        json!({
            "id": id,
            "valueMmol": 5.5,
            "mealContext": "FASTING",
            "measuredAt": updated_at,
            "createdAt": updated_at,
            "updatedAt": updated_at,
            "isDeleted": false
        })
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_auth() {
        let response = app()
            .oneshot(request("GET", "/v1/users/user1/glucose_readings", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "missing_auth");
    }

    #[tokio::test]
    async fn test_non_bearer_auth() {
        let response = app()
            .oneshot(request(
                "GET",
                "/v1/users/user1/glucose_readings",
                Some("Basic abc"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_auth");
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let response = app()
            .oneshot(request(
                "GET",
                "/v1/users/user1/glucose_readings",
                Some("Bearer wrong"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_other_users_data_is_forbidden() {
        let response = app()
            .oneshot(request(
                "GET",
                "/v1/users/user2/glucose_readings",
                Some("Bearer secret"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let response = app()
            .oneshot(request(
                "GET",
                "/v1/users/user1/weights",
                Some("Bearer secret"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "unknown_collection");
    }

    #[tokio::test]
    async fn test_commit_then_query() {
        let app = app();

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                "/v1/users/user1/glucose_readings",
                Some("Bearer secret"),
                Some(json!({ "documents": [glucose_doc("g1", 100), glucose_doc("g2", 200)] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["committed"], 2);

        let response = app
            .oneshot(request(
                "GET",
                "/v1/users/user1/glucose_readings?since=100",
                Some("Bearer secret"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["documents"], json!([glucose_doc("g2", 200)]));
    }

    #[tokio::test]
    async fn test_commit_full_batch_with_long_notes() {
        let note = "n".repeat(6_000);
        let documents: Vec<Value> = (0..500)
            .map(|i| {
                let mut doc = glucose_doc(&format!("g{}", i), 100 + i);
                doc["note"] = Value::String(note.clone());
                doc
            })
            .collect();
        let body = json!({ "documents": documents });
        assert!(body.to_string().len() > 2 * 1024 * 1024);

        let response = app()
            .oneshot(request(
                "PUT",
                "/v1/users/user1/glucose_readings",
                Some("Bearer secret"),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["committed"], 500);
    }

    #[tokio::test]
    async fn test_commit_invalid_document() {
        let response = app()
            .oneshot(request(
                "PUT",
                "/v1/users/user1/glucose_readings",
                Some("Bearer secret"),
                Some(json!({ "documents": [{ "updatedAt": 1 }] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_document");
    }

    #[tokio::test]
    async fn test_commit_batch_too_large() {
        let documents: Vec<Value> = (0..501).map(|i| glucose_doc(&i.to_string(), i)).collect();
        let response = app()
            .oneshot(request(
                "PUT",
                "/v1/users/user1/glucose_readings",
                Some("Bearer secret"),
                Some(json!({ "documents": documents })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "batch_too_large");
    }
}
