//! HTTP routes for the key-value table.
//!
//! Serves the subset of the PostgREST dialect the remote mirror uses:
//!
//! - `GET /rest/v1/{table}?select=value&key=eq.{key}` returns `[{"value": ..}]`
//!   or `[]`
//! - `POST /rest/v1/{table}?on_conflict=key` upserts one row or an array of
//!   rows and returns `201`

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use shopkeep_core::RemoteRecord;

use super::config::{ApiKeyStore, AuthClient};
use super::storage::{KvStore, KvStoreError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: KvStore,
    pub api_keys: Arc<ApiKeyStore>,
    pub table: Arc<str>,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

/// Errors returned by table handlers
#[derive(Debug)]
pub enum ApiError {
    UnknownTable(String),
    BadRequest(String),
    Storage(KvStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UnknownTable(table) => error_response(
                StatusCode::NOT_FOUND,
                "unknown_table",
                format!("Table '{}' does not exist", table),
            ),
            ApiError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access storage",
                )
            }
        }
    }
}

impl From<KvStoreError> for ApiError {
    fn from(e: KvStoreError) -> Self {
        ApiError::Storage(e)
    }
}

/// Extracts the API key from the `apikey` header or a Bearer token.
fn request_api_key(headers: &HeaderMap) -> Result<&str, Response> {
    if let Some(key) = headers.get("apikey").and_then(|h| h.to_str().ok()) {
        return Ok(key);
    }

    match headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(h) if h.starts_with("Bearer ") => Ok(&h[7..]),
        Some(_) => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_auth",
            "Authorization header must use Bearer scheme",
        )),
        None => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "apikey or Authorization header required",
        )),
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = match request_api_key(request.headers()) {
        Ok(key) => state.api_keys.validate(key),
        Err(response) => return response,
    };

    match client {
        Some(client) => {
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
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

/// Selected row
#[derive(Debug, Serialize)]
struct ValueRow {
    value: Value,
}

/// Upsert body: a single row or an array of rows
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UpsertBody {
    Many(Vec<RemoteRecord>),
    One(RemoteRecord),
}

fn check_table(state: &AppState, table: &str) -> Result<(), ApiError> {
    if table == &*state.table {
        Ok(())
    } else {
        Err(ApiError::UnknownTable(table.to_string()))
    }
}

/// Point select by key
async fn select_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ValueRow>>, ApiError> {
    check_table(&state, &table)?;

    let filter = params
        .get("key")
        .ok_or_else(|| ApiError::BadRequest("A key=eq.<key> filter is required".to_string()))?;
    let key = filter
        .strip_prefix("eq.")
        .ok_or_else(|| ApiError::BadRequest(format!("Unsupported key filter '{}'", filter)))?;

    let rows = state
        .store
        .get(key)
        .await?
        .map(|value| vec![ValueRow { value }])
        .unwrap_or_default();

    Ok(Json(rows))
}

/// Insert or replace rows by key
async fn upsert_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Extension(client): Extension<AuthClient>,
    Json(body): Json<UpsertBody>,
) -> Result<StatusCode, ApiError> {
    check_table(&state, &table)?;

    let rows = match body {
        UpsertBody::Many(rows) => rows,
        UpsertBody::One(row) => vec![row],
    };

    for row in &rows {
        if row.key.is_empty() {
            return Err(ApiError::BadRequest("Row key must not be empty".to_string()));
        }
    }

    for row in &rows {
        state.store.upsert(&row.key, &row.value).await?;
    }

    tracing::info!("{} upserted {} row(s) into {}", client.name, rows.len(), table);
    Ok(StatusCode::CREATED)
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/rest/v1/{table}", get(select_rows).post(upsert_rows))
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
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use shopkeep_core::{
        write_slot, HttpRemoteTable, MemoryStorage, RemoteCredentials, RemoteTable, SlotStorage,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    async fn setup() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(&temp_dir.path().join("kv.db")).await.unwrap();
        let state = AppState {
            store,
            api_keys: Arc::new(ApiKeyStore::from_pairs([(KEY, "till-1")])),
            table: Arc::from("kv_store"),
        };
        (state, temp_dir)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn select(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("apikey", KEY)
            .body(Body::empty())
            .unwrap()
    }

    fn upsert(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", KEY))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_auth_is_rejected() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(
                Request::get("/rest/v1/kv_store?select=value&key=eq.a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "missing_auth");
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(
                Request::get("/rest/v1/kv_store?select=value&key=eq.a")
                    .header("apikey", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_select_missing_row_is_empty_array() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(select("/rest/v1/kv_store?select=value&key=eq.shopkeep-inventory"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_upsert_then_select() {
        let (state, _temp) = setup().await;
        let app = router(state);

        let response = app
            .clone()
            .oneshot(upsert(
                "/rest/v1/kv_store?on_conflict=key",
                json!([{"key": "shopkeep-inventory", "value": [{"sku": "A1"}]}]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(select("/rest/v1/kv_store?select=value&key=eq.shopkeep-inventory"))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!([{"value": [{"sku": "A1"}]}])
        );
    }

    #[tokio::test]
    async fn test_upsert_single_object_replaces_value() {
        let (state, _temp) = setup().await;
        let store = state.store.clone();
        let app = router(state);

        for tax in [5, 7] {
            let response = app
                .clone()
                .oneshot(upsert(
                    "/rest/v1/kv_store?on_conflict=key",
                    json!({"key": "shopkeep-settings", "value": {"tax": tax}}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        assert_eq!(
            store.get("shopkeep-settings").await.unwrap(),
            Some(json!({"tax": 7}))
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(select("/rest/v1/other?select=value&key=eq.a"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_select_requires_eq_filter() {
        let (state, _temp) = setup().await;
        let response = router(state)
            .oneshot(select("/rest/v1/kv_store?select=value&key=like.a"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_http_remote_table_against_server() {
        let (state, _temp) = setup().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let storage: Arc<dyn SlotStorage> = Arc::new(MemoryStorage::new());
        let remote = HttpRemoteTable::new(Arc::clone(&storage), "shopkeep-supabase-config");
        assert!(!remote.is_enabled());

        let creds = RemoteCredentials::new(format!("http://{}", addr), KEY);
        write_slot(storage.as_ref(), "shopkeep-supabase-config", &creds).unwrap();
        assert!(remote.is_enabled());

        let key = "shopkeep-notes & drafts";
        assert_eq!(remote.fetch(key).await.unwrap(), None);

        remote.upsert(key, &json!({"text": "hello"})).await.unwrap();
        assert_eq!(
            remote.fetch(key).await.unwrap(),
            Some(json!({"text": "hello"}))
        );
    }
}
