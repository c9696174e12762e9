// 🚪 HTTP API - axum routes over the query engine and allowlist manager
//
//   GET    /tor-exit-nodes   ?country=&starttime=&endtime=&count=
//   POST   /allowlist        {"ip_addresses": [...]}
//   DELETE /allowlist        {"ip_addresses": [...]}
//   GET    /allowlist
//   GET    /api/health

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::allowlist::AllowlistManager;
use crate::error::ValidationError;
use crate::query::{QueryEngine, QueryFilter, QueryParams};
use crate::store::AddressRecord;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queries: QueryEngine,
    pub allowlist: AllowlistManager,
}

// ============================================================================
// Request / Response Schemas
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AllowlistRequest {
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExitNodesResponse {
    pub tor_exit_nodes: Vec<AddressRecord>,
}

#[derive(Debug, Serialize)]
pub struct AllowlistResponse {
    pub allowlist: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// Errors
// ============================================================================

pub enum ApiError {
    Validation(ValidationError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(e) => {
                error!(error = %format!("{:#}", e), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// GET /tor-exit-nodes
async fn get_exit_nodes(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ExitNodesResponse>, ApiError> {
    let filter = QueryFilter::try_from(&params)?;
    let nodes = state.queries.query(&filter)?;

    Ok(Json(ExitNodesResponse {
        tor_exit_nodes: nodes,
    }))
}

/// POST /allowlist
async fn add_to_allowlist(
    State(state): State<AppState>,
    payload: Result<Json<AllowlistRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    state.allowlist.add(&request.ip_addresses)?;

    Ok(Json(MessageResponse {
        message: "IP addresses added to the allowlist",
    }))
}

/// DELETE /allowlist
async fn remove_from_allowlist(
    State(state): State<AppState>,
    payload: Result<Json<AllowlistRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    state.allowlist.remove(&request.ip_addresses)?;

    Ok(Json(MessageResponse {
        message: "IP addresses removed from the allowlist",
    }))
}

/// GET /allowlist
async fn get_allowlist(State(state): State<AppState>) -> Result<Json<AllowlistResponse>, ApiError> {
    Ok(Json(AllowlistResponse {
        allowlist: state.allowlist.list()?,
    }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/tor-exit-nodes", get(get_exit_nodes))
        .route(
            "/allowlist",
            get(get_allowlist)
                .post(add_to_allowlist)
                .delete(remove_from_allowlist),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AddressStore, AllowStore, MemoryStore, NewAddressRecord};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let t1 = Utc.with_ymd_and_hms(2024, 2, 12, 0, 0, 0).unwrap();
        let rows = [
            ("1.1.1.1", "US", t1),
            ("2.2.2.2", "FR", t1 + Duration::hours(1)),
        ];
        for (address, country, at) in rows {
            store
                .insert_address(&NewAddressRecord {
                    address: address.to_string(),
                    country_code: country.to_string(),
                    ingested_at: at,
                })
                .unwrap();
        }

        let state = AppState {
            queries: QueryEngine::new(store.clone(), store.clone()),
            allowlist: AllowlistManager::new(store.clone()),
        };
        (build_router(state), store)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();

        let (status, body) = send(&app, get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_exit_nodes_with_filters() {
        let (app, _) = test_app();

        let (status, body) = send(&app, get_request("/tor-exit-nodes?country=US")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"tor_exit_nodes": [{
                "id": 1,
                "ip_address": "1.1.1.1",
                "country": "US",
                "timestamp": "2024-02-12T00:00:00Z"
            }]})
        );

        let (_, body) = send(
            &app,
            get_request("/tor-exit-nodes?starttime=2024-02-12T00:00:00Z"),
        )
        .await;
        assert_eq!(body["tor_exit_nodes"][0]["ip_address"], "2.2.2.2");

        let (_, body) = send(&app, get_request("/tor-exit-nodes?count=1")).await;
        assert_eq!(body["tor_exit_nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_parameters_return_400() {
        let (app, _) = test_app();

        for uri in [
            "/tor-exit-nodes?starttime=yesterday",
            "/tor-exit-nodes?endtime=2024-02-12",
            "/tor-exit-nodes?count=ten",
        ] {
            let (status, body) = send(&app, get_request(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body.get("tor_exit_nodes").is_none());
            assert!(body["error"].as_str().unwrap().starts_with("Invalid"));
        }
    }

    #[tokio::test]
    async fn test_allowlist_round_trip_hides_nodes() {
        let (app, _) = test_app();

        let add = json!({"ip_addresses": ["2.2.2.2", "2.2.2.2"]});
        let (status, body) = send(&app, json_request("POST", "/allowlist", add)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "IP addresses added to the allowlist");

        let (_, body) = send(&app, get_request("/allowlist")).await;
        assert_eq!(body, json!({"allowlist": ["2.2.2.2"]}));

        let (_, body) = send(&app, get_request("/tor-exit-nodes?country=FR")).await;
        assert_eq!(body, json!({"tor_exit_nodes": []}));

        let remove = json!({"ip_addresses": ["2.2.2.2", "9.9.9.9"]});
        let (status, body) = send(&app, json_request("DELETE", "/allowlist", remove)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "IP addresses removed from the allowlist");

        let (_, body) = send(&app, get_request("/tor-exit-nodes?country=FR")).await;
        assert_eq!(body["tor_exit_nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_allowlist_body_returns_400() {
        let (app, store) = test_app();

        let wrong_shape = json!({"ips": ["1.1.1.1"]});
        let (status, body) = send(&app, json_request("POST", "/allowlist", wrong_shape)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(store.allowed_addresses().unwrap().is_empty());
    }
}
