use crate::config::ApiConfig;
use crate::error::MeditError;
use crate::post::{Submission, Terse};
use crate::query::RangeQuery;
use crate::service::MeditService;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MeditService>,
}

/// Query parameters for the range endpoint
///
/// Negative `max`, `skip` and `maxlen` switch the option off.
#[derive(Debug, Deserialize)]
pub struct MeditsParams {
    #[serde(default)]
    pub beginat: i64,
    #[serde(default)]
    pub endat: i64,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default = "disabled")]
    pub max: i64,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "disabled")]
    pub maxlen: i64,
}

fn disabled() -> i64 {
    -1
}

impl From<MeditsParams> for RangeQuery {
    fn from(params: MeditsParams) -> Self {
        let detail = params
            .detail
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        RangeQuery::from_raw(
            params.beginat,
            params.endat,
            detail,
            params.max,
            params.skip,
            params.maxlen,
        )
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for MeditError {
    fn into_response(self) -> Response {
        match self {
            MeditError::Invalid { problems } => {
                (StatusCode::BAD_REQUEST, Json(json!({ "probs": problems }))).into_response()
            }
            MeditError::Metadata { id, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "id": id, "probs": "dynamo" })),
            )
                .into_response(),
            MeditError::Blob { id, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "id": id, "probs": "s3" })),
            )
                .into_response(),
            MeditError::Read { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to read medit".to_string(),
                    code: "READ_ERROR".to_string(),
                }),
            )
                .into_response(),
            MeditError::Query(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to query medits".to_string(),
                    code: "QUERY_ERROR".to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/up", get(up))
        .route("/medit", post(post_medit).get(empty_medit))
        .route("/medit/", get(empty_medit))
        .route("/medit/:id", get(get_medit))
        .route("/medits", get(list_medits))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness endpoint
async fn up() -> impl IntoResponse {
    Json(json!({ "status": "up" }))
}

/// Store a new medit
#[instrument(skip(state, submission))]
async fn post_medit(
    State(state): State<AppState>,
    Json(submission): Json<Submission>,
) -> Result<Json<Terse>, MeditError> {
    state.service.post(submission).await.map(Json)
}

/// A get without an id yields an empty object
async fn empty_medit() -> impl IntoResponse {
    Json(json!({}))
}

/// Return a stored medit document unmodified
#[instrument(skip(state))]
async fn get_medit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, MeditError> {
    if id.is_empty() {
        return Ok(Json(json!({})).into_response());
    }

    info!(id = %id, "Getting medit");

    match state.service.get(&id).await? {
        Some(document) => {
            Ok(([(header::CONTENT_TYPE, "application/json")], document).into_response())
        }
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Medit not found".to_string(),
                code: "NOT_FOUND".to_string(),
            }),
        )
            .into_response()),
    }
}

/// Medits created within a time window
#[instrument(skip(state))]
async fn list_medits(
    State(state): State<AppState>,
    Query(params): Query<MeditsParams>,
) -> Result<Json<Vec<Value>>, MeditError> {
    let query = RangeQuery::from(params);

    state.service.query(&query).await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to query medits");
        e
    })
}

/// Start the medit API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting medit API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{BlobStore, InMemoryBlobStore, MockBlobStore};
    use crate::config::{Config, StorageBackend};
    use crate::metadata_store::{InMemoryMetadataStore, MockMetadataStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.service.backend = StorageBackend::Memory;
        config.limits.max_body = 100;
        config
    }

    fn memory_router() -> Router {
        let config = test_config();
        let service = MeditService::new(
            &config,
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(InMemoryBlobStore::new()),
        );
        create_router(
            AppState {
                service: Arc::new(service),
            },
            &config.api,
        )
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/medit")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_up() {
        let router = memory_router();
        let (status, body) = send_json(&router, get_request("/up")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "up"}));
    }

    #[tokio::test]
    async fn test_post_then_get() {
        let router = memory_router();

        let (status, ack) = send_json(&router, post_request(json!({"body": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack.as_object().unwrap().len(), 2);
        let id = ack["id"].as_str().unwrap().to_string();

        let (status, document) = send_json(&router, get_request(&format!("/medit/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(document["body"], json!("hi"));
        assert_eq!(document["id"], ack["id"]);
        assert_eq!(document["at"], ack["at"]);
    }

    #[tokio::test]
    async fn test_get_returns_stored_bytes_verbatim() {
        let config = test_config();
        let blobs = Arc::new(InMemoryBlobStore::new());
        let raw = br#"{"body":"hi",  "id":"abc"}"#.to_vec();
        blobs.write_blob("abc", raw.clone()).await.unwrap();

        let service = MeditService::new(&config, Arc::new(InMemoryMetadataStore::new()), blobs);
        let router = create_router(
            AppState {
                service: Arc::new(service),
            },
            &config.api,
        );

        let (status, body) = send(&router, get_request("/medit/abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, raw);
    }

    #[tokio::test]
    async fn test_invalid_post_lists_problems() {
        let router = memory_router();
        let body = json!({"body": "", "head": "h".repeat(200)});

        let (status, response) = send_json(&router, post_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"probs": ["bodyless!", "big head"]}));
    }

    #[tokio::test]
    async fn test_metadata_failure_reports_attempted_id() {
        let config = test_config();
        let mut metadata = MockMetadataStore::new();
        metadata
            .expect_write_metadata()
            .returning(|_| Err(anyhow::anyhow!("table unavailable")));
        let mut blobs = MockBlobStore::new();
        blobs.expect_write_blob().never();

        let service = MeditService::new(&config, Arc::new(metadata), Arc::new(blobs));
        let router = create_router(
            AppState {
                service: Arc::new(service),
            },
            &config.api,
        );

        let (status, response) = send_json(&router, post_request(json!({"body": "hi"}))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response["probs"], json!("dynamo"));
        assert!(response["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_get_without_id() {
        let router = memory_router();
        for uri in ["/medit", "/medit/"] {
            let (status, body) = send_json(&router, get_request(uri)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({}));
        }
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let router = memory_router();
        let (status, body) = send_json(&router, get_request("/medit/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_medits_defaults_to_empty_window() {
        let router = memory_router();
        send_json(&router, post_request(json!({"body": "hi"}))).await;

        let (status, body) = send_json(&router, get_request("/medits")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_medits_terse_and_detail() {
        let router = memory_router();
        let (_, ack) = send_json(
            &router,
            post_request(json!({"body": "hello world", "type": "note"})),
        )
        .await;
        let at = ack["at"].as_i64().unwrap();
        let window = format!("beginat={}&endat={}", at - 5, at + 5);

        let (_, terse) = send_json(&router, get_request(&format!("/medits?{window}"))).await;
        assert_eq!(terse, json!([ack.clone()]));

        let (_, detail) = send_json(
            &router,
            get_request(&format!("/medits?{window}&detail=TRUE&maxlen=5")),
        )
        .await;
        let row = &detail[0];
        assert_eq!(row["body"], json!("hello"));
        assert_eq!(row["type"], json!("note"));
        assert_eq!(row["id"], ack["id"]);
    }

    #[tokio::test]
    async fn test_medits_rejects_non_numeric_bounds() {
        let router = memory_router();
        let response = router
            .oneshot(get_request("/medits?beginat=yesterday"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_params_into_query() {
        let params = MeditsParams {
            beginat: 10,
            endat: 20,
            detail: Some("True".to_string()),
            max: -1,
            skip: 3,
            maxlen: 4,
        };

        assert_eq!(
            RangeQuery::from(params),
            RangeQuery {
                begin_at: 10,
                end_at: 20,
                detail: true,
                skip: 3,
                max: None,
                max_len: Some(4),
            }
        );
    }
}
