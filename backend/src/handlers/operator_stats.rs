use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::AppState;
use crate::services::operator_stats::{OutputFormat, analyze_to_json};
use crate::utils::ApiError;

/// Raw operator rows for one query
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Rows as returned by the profiler's operator statistics function
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Value>,
    /// Overrides the configured default layout
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(analyze_operator_stats, health),
    components(schemas(AnalyzeRequest, OutputFormat, HealthResponse)),
    tags((name = "Operator Stats", description = "Query plan diagnostics"))
)]
pub struct ApiDoc;

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

// Analyze the operator statistics of one query
#[utoipa::path(
    post,
    path = "/api/queries/{query_id}/operator-stats/analyze",
    params(
        ("query_id" = String, Path, description = "Query ID (UUID)")
    ),
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Diagnostic payload"),
        (status = 400, description = "Invalid query ID or request body"),
        (status = 404, description = "No operator statistics for the query"),
        (status = 500, description = "Internal analysis failure")
    ),
    tag = "Operator Stats"
)]
pub async fn analyze_operator_stats(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
    request: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            tracing::debug!("Rejected request body for query {}: {}", query_id, rejection);
            return ApiError::invalid_input(rejection.body_text()).into_response();
        },
    };

    let options = state.config.analysis_options(request.format);
    tracing::debug!(
        "Analyzing {} operator rows for query {} ({})",
        request.rows.len(),
        query_id,
        options.format.as_str()
    );

    let (status, body) = analyze_to_json(&query_id, &request.rows, &options);
    json_response(status, body)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "Operator Stats"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::{AppState, build_router};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        build_router(Arc::new(AppState { config: Config::default() }))
    }

    async fn post(uri: &str, body: String) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn analyze_uri(query_id: &str) -> String {
        format!("/api/queries/{}/operator-stats/analyze", query_id)
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let query_id = uuid::Uuid::new_v4().to_string();
        let body = json!({
            "rows": [
                {"operator_id": 0, "operator_type": "Result", "operator_statistics": {"input_rows": 3}},
                {"operator_id": 1, "operator_type": "Join", "parent_operators": [0],
                 "operator_statistics": {"input_rows": 100, "output_rows": 1500}}
            ],
            "format": "expanded"
        });

        let (status, payload) = post(&analyze_uri(&query_id), body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["query_id"], query_id.as_str());
        assert_eq!(payload["operators"].as_array().unwrap().len(), 2);
        assert_eq!(payload["summary_metrics"]["final_output_rows"], 3);
        assert_eq!(payload["classification"]["join_multiplication"], "CRITICAL");
    }

    #[tokio::test]
    async fn test_invalid_query_id_is_bad_request() {
        let (status, payload) = post(&analyze_uri("not-a-uuid"), json!({"rows": []}).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["kind"], "validation");
    }

    #[tokio::test]
    async fn test_empty_rows_is_not_found() {
        let query_id = uuid::Uuid::new_v4().to_string();
        let (status, payload) = post(&analyze_uri(&query_id), json!({"rows": []}).to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let query_id = uuid::Uuid::new_v4().to_string();
        let (status, payload) = post(&analyze_uri(&query_id), "{\"rows\": 5}".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["code"], 4002);
    }

    #[tokio::test]
    async fn test_health_and_openapi() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc["paths"]["/api/queries/{query_id}/operator-stats/analyze"].is_object());
    }
}
