//! OpenAPI definition handler.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// OpenAPI 3.0 description of the k6 API
const OPENAPI_SPEC: &str = include_str!("../../openapi.yaml");

/// GET /api - OpenAPI definition
pub async fn api_handler() -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/yaml"),
            (header::CACHE_CONTROL, "max-age=3600"),
        ],
        OPENAPI_SPEC,
    )
        .into_response()
}
