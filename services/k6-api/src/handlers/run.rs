//! POST /k6/run - run a load test and return its report.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use k6_script::TestParameters;

use crate::error::ApiError;
use crate::runner::ReportArtifact;
use crate::state::AppState;

/// Attachment name offered to browsers for the report.
pub const REPORT_DISPOSITION: &str = "attachment; filename=\"k6-report.html\"";

/// POST /k6/run
pub async fn run_test_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<TestParameters>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(params) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let artifact = state.execute(&params).await?;

    Ok(report_response(artifact))
}

fn report_response(artifact: ReportArtifact) -> Response {
    match artifact {
        ReportArtifact::Html(html) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/html"),
                (header::CONTENT_DISPOSITION, REPORT_DISPOSITION),
            ],
            html,
        )
            .into_response(),
        missing @ ReportArtifact::Missing => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            missing.into_bytes(),
        )
            .into_response(),
    }
}
