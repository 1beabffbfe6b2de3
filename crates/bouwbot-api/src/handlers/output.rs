use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Serve a generated GeoJSON export. The filename is a single path segment;
/// anything that could escape the output directory is rejected outright.
pub async fn serve_output(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || !filename.ends_with(".geojson")
    {
        return Err(ApiError::bad_request("Invalid output filename"));
    }

    let path = state.output_dir.join(&filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("No such export: {}", filename)))?;

    Ok(([(header::CONTENT_TYPE, "application/geo+json")], bytes).into_response())
}
