//! Results reporting endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::scorer::{self, TestResults};
use crate::AppState;

/// GET /tests/:id/results
///
/// Returns the test, its variants with calculated metrics, and the
/// significance of each non-control variant against the control.
pub async fn get_results(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<Json<TestResults>, ApiError> {
    let results = scorer::get_results(&state.db, test_id).await?;

    Ok(Json(results))
}
