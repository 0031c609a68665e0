//! Event recording and variant allocation endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use abx_common::db::EventKind;
use abx_common::Error;

use crate::api::error::{invalid, ApiError};
use crate::{allocator, recorder, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub variant_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub user_identifier: Option<String>,
    pub conversion_value: Option<f64>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectVariantQuery {
    pub user_identifier: Option<String>,
}

/// POST /tests/:id/event
///
/// Appends an audit event and bumps the variant counters. Requires
/// variantId and eventType.
pub async fn record_event(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<Value>, ApiError> {
    let variant_id = req.variant_id.ok_or_else(|| invalid("variantId is required"))?;

    let kind: EventKind = req
        .event_type
        .as_deref()
        .ok_or_else(|| invalid("eventType is required"))?
        .parse()?;

    recorder::record_event(
        &state.db,
        test_id,
        variant_id,
        kind,
        recorder::EventDetails {
            user_identifier: req.user_identifier,
            conversion_value: req.conversion_value,
            metadata: req.metadata,
        },
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

/// GET /tests/:id/variant?userIdentifier=
///
/// Allocates a variant for a running test; 404 when the test is absent,
/// not running, or has no variants.
pub async fn get_variant(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
    Query(query): Query<SelectVariantQuery>,
) -> Result<Json<Value>, ApiError> {
    let variant =
        allocator::select_variant(&state.db, test_id, query.user_identifier.as_deref())
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("no active variant for test {}", test_id))
            })?;

    Ok(Json(json!({ "variant": variant })))
}
