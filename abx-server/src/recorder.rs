//! Event recorder - append audit events and bump variant counters
//!
//! The event insert and the counter update share one transaction, and
//! each counter mutation is a single relative-increment UPDATE, so
//! concurrent events never lose updates and the audit log cannot drift
//! from the counters.

use abx_common::db::EventKind;
use abx_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Everything recorded alongside an impression or conversion
#[derive(Debug, Clone, Default)]
pub struct EventDetails {
    pub user_identifier: Option<String>,
    pub conversion_value: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

/// Record one event against a variant of a test.
///
/// Impressions bump `impressions` by 1. Conversions bump `conversions`
/// by 1, add `conversion_value` (default 0) to `revenue_generated`, and
/// recompute the stored `conversion_rate`. Fails with `NotFound` when
/// the variant does not exist or is not owned by the test.
pub async fn record_event(
    pool: &SqlitePool,
    test_id: Uuid,
    variant_id: Uuid,
    kind: EventKind,
    details: EventDetails,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let updated = match kind {
        EventKind::Impression => {
            sqlx::query(
                "UPDATE variants SET impressions = impressions + 1
                 WHERE id = ? AND test_id = ?",
            )
            .bind(variant_id.to_string())
            .bind(test_id.to_string())
            .execute(&mut *tx)
            .await?
        }
        EventKind::Conversion => {
            // Right-hand column references read pre-update values, so
            // `conversions + 1` is the post-increment count while
            // `impressions` is the pre-increment count. That asymmetry in
            // the stored rate is kept for compatibility with historical
            // rows; scoring recomputes its own rate from the raw counters.
            sqlx::query(
                "UPDATE variants SET
                     conversions = conversions + 1,
                     revenue_generated = revenue_generated + ?,
                     conversion_rate = CAST(conversions + 1 AS REAL) / MAX(impressions, 1) * 100.0
                 WHERE id = ? AND test_id = ?",
            )
            .bind(details.conversion_value.unwrap_or(0.0))
            .bind(variant_id.to_string())
            .bind(test_id.to_string())
            .execute(&mut *tx)
            .await?
        }
    };

    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "variant {} for test {}",
            variant_id, test_id
        )));
    }

    sqlx::query(
        "INSERT INTO events (id, test_id, variant_id, event_type, user_identifier, conversion_value, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(test_id.to_string())
    .bind(variant_id.to_string())
    .bind(kind.as_str())
    .bind(details.user_identifier)
    .bind(details.conversion_value)
    .bind(details.metadata.map(|m| m.to_string()))
    .bind(chrono::Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Recorded {} for variant {} of test {}",
        kind.as_str(),
        variant_id,
        test_id
    );

    Ok(())
}
