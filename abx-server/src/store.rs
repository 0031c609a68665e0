//! Test/Variant store - durable CRUD for experiments
//!
//! No business logic lives here; the allocator, recorder and scorer all
//! read and write through this layer.

use abx_common::db::{
    Event, Test, TestStatus, TestSummary, TestType, TestWithVariants, Variant, VariantKind,
};
use abx_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

/// Variant definition supplied at test creation
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub name: String,
    pub variant_kind: VariantKind,
    pub traffic_split: f64,
}

/// Filter for listing tests; all fields optional
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<TestStatus>,
    pub test_type: Option<TestType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Create a test in draft status together with its variants, atomically.
pub async fn create_test(
    pool: &SqlitePool,
    name: &str,
    test_type: TestType,
    variants: &[NewVariant],
) -> Result<TestWithVariants> {
    let test_id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO tests (id, name, test_type, status, created_at, updated_at)
         VALUES (?, ?, ?, 'draft', ?, ?)",
    )
    .bind(test_id.to_string())
    .bind(name)
    .bind(test_type.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for variant in variants {
        sqlx::query(
            "INSERT INTO variants (id, test_id, name, variant_kind, traffic_split, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(test_id.to_string())
        .bind(&variant.name)
        .bind(variant.variant_kind.as_str())
        .bind(variant.traffic_split)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("Created test {} with {} variants", test_id, variants.len());

    get_test(pool, test_id).await
}

/// Look up a test without treating absence as an error.
pub async fn find_test(pool: &SqlitePool, id: Uuid) -> Result<Option<Test>> {
    let row = sqlx::query(
        "SELECT id, name, test_type, status, winning_variant_id, start_date, end_date,
                created_at, updated_at
         FROM tests WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| test_from_row(&r)).transpose()
}

/// Fetch a test plus its variants ordered by variant kind.
pub async fn get_test(pool: &SqlitePool, id: Uuid) -> Result<TestWithVariants> {
    let test = find_test(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("test {}", id)))?;

    let variants = load_variants(pool, id).await?;

    Ok(TestWithVariants { test, variants })
}

/// Load all variants of a test, ordered by variant kind (control first).
pub async fn load_variants(pool: &SqlitePool, test_id: Uuid) -> Result<Vec<Variant>> {
    let rows = sqlx::query(
        "SELECT id, test_id, name, variant_kind, traffic_split, impressions, conversions,
                conversion_rate, revenue_generated, created_at
         FROM variants WHERE test_id = ? ORDER BY variant_kind",
    )
    .bind(test_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(variant_from_row).collect()
}

/// List tests with aggregated variant counters, newest first.
pub async fn list_tests(pool: &SqlitePool, filter: &ListFilter) -> Result<Vec<TestSummary>> {
    let rows = sqlx::query(
        "SELECT t.id, t.name, t.test_type, t.status, t.winning_variant_id,
                t.start_date, t.end_date, t.created_at, t.updated_at,
                COUNT(v.id) AS variant_count,
                COALESCE(SUM(v.impressions), 0) AS total_impressions,
                COALESCE(SUM(v.conversions), 0) AS total_conversions,
                COALESCE(AVG(v.conversion_rate), 0) AS avg_conversion_rate
         FROM tests t
         LEFT JOIN variants v ON v.test_id = t.id
         WHERE (?1 IS NULL OR t.status = ?1)
           AND (?2 IS NULL OR t.test_type = ?2)
         GROUP BY t.id
         ORDER BY t.created_at DESC, t.id
         LIMIT ?3 OFFSET ?4",
    )
    .bind(filter.status.map(|s| s.as_str().to_string()))
    .bind(filter.test_type.map(|t| t.as_str().to_string()))
    .bind(filter.limit.unwrap_or(-1)) // LIMIT -1 = no limit in SQLite
    .bind(filter.offset.unwrap_or(0))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TestSummary {
                test: test_from_row(row)?,
                variant_count: row.try_get("variant_count")?,
                total_impressions: row.try_get("total_impressions")?,
                total_conversions: row.try_get("total_conversions")?,
                avg_conversion_rate: row.try_get("avg_conversion_rate")?,
            })
        })
        .collect()
}

/// Update a test's status and the associated timestamp/winner fields.
///
/// Starting sets `start_date` only if it is not already set, so resuming
/// a paused test keeps the original start. Completing sets `end_date` and
/// the optional winner.
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: TestStatus,
    winning_variant_id: Option<Uuid>,
) -> Result<()> {
    let now = Utc::now();

    let result = match status {
        TestStatus::Running => {
            sqlx::query(
                "UPDATE tests SET status = ?, start_date = COALESCE(start_date, ?), updated_at = ?
                 WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(id.to_string())
            .execute(pool)
            .await?
        }
        TestStatus::Completed => {
            sqlx::query(
                "UPDATE tests SET status = ?, end_date = ?, winning_variant_id = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(winning_variant_id.map(|v| v.to_string()))
            .bind(now)
            .bind(id.to_string())
            .execute(pool)
            .await?
        }
        _ => {
            sqlx::query("UPDATE tests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now)
                .bind(id.to_string())
                .execute(pool)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("test {}", id)));
    }

    info!("Test {} status set to {}", id, status.as_str());
    Ok(())
}

/// Load the audit log of a test, oldest first.
pub async fn load_events(pool: &SqlitePool, test_id: Uuid) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        "SELECT id, test_id, variant_id, event_type, user_identifier, conversion_value,
                metadata, created_at
         FROM events WHERE test_id = ? ORDER BY created_at, id",
    )
    .bind(test_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Delete a test; variants and events cascade.
pub async fn delete_test(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM tests WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("test {}", id)));
    }

    info!("Deleted test {}", id);
    Ok(())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("invalid uuid in database: {}", e)))
}

fn test_from_row(row: &SqliteRow) -> Result<Test> {
    Ok(Test {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        test_type: row.try_get::<String, _>("test_type")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        winning_variant_id: row
            .try_get::<Option<String>, _>("winning_variant_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?,
        start_date: row.try_get::<Option<DateTime<Utc>>, _>("start_date")?,
        end_date: row.try_get::<Option<DateTime<Utc>>, _>("end_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn variant_from_row(row: &SqliteRow) -> Result<Variant> {
    Ok(Variant {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        test_id: parse_uuid(&row.try_get::<String, _>("test_id")?)?,
        name: row.try_get("name")?,
        variant_kind: row.try_get::<String, _>("variant_kind")?.parse()?,
        traffic_split: row.try_get("traffic_split")?,
        impressions: row.try_get("impressions")?,
        conversions: row.try_get("conversions")?,
        conversion_rate: row.try_get("conversion_rate")?,
        revenue_generated: row.try_get("revenue_generated")?,
        created_at: row.try_get("created_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    let metadata = row
        .try_get::<Option<String>, _>("metadata")?
        .map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| Error::Internal(format!("invalid metadata in database: {}", e)))
        })
        .transpose()?;

    Ok(Event {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        test_id: parse_uuid(&row.try_get::<String, _>("test_id")?)?,
        variant_id: parse_uuid(&row.try_get::<String, _>("variant_id")?)?,
        event_type: row.try_get::<String, _>("event_type")?.parse()?,
        user_identifier: row.try_get("user_identifier")?,
        conversion_value: row.try_get("conversion_value")?,
        metadata,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use abx_common::db::init_memory_database;

    fn two_variants() -> Vec<NewVariant> {
        vec![
            NewVariant {
                name: "Original".to_string(),
                variant_kind: VariantKind::Control,
                traffic_split: 50.0,
            },
            NewVariant {
                name: "Challenger".to_string(),
                variant_kind: VariantKind::VariantA,
                traffic_split: 50.0,
            },
        ]
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let pool = init_memory_database().await.unwrap();

        let created = create_test(&pool, "Hero copy", TestType::LandingPage, &two_variants())
            .await
            .unwrap();

        assert_eq!(created.test.name, "Hero copy");
        assert_eq!(created.test.status, TestStatus::Draft);
        assert_eq!(created.variants.len(), 2);
        // Control always sorts first
        assert_eq!(created.variants[0].variant_kind, VariantKind::Control);
        assert_eq!(created.variants[0].impressions, 0);

        let fetched = get_test(&pool, created.test.id).await.unwrap();
        assert_eq!(fetched.test.id, created.test.id);
    }

    #[tokio::test]
    async fn get_missing_test_is_not_found() {
        let pool = init_memory_database().await.unwrap();

        let err = get_test(&pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_tests_aggregates_variant_counters() {
        let pool = init_memory_database().await.unwrap();

        let created = create_test(&pool, "Subject line", TestType::EmailSubject, &two_variants())
            .await
            .unwrap();
        sqlx::query("UPDATE variants SET impressions = 10, conversions = 3 WHERE test_id = ?")
            .bind(created.test.id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let all = list_tests(&pool, &ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].variant_count, 2);
        assert_eq!(all[0].total_impressions, 20);
        assert_eq!(all[0].total_conversions, 6);
    }

    #[tokio::test]
    async fn list_tests_filters_by_status_and_type() {
        let pool = init_memory_database().await.unwrap();

        let a = create_test(&pool, "A", TestType::LandingPage, &two_variants())
            .await
            .unwrap();
        create_test(&pool, "B", TestType::EmailContent, &two_variants())
            .await
            .unwrap();
        set_status(&pool, a.test.id, TestStatus::Running, None)
            .await
            .unwrap();

        let running = list_tests(
            &pool,
            &ListFilter {
                status: Some(TestStatus::Running),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].test.id, a.test.id);

        let email = list_tests(
            &pool,
            &ListFilter {
                test_type: Some(TestType::EmailContent),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(email.len(), 1);
        assert_eq!(email[0].test.name, "B");
    }

    #[tokio::test]
    async fn start_sets_start_date_once() {
        let pool = init_memory_database().await.unwrap();

        let created = create_test(&pool, "T", TestType::LandingPage, &two_variants())
            .await
            .unwrap();

        set_status(&pool, created.test.id, TestStatus::Running, None)
            .await
            .unwrap();
        let started = get_test(&pool, created.test.id).await.unwrap();
        let first_start = started.test.start_date.expect("start_date set");

        set_status(&pool, created.test.id, TestStatus::Paused, None)
            .await
            .unwrap();
        set_status(&pool, created.test.id, TestStatus::Running, None)
            .await
            .unwrap();
        let resumed = get_test(&pool, created.test.id).await.unwrap();
        assert_eq!(resumed.test.start_date, Some(first_start));
    }

    #[tokio::test]
    async fn complete_records_winner_and_end_date() {
        let pool = init_memory_database().await.unwrap();

        let created = create_test(&pool, "T", TestType::LandingPage, &two_variants())
            .await
            .unwrap();
        let winner = created.variants[1].id;

        set_status(&pool, created.test.id, TestStatus::Completed, Some(winner))
            .await
            .unwrap();

        let done = get_test(&pool, created.test.id).await.unwrap();
        assert_eq!(done.test.status, TestStatus::Completed);
        assert_eq!(done.test.winning_variant_id, Some(winner));
        assert!(done.test.end_date.is_some());
    }

    #[tokio::test]
    async fn delete_cascades_to_variants() {
        let pool = init_memory_database().await.unwrap();

        let created = create_test(&pool, "T", TestType::LandingPage, &two_variants())
            .await
            .unwrap();

        delete_test(&pool, created.test.id).await.unwrap();

        let err = get_test(&pool, created.test.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants WHERE test_id = ?")
            .bind(created.test.id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn status_update_on_missing_test_is_not_found() {
        let pool = init_memory_database().await.unwrap();

        let err = set_status(&pool, Uuid::new_v4(), TestStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
