//! Traffic allocator - weighted random variant selection
//!
//! Selection is stateless per call: the same user may be shown different
//! variants on repeat calls. A `user_identifier` is accepted by the API
//! and stored with recorded events, but it does not influence selection.

use abx_common::db::{TestStatus, Variant};
use abx_common::Result;
use rand::Rng;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::store;

/// Select a variant for a request against a running test.
///
/// Returns `None` when the test is absent, not running, or has no
/// variants; callers must treat `None` as "do not run test logic here".
pub async fn select_variant(
    pool: &SqlitePool,
    test_id: Uuid,
    _user_identifier: Option<&str>,
) -> Result<Option<Variant>> {
    let test = match store::find_test(pool, test_id).await? {
        Some(test) => test,
        None => return Ok(None),
    };

    if test.status != TestStatus::Running {
        debug!("Test {} not running ({}), skipping allocation", test_id, test.status.as_str());
        return Ok(None);
    }

    let variants = store::load_variants(pool, test_id).await?;
    if variants.is_empty() {
        return Ok(None);
    }

    let r = rand::thread_rng().gen_range(0.0..100.0);
    // Non-empty variant list always yields an index
    let index = pick_index(&variants, r).unwrap_or(0);

    debug!(
        "Allocated variant {} ({}) for test {} (r={:.2})",
        variants[index].id,
        variants[index].variant_kind.as_str(),
        test_id,
        r
    );

    Ok(Some(variants[index].clone()))
}

/// Cumulative traffic-split walk over variants in iteration order.
///
/// Returns the first variant whose running total reaches `r`. If the
/// splits sum below 100 (or a float edge leaves `r` uncovered), falls
/// back to the first variant. Empty input returns `None`.
pub fn pick_index(variants: &[Variant], r: f64) -> Option<usize> {
    if variants.is_empty() {
        return None;
    }

    let mut cumulative = 0.0;
    for (index, variant) in variants.iter().enumerate() {
        cumulative += variant.traffic_split;
        if r <= cumulative {
            return Some(index);
        }
    }

    // Splits sum to < 100: uncovered draws go to the first variant
    Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abx_common::db::{init_memory_database, VariantKind};
    use crate::store::{self, NewVariant};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn variant(kind: VariantKind, split: f64) -> Variant {
        Variant {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            name: kind.as_str().to_string(),
            variant_kind: kind,
            traffic_split: split,
            impressions: 0,
            conversions: 0,
            conversion_rate: 0.0,
            revenue_generated: 0.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pick_index_walks_cumulative_splits() {
        let variants = vec![
            variant(VariantKind::Control, 50.0),
            variant(VariantKind::VariantA, 30.0),
            variant(VariantKind::VariantB, 20.0),
        ];

        assert_eq!(pick_index(&variants, 0.0), Some(0));
        assert_eq!(pick_index(&variants, 50.0), Some(0)); // boundary is inclusive
        assert_eq!(pick_index(&variants, 50.1), Some(1));
        assert_eq!(pick_index(&variants, 80.0), Some(1));
        assert_eq!(pick_index(&variants, 80.1), Some(2));
        assert_eq!(pick_index(&variants, 99.9), Some(2));
    }

    #[test]
    fn pick_index_falls_back_to_first_when_under_allocated() {
        let variants = vec![
            variant(VariantKind::Control, 30.0),
            variant(VariantKind::VariantA, 30.0),
        ];

        // Draws beyond the 60% covered fall back to the first variant
        assert_eq!(pick_index(&variants, 75.0), Some(0));
    }

    #[test]
    fn pick_index_empty_returns_none() {
        assert_eq!(pick_index(&[], 10.0), None);
    }

    #[test]
    fn selection_approximates_traffic_splits() {
        let variants = vec![
            variant(VariantKind::Control, 50.0),
            variant(VariantKind::VariantA, 50.0),
        ];

        let mut rng = StdRng::seed_from_u64(42);
        let trials = 10_000;
        let mut control_hits = 0usize;

        for _ in 0..trials {
            let r: f64 = rng.gen_range(0.0..100.0);
            if pick_index(&variants, r) == Some(0) {
                control_hits += 1;
            }
        }

        // Binomial(10000, 0.5): sigma = 50, so 5000 +/- 250 is a 5-sigma band
        assert!(
            (4750..=5250).contains(&control_hits),
            "control hit {} of {} trials",
            control_hits,
            trials
        );
    }

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
    async fn select_on_missing_test_returns_none() {
        let pool = init_memory_database().await.unwrap();

        let picked = select_variant(&pool, Uuid::new_v4(), None).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn select_on_non_running_test_returns_none() {
        let pool = init_memory_database().await.unwrap();

        let created =
            store::create_test(&pool, "T", abx_common::db::TestType::LandingPage, &two_variants())
                .await
                .unwrap();

        // Draft
        assert!(select_variant(&pool, created.test.id, None).await.unwrap().is_none());

        // Paused
        store::set_status(&pool, created.test.id, TestStatus::Running, None)
            .await
            .unwrap();
        store::set_status(&pool, created.test.id, TestStatus::Paused, None)
            .await
            .unwrap();
        assert!(select_variant(&pool, created.test.id, None).await.unwrap().is_none());

        // Completed
        store::set_status(&pool, created.test.id, TestStatus::Completed, None)
            .await
            .unwrap();
        assert!(select_variant(&pool, created.test.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn select_on_running_test_returns_an_owned_variant() {
        let pool = init_memory_database().await.unwrap();

        let created =
            store::create_test(&pool, "T", abx_common::db::TestType::LandingPage, &two_variants())
                .await
                .unwrap();
        store::set_status(&pool, created.test.id, TestStatus::Running, None)
            .await
            .unwrap();

        for _ in 0..20 {
            let picked = select_variant(&pool, created.test.id, Some("visitor-1"))
                .await
                .unwrap()
                .expect("running test with variants allocates");
            assert!(created.variants.iter().any(|v| v.id == picked.id));
        }
    }
}
