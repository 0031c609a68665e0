//! Results scorer - descriptive metrics and significance vs. control
//!
//! The significance test is a simplified two-proportion z-test at the
//! 95% threshold (z > 1.96). The confidence figure is the historical
//! `min(99.9, (1 - e^(-z)) * 100)` mapping, kept verbatim for
//! compatibility with existing data; it is not a p-value inversion.

use abx_common::db::{Test, Variant, VariantKind};
use abx_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store;

/// Two-tailed 95% confidence threshold
const Z_THRESHOLD: f64 = 1.96;

/// Cap for the reported confidence percentage
const CONFIDENCE_CAP: f64 = 99.9;

/// Variant with its calculated per-row metrics
#[derive(Debug, Clone, Serialize)]
pub struct VariantResult {
    #[serde(flatten)]
    pub variant: Variant,
    pub calculated_conversion_rate: f64,
    pub average_order_value: f64,
}

/// Significance of one non-control variant against the control
#[derive(Debug, Clone, Serialize)]
pub struct Significance {
    pub variant_id: Uuid,
    pub variant_name: String,
    pub z_score: f64,
    pub is_significant: bool,
    pub confidence: f64,
}

/// Full results report for a test
#[derive(Debug, Clone, Serialize)]
pub struct TestResults {
    pub test: Test,
    pub variants: Vec<VariantResult>,
    pub significance: Vec<Significance>,
}

/// Compute the results report for a running or completed test.
pub async fn get_results(pool: &SqlitePool, test_id: Uuid) -> Result<TestResults> {
    let with_variants = store::get_test(pool, test_id).await?;

    Ok(score(with_variants.test, with_variants.variants))
}

/// Pure scoring over already-loaded rows.
pub fn score(test: Test, variants: Vec<Variant>) -> TestResults {
    let control = variants
        .iter()
        .find(|v| v.variant_kind == VariantKind::Control)
        .cloned();

    let significance = match &control {
        Some(control) => variants
            .iter()
            .filter(|v| v.variant_kind != VariantKind::Control)
            .map(|v| significance_vs_control(control, v))
            .collect(),
        // No control variant: nothing to compare against
        None => Vec::new(),
    };

    let variants = variants
        .into_iter()
        .map(|variant| VariantResult {
            calculated_conversion_rate: conversion_rate(variant.conversions, variant.impressions),
            average_order_value: average_order_value(variant.revenue_generated, variant.conversions),
            variant,
        })
        .collect();

    TestResults {
        test,
        variants,
        significance,
    }
}

/// conversions / impressions * 100, guarding the zero-impression case
pub fn conversion_rate(conversions: i64, impressions: i64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    conversions as f64 / impressions as f64 * 100.0
}

/// revenue / conversions, guarding the zero-conversion case
pub fn average_order_value(revenue: f64, conversions: i64) -> f64 {
    if conversions == 0 {
        return 0.0;
    }
    revenue / conversions as f64
}

fn significance_vs_control(control: &Variant, candidate: &Variant) -> Significance {
    let z = z_score(
        control.conversions,
        control.impressions,
        candidate.conversions,
        candidate.impressions,
    );

    Significance {
        variant_id: candidate.id,
        variant_name: candidate.name.clone(),
        z_score: z,
        is_significant: z > Z_THRESHOLD,
        confidence: confidence_from_z(z),
    }
}

/// Simplified two-proportion z-score; 0 when either side has no
/// impressions or the pooled standard error collapses to 0.
pub fn z_score(
    control_conversions: i64,
    control_impressions: i64,
    variant_conversions: i64,
    variant_impressions: i64,
) -> f64 {
    if control_impressions == 0 || variant_impressions == 0 {
        return 0.0;
    }

    let n1 = control_impressions as f64;
    let n2 = variant_impressions as f64;
    let p1 = control_conversions as f64 / n1;
    let p2 = variant_conversions as f64 / n2;

    let pooled = (control_conversions + variant_conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 {
        return 0.0;
    }

    (p2 - p1).abs() / se
}

/// Historical confidence mapping; see module docs.
pub fn confidence_from_z(z: f64) -> f64 {
    CONFIDENCE_CAP.min((1.0 - (-z).exp()) * 100.0)
}
