//! Domain models for tests, variants and events
//!
//! The enum-like columns (`test_type`, `status`, `variant_kind`,
//! `event_type`) are stored as TEXT and modeled as closed enums here.
//! Unknown values are rejected at the HTTP boundary with `InvalidInput`.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// What an experiment is comparing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    LandingPage,
    EmailSubject,
    EmailContent,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::LandingPage => "landing_page",
            TestType::EmailSubject => "email_subject",
            TestType::EmailContent => "email_content",
        }
    }
}

impl FromStr for TestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "landing_page" => Ok(TestType::LandingPage),
            "email_subject" => Ok(TestType::EmailSubject),
            "email_content" => Ok(TestType::EmailContent),
            other => Err(Error::InvalidInput(format!("unknown test type: {}", other))),
        }
    }
}

/// Lifecycle state of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Draft => "draft",
            TestStatus::Running => "running",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
        }
    }
}

impl FromStr for TestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(TestStatus::Draft),
            "running" => Ok(TestStatus::Running),
            "paused" => Ok(TestStatus::Paused),
            "completed" => Ok(TestStatus::Completed),
            other => Err(Error::InvalidInput(format!("unknown test status: {}", other))),
        }
    }
}

/// Treatment arm identity within a test
///
/// Variant kinds sort lexically in the order control, variant_a,
/// variant_b, variant_c, which the store relies on for deterministic
/// variant ordering (`ORDER BY variant_kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Control,
    VariantA,
    VariantB,
    VariantC,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Control => "control",
            VariantKind::VariantA => "variant_a",
            VariantKind::VariantB => "variant_b",
            VariantKind::VariantC => "variant_c",
        }
    }
}

impl FromStr for VariantKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "control" => Ok(VariantKind::Control),
            "variant_a" => Ok(VariantKind::VariantA),
            "variant_b" => Ok(VariantKind::VariantB),
            "variant_c" => Ok(VariantKind::VariantC),
            other => Err(Error::InvalidInput(format!("unknown variant kind: {}", other))),
        }
    }
}

/// Kind of recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impression,
    Conversion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "impression",
            EventKind::Conversion => "conversion",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "impression" => Ok(EventKind::Impression),
            "conversion" => Ok(EventKind::Conversion),
            other => Err(Error::InvalidInput(format!("unknown event type: {}", other))),
        }
    }
}

/// A/B test record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub id: Uuid,
    pub name: String,
    pub test_type: TestType,
    pub status: TestStatus,
    pub winning_variant_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Treatment arm of a test, with its running counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub test_id: Uuid,
    pub name: String,
    pub variant_kind: VariantKind,
    pub traffic_split: f64,
    pub impressions: i64,
    pub conversions: i64,
    pub conversion_rate: f64,
    pub revenue_generated: f64,
    pub created_at: DateTime<Utc>,
}

/// Test plus its variants, ordered by variant kind
#[derive(Debug, Clone, Serialize)]
pub struct TestWithVariants {
    #[serde(flatten)]
    pub test: Test,
    pub variants: Vec<Variant>,
}

/// Test row with aggregated variant counters, as returned by list queries
#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    #[serde(flatten)]
    pub test: Test,
    pub variant_count: i64,
    pub total_impressions: i64,
    pub total_conversions: i64,
    pub avg_conversion_rate: f64,
}

/// Append-only audit record of a single impression or conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub test_id: Uuid,
    pub variant_id: Uuid,
    pub event_type: EventKind,
    pub user_identifier: Option<String>,
    pub conversion_value: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
