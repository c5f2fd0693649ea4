use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Aggregation period used when the window spans a full day or more.
pub const DAILY_PERIOD_SECS: i32 = 86_400;
/// Aggregation period used for interval reports.
pub const HOURLY_PERIOD_SECS: i32 = 3_600;

/// Monitored infrastructure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Ec2,
    CloudwatchAgent,
    S3,
    Alb,
    Cloudfront,
    Dynamodb,
    Rds,
    Waf,
    CloudwatchLogs,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Ec2,
        ResourceKind::CloudwatchAgent,
        ResourceKind::S3,
        ResourceKind::Alb,
        ResourceKind::Cloudfront,
        ResourceKind::Dynamodb,
        ResourceKind::Rds,
        ResourceKind::Waf,
        ResourceKind::CloudwatchLogs,
    ];

    /// Key used for this kind in configuration and metrics documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ec2 => "ec2",
            ResourceKind::CloudwatchAgent => "cloudwatchAgent",
            ResourceKind::S3 => "s3",
            ResourceKind::Alb => "alb",
            ResourceKind::Cloudfront => "cloudfront",
            ResourceKind::Dynamodb => "dynamodb",
            ResourceKind::Rds => "rds",
            ResourceKind::Waf => "waf",
            ResourceKind::CloudwatchLogs => "cloudwatchLogs",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }

    /// Payload shape a collector must deliver for this kind.
    pub fn expected_shape(&self) -> PayloadShape {
        match self {
            ResourceKind::Dynamodb => PayloadShape::Nested,
            ResourceKind::CloudwatchLogs => PayloadShape::Counts,
            _ => PayloadShape::Flat,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Flat,
    Nested,
    Counts,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            PayloadShape::Flat => "flat metric mapping",
            PayloadShape::Nested => "per-resource metric mapping",
            PayloadShape::Counts => "per-resource severity counts",
        };
        f.write_str(value)
    }
}

/// Metric name to value.
pub type FlatMetrics = BTreeMap<String, f64>;
/// Resource name (table) to its flat metrics.
pub type NestedMetrics = BTreeMap<String, FlatMetrics>;
/// Severity level (`info`, `warn`, `error`) to occurrence count.
pub type LogCounts = BTreeMap<String, u64>;
/// Log group name to its severity counts.
pub type CountMetrics = BTreeMap<String, LogCounts>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    Flat(FlatMetrics),
    Nested(NestedMetrics),
    Counts(CountMetrics),
}

impl MetricsPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            MetricsPayload::Flat(_) => PayloadShape::Flat,
            MetricsPayload::Nested(_) => PayloadShape::Nested,
            MetricsPayload::Counts(_) => PayloadShape::Counts,
        }
    }
}

/// A metrics payload did not match the shape its resource kind requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("metrics for {kind} must be a {expected}, got a {found}")]
pub struct DataShapeError {
    pub kind: ResourceKind,
    pub expected: PayloadShape,
    pub found: PayloadShape,
}

/// Collected metrics keyed by resource kind. Payload shapes are checked on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsBag {
    entries: BTreeMap<ResourceKind, MetricsPayload>,
}

impl MetricsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        kind: ResourceKind,
        payload: MetricsPayload,
    ) -> Result<(), DataShapeError> {
        let expected = kind.expected_shape();
        let found = payload.shape();
        if expected != found {
            return Err(DataShapeError {
                kind,
                expected,
                found,
            });
        }
        self.entries.insert(kind, payload);
        Ok(())
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&MetricsPayload> {
        self.entries.get(&kind)
    }

    pub fn flat(&self, kind: ResourceKind) -> Result<Option<&FlatMetrics>, DataShapeError> {
        match self.entries.get(&kind) {
            None => Ok(None),
            Some(MetricsPayload::Flat(metrics)) => Ok(Some(metrics)),
            Some(other) => Err(DataShapeError {
                kind,
                expected: PayloadShape::Flat,
                found: other.shape(),
            }),
        }
    }

    pub fn nested(&self, kind: ResourceKind) -> Result<Option<&NestedMetrics>, DataShapeError> {
        match self.entries.get(&kind) {
            None => Ok(None),
            Some(MetricsPayload::Nested(metrics)) => Ok(Some(metrics)),
            Some(other) => Err(DataShapeError {
                kind,
                expected: PayloadShape::Nested,
                found: other.shape(),
            }),
        }
    }

    pub fn counts(&self, kind: ResourceKind) -> Result<Option<&CountMetrics>, DataShapeError> {
        match self.entries.get(&kind) {
            None => Ok(None),
            Some(MetricsPayload::Counts(metrics)) => Ok(Some(metrics)),
            Some(other) => Err(DataShapeError {
                kind,
                expected: PayloadShape::Counts,
                found: other.shape(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ResourceKind, MetricsPayload> {
        self.entries.iter()
    }
}

/// Time range covered by one report invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_daily: bool,
}

impl ReportWindow {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, is_daily: bool) -> Option<Self> {
        (start < end).then_some(Self {
            start,
            end,
            is_daily,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_daily(&self) -> bool {
        self.is_daily
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Aggregation granularity for metric queries, derived from the window span.
    pub fn period_seconds(&self) -> i32 {
        if self.span() >= Duration::hours(24) {
            DAILY_PERIOD_SECS
        } else {
            HOURLY_PERIOD_SECS
        }
    }
}

/// Data collection context handed to every provider.
#[derive(Debug, Clone, Copy)]
pub struct CollectionContext {
    window: ReportWindow,
}

impl CollectionContext {
    pub fn new(window: ReportWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &ReportWindow {
        &self.window
    }
}

/// Provider metadata used for logging.
#[derive(Debug, Clone, Copy)]
pub struct ProviderMetadata {
    pub kind: ResourceKind,
    pub title: &'static str,
    pub description: &'static str,
}

/// Common interface for metrics sources, one per resource kind.
pub trait MetricsProvider: Send + Sync {
    fn metadata(&self) -> ProviderMetadata;
    fn collect(&self, ctx: &CollectionContext) -> Result<MetricsPayload>;
}
