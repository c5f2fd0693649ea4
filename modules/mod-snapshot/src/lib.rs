use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, anyhow, bail};
use serde_json::{Map, Value};
use telegraws_sdk::{
    CollectionContext, CountMetrics, FlatMetrics, LogCounts, MetricsPayload, MetricsProvider,
    NestedMetrics, PayloadShape, ProviderMetadata, ResourceKind,
};

/// Replays metric values recorded in a JSON snapshot for one resource kind.
struct SnapshotProvider {
    kind: ResourceKind,
    payload: MetricsPayload,
}

impl MetricsProvider for SnapshotProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            kind: self.kind,
            title: "Metrics snapshot",
            description: "Recorded metric values replayed from a JSON document",
        }
    }

    fn collect(&self, ctx: &CollectionContext) -> Result<MetricsPayload> {
        tracing::debug!(
            kind = %self.kind,
            period_seconds = ctx.window().period_seconds(),
            "replaying snapshot metrics"
        );
        Ok(self.payload.clone())
    }
}

pub fn providers_from_path(path: &Path) -> Result<Vec<Box<dyn MetricsProvider>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read metrics snapshot {}", path.display()))?;
    providers_from_str(&raw)
        .with_context(|| format!("invalid metrics snapshot {}", path.display()))
}

/// Builds one provider per resource kind present in the snapshot document.
///
/// Payload shapes are inferred from the JSON, not from the kind, so a document
/// with the wrong structure surfaces as a shape error when the bag is assembled.
pub fn providers_from_str(raw: &str) -> Result<Vec<Box<dyn MetricsProvider>>> {
    let document: Value = serde_json::from_str(raw).context("snapshot is not valid JSON")?;
    let Value::Object(entries) = document else {
        bail!("snapshot must be a JSON object keyed by resource kind");
    };

    let mut providers: Vec<Box<dyn MetricsProvider>> = Vec::new();
    for (key, value) in &entries {
        let Some(kind) = ResourceKind::from_key(key) else {
            tracing::debug!(key = key.as_str(), "ignoring unknown resource kind in snapshot");
            continue;
        };
        let payload = parse_payload(kind, value).with_context(|| format!("snapshot entry `{}`", key))?;
        providers.push(Box::new(SnapshotProvider { kind, payload }));
    }

    Ok(providers)
}

fn parse_payload(kind: ResourceKind, value: &Value) -> Result<MetricsPayload> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("expected an object, got {}", json_type(value)))?;

    if object.is_empty() {
        return Ok(empty_payload(kind));
    }

    if object.values().all(Value::is_object) {
        if kind == ResourceKind::CloudwatchLogs {
            return parse_counts(object).map(MetricsPayload::Counts);
        }
        let mut nested = NestedMetrics::new();
        for (name, inner) in object {
            let Some(inner) = inner.as_object() else {
                continue;
            };
            let metrics = parse_flat(inner).with_context(|| format!("resource `{}`", name))?;
            nested.insert(name.clone(), metrics);
        }
        return Ok(MetricsPayload::Nested(nested));
    }

    parse_flat(object).map(MetricsPayload::Flat)
}

fn empty_payload(kind: ResourceKind) -> MetricsPayload {
    match kind.expected_shape() {
        PayloadShape::Flat => MetricsPayload::Flat(FlatMetrics::new()),
        PayloadShape::Nested => MetricsPayload::Nested(NestedMetrics::new()),
        PayloadShape::Counts => MetricsPayload::Counts(CountMetrics::new()),
    }
}

fn parse_flat(object: &Map<String, Value>) -> Result<FlatMetrics> {
    object
        .iter()
        .map(|(name, value)| {
            value
                .as_f64()
                .map(|number| (name.clone(), number))
                .ok_or_else(|| anyhow!("metric `{}` must be a number, got {}", name, json_type(value)))
        })
        .collect()
}

fn parse_counts(object: &Map<String, Value>) -> Result<CountMetrics> {
    let mut groups = CountMetrics::new();
    for (group, levels) in object {
        let Some(levels) = levels.as_object() else {
            bail!("log group `{}` must map severity levels to counts", group);
        };
        let counts = levels
            .iter()
            .map(|(level, value)| {
                value.as_u64().map(|n| (level.clone(), n)).ok_or_else(|| {
                    anyhow!(
                        "count `{}` of log group `{}` must be a non-negative integer",
                        level,
                        group
                    )
                })
            })
            .collect::<Result<LogCounts>>()?;
        groups.insert(group.clone(), counts);
    }
    Ok(groups)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::io::Write;
    use telegraws_sdk::{MetricsBag, ReportWindow};

    const SAMPLE: &str = r#"{
        "ec2": { "CPUUtilization_Average": 12.5, "NetworkIn": 3 },
        "dynamodb": { "sessions": { "RequestCount": 40, "UserErrors": 1 } },
        "cloudwatchLogs": { "/ecs/api": { "info": 10, "warn": 2, "error": 0 } },
        "lambda": { "Invocations": 99 }
    }"#;

    fn ctx() -> CollectionContext {
        let end = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        CollectionContext::new(ReportWindow::new(end - Duration::hours(1), end, false).unwrap())
    }

    fn collect_all(providers: &[Box<dyn MetricsProvider>]) -> MetricsBag {
        let ctx = ctx();
        let mut bag = MetricsBag::new();
        for provider in providers {
            let payload = provider.collect(&ctx).expect("snapshot payload");
            bag.insert(provider.metadata().kind, payload).expect("shape");
        }
        bag
    }

    #[test]
    fn sample_snapshot_yields_known_kinds() {
        let providers = providers_from_str(SAMPLE).expect("providers");
        let kinds: Vec<_> = providers.iter().map(|p| p.metadata().kind).collect();
        assert_eq!(kinds.len(), 3);

        let bag = collect_all(&providers);
        let ec2 = bag.flat(ResourceKind::Ec2).unwrap().unwrap();
        assert_eq!(ec2["NetworkIn"], 3.0);

        let tables = bag.nested(ResourceKind::Dynamodb).unwrap().unwrap();
        assert_eq!(tables["sessions"]["RequestCount"], 40.0);

        let logs = bag.counts(ResourceKind::CloudwatchLogs).unwrap().unwrap();
        assert_eq!(logs["/ecs/api"]["warn"], 2);
    }

    #[test]
    fn nested_document_under_flat_kind_is_a_shape_mismatch() {
        let providers =
            providers_from_str(r#"{ "waf": { "acl": { "BlockedRequests": 1 } } }"#).expect("parse");
        let payload = providers[0].collect(&ctx()).expect("payload");
        assert_eq!(payload.shape(), PayloadShape::Nested);

        let err = MetricsBag::new()
            .insert(ResourceKind::Waf, payload)
            .expect_err("waf requires a flat mapping");
        assert_eq!(err.expected, PayloadShape::Flat);
    }

    #[test]
    fn empty_entry_uses_kind_shape() {
        let providers = providers_from_str(r#"{ "cloudwatchLogs": {} }"#).expect("parse");
        let bag = collect_all(&providers);
        assert!(bag.counts(ResourceKind::CloudwatchLogs).unwrap().unwrap().is_empty());
    }

    #[test]
    fn non_numeric_metric_is_rejected() {
        let err = providers_from_str(r#"{ "alb": { "RequestCount": "many" } }"#)
            .err()
            .expect("string metric");
        let message = format!("{:#}", err);
        assert!(message.contains("RequestCount"), "{}", message);
        assert!(message.contains("alb"), "{}", message);
    }

    #[test]
    fn negative_log_count_is_rejected() {
        let err = providers_from_str(r#"{ "cloudwatchLogs": { "/svc": { "error": -1 } } }"#)
            .err()
            .expect("negative count");
        assert!(format!("{:#}", err).contains("non-negative"));
    }

    #[test]
    fn top_level_must_be_object() {
        assert!(providers_from_str("[1, 2]").is_err());
    }

    #[test]
    fn loads_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write snapshot");

        let providers = providers_from_path(file.path()).expect("providers");
        assert_eq!(providers.len(), 3);

        let missing = file.path().with_extension("missing");
        let err = providers_from_path(&missing).err().expect("missing file");
        assert!(err.to_string().contains("failed to read metrics snapshot"));
    }
}
