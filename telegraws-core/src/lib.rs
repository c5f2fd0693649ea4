use chrono::{DateTime, SecondsFormat, TimeZone};
use serde_json::json;
use telegraws_sdk::{CollectionContext, MetricsProvider};

pub mod config;
pub mod render;
pub mod schema;
pub mod window;

pub use config::{Config, ConfigError, NotificationsConfig, ServicesConfig};
pub use render::{Dialect, HtmlStyle, PlainMarkupStyle, RenderError, Style, render};
pub use telegraws_sdk::{DataShapeError, MetricsBag, ReportWindow, ResourceKind};
pub use window::select_window;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shape(#[from] DataShapeError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Fully collected metrics for one invocation, ready to render.
#[derive(Debug)]
pub struct Report<'a> {
    services: &'a ServicesConfig,
    window: ReportWindow,
    metrics: MetricsBag,
}

impl<'a> Report<'a> {
    pub fn new(services: &'a ServicesConfig, window: ReportWindow, metrics: MetricsBag) -> Self {
        Self {
            services,
            window,
            metrics,
        }
    }

    pub fn window(&self) -> &ReportWindow {
        &self.window
    }

    pub fn metrics(&self) -> &MetricsBag {
        &self.metrics
    }

    pub fn render(&self, dialect: Dialect) -> Result<String, RenderError> {
        render::render(self.services, &self.window, &self.metrics, dialect)
    }

    pub fn to_markdown(&self) -> Result<String, RenderError> {
        self.render(Dialect::PlainMarkup)
    }

    pub fn to_html(&self) -> Result<String, RenderError> {
        self.render(Dialect::Html)
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        json!({
            "window": {
                "start": self.window.start().to_rfc3339_opts(SecondsFormat::Secs, true),
                "end": self.window.end().to_rfc3339_opts(SecondsFormat::Secs, true),
                "daily": self.window.is_daily(),
                "period_seconds": self.window.period_seconds(),
            },
            "metrics": self.metrics,
        })
    }
}

/// Runs every provider whose resource kind is enabled and assembles the bag.
///
/// A failing provider leaves its kind out of the bag. A payload with the wrong
/// shape for its kind aborts collection.
pub fn collect_metrics(
    services: &ServicesConfig,
    providers: &[Box<dyn MetricsProvider>],
    ctx: &CollectionContext,
) -> Result<MetricsBag, DataShapeError> {
    let mut bag = MetricsBag::new();

    for provider in providers {
        let metadata = provider.metadata();
        if !services.is_enabled(metadata.kind) {
            tracing::debug!(kind = %metadata.kind, "service disabled; provider skipped");
            continue;
        }

        match provider.collect(ctx) {
            Ok(payload) => {
                tracing::debug!(kind = %metadata.kind, provider = metadata.title, "metrics collected");
                bag.insert(metadata.kind, payload)?;
            }
            Err(error) => {
                tracing::warn!(
                    kind = %metadata.kind,
                    provider = metadata.title,
                    error = %format!("{:#}", error),
                    "metrics unavailable"
                );
            }
        }
    }

    Ok(bag)
}

/// Selects the window for `now` and collects metrics for it.
pub fn collect_report<'a, Tz: TimeZone>(
    config: &'a Config,
    providers: &[Box<dyn MetricsProvider>],
    now: &DateTime<Tz>,
) -> Result<Report<'a>, ReportError> {
    let window = config.report_window(now)?;
    tracing::info!(
        daily = window.is_daily(),
        start = %window.start(),
        end = %window.end(),
        "collecting metrics"
    );

    let ctx = CollectionContext::new(window);
    let metrics = collect_metrics(&config.services, providers, &ctx)?;
    Ok(Report::new(&config.services, window, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use telegraws_sdk::{MetricsPayload, ProviderMetadata};

    const EXAMPLE: &str = include_str!("../../config.example.json");

    struct StubProvider {
        kind: ResourceKind,
        payload: Option<MetricsPayload>,
        calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        fn boxed(kind: ResourceKind, payload: Option<MetricsPayload>) -> Box<dyn MetricsProvider> {
            Box::new(Self {
                kind,
                payload,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl MetricsProvider for StubProvider {
        fn metadata(&self) -> ProviderMetadata {
            ProviderMetadata {
                kind: self.kind,
                title: "stub",
                description: "Fixed payload for tests",
            }
        }

        fn collect(&self, _ctx: &CollectionContext) -> anyhow::Result<MetricsPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payload
                .clone()
                .ok_or_else(|| anyhow!("upstream request failed"))
        }
    }

    fn flat(pairs: &[(&str, f64)]) -> MetricsPayload {
        MetricsPayload::Flat(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn context(daily: bool) -> CollectionContext {
        let end = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();
        let span = if daily { 24 } else { 1 };
        CollectionContext::new(
            ReportWindow::new(end - chrono::Duration::hours(span), end, daily).unwrap(),
        )
    }

    fn example() -> Config {
        Config::from_json(EXAMPLE).expect("example config")
    }

    #[test]
    fn failing_provider_leaves_kind_absent() {
        let config = example();
        let providers = vec![
            StubProvider::boxed(ResourceKind::Ec2, Some(flat(&[("NetworkIn", 1.0)]))),
            StubProvider::boxed(ResourceKind::Alb, None),
        ];

        let bag = collect_metrics(&config.services, &providers, &context(false)).expect("bag");
        assert!(bag.contains(ResourceKind::Ec2));
        assert!(!bag.contains(ResourceKind::Alb));
    }

    #[test]
    fn disabled_kinds_are_not_collected() {
        let config = example();
        assert!(!config.services.rds.enabled);

        let calls = Arc::new(AtomicUsize::new(0));
        let provider: Box<dyn MetricsProvider> = Box::new(StubProvider {
            kind: ResourceKind::Rds,
            payload: Some(flat(&[("Cluster_VolumeBytesUsed", 1.0)])),
            calls: Arc::clone(&calls),
        });

        let bag = collect_metrics(&config.services, &[provider], &context(false)).expect("bag");
        assert!(bag.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wrong_payload_shape_aborts_collection() {
        let config = example();
        let providers = vec![StubProvider::boxed(
            ResourceKind::Dynamodb,
            Some(flat(&[("RequestCount", 5.0)])),
        )];

        let err = collect_metrics(&config.services, &providers, &context(false))
            .expect_err("flat dynamodb payload");
        assert_eq!(err.kind, ResourceKind::Dynamodb);
    }

    #[test]
    fn collect_report_renders_both_dialects() {
        let config = example();
        let providers = vec![
            StubProvider::boxed(
                ResourceKind::Ec2,
                Some(flat(&[("CPUUtilization_Average", 5.0)])),
            ),
            StubProvider::boxed(ResourceKind::S3, Some(flat(&[("AllRequests", 9.0)]))),
        ];
        let daily_hour = config.global.monitoring.daily_report_hour as u32;
        let now = Utc.with_ymd_and_hms(2024, 3, 15, daily_hour, 0, 0).unwrap();

        let report = collect_report(&config, &providers, &now).expect("report");
        assert!(report.window().is_daily());

        let markdown = report.to_markdown().expect("markdown");
        assert!(markdown.contains("*EC2*: "));
        assert!(markdown.contains("*S3* "));
        assert!(markdown.contains("15/03/2024"));

        let html = report.to_html().expect("html");
        assert!(html.contains("<strong>EC2</strong>"));
        assert!(html.contains("white-space: pre-wrap"));
    }

    #[test]
    fn json_value_describes_window_and_metrics() {
        let config = example();
        let ctx = context(true);
        let mut bag = MetricsBag::new();
        bag.insert(ResourceKind::Waf, flat(&[("BlockedRequests", 3.0)]))
            .expect("flat waf");

        let report = Report::new(&config.services, *ctx.window(), bag);
        let value = report.to_json_value();
        assert_eq!(value["window"]["daily"], true);
        assert_eq!(value["window"]["period_seconds"], 86_400);
        assert_eq!(value["window"]["end"], "2024-03-15T08:00:00Z");
        assert_eq!(value["metrics"]["waf"]["BlockedRequests"], 3.0);
    }
}
