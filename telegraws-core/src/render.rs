use askama::Template;
use telegraws_sdk::{DataShapeError, FlatMetrics, LogCounts, MetricsBag, ReportWindow, ResourceKind};

use crate::config::ServicesConfig;

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
const LAMBDA_LOG_MARKER: &str = "/aws/lambda/";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Shape(#[from] DataShapeError),

    #[error("failed to render HTML document: {0}")]
    Template(#[from] askama::Error),
}

/// Output encoding of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Chat markup: `*bold*`, backslash escapes, plain newlines.
    PlainMarkup,
    /// Self-contained HTML document for email bodies.
    Html,
}

/// Formatting primitives shared by every report section.
pub trait Style {
    fn bold(&self, text: &str) -> String;
    fn escape(&self, text: &str) -> String;
    fn newline(&self) -> &'static str;
    fn separator(&self, daily: bool) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMarkupStyle;

impl Style for PlainMarkupStyle {
    fn bold(&self, text: &str) -> String {
        format!("*{}*", text)
    }

    fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for ch in text.chars() {
            if matches!(ch, '_' | '*') {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        escaped
    }

    fn newline(&self) -> &'static str {
        "\n"
    }

    fn separator(&self, daily: bool) -> &'static str {
        if daily {
            "\n= = = = = = = = = = = = = = =\n\n"
        } else {
            "\n- - - - - - - - - - - - - - -\n\n"
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlStyle;

impl Style for HtmlStyle {
    fn bold(&self, text: &str) -> String {
        format!("<strong>{}</strong>", html_escape(text))
    }

    fn escape(&self, text: &str) -> String {
        html_escape(text)
    }

    fn newline(&self) -> &'static str {
        "<br>"
    }

    fn separator(&self, _daily: bool) -> &'static str {
        r#"<hr style="border:none;border-top:1px solid #ccc;margin:12px 0;">"#
    }
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Template)]
#[template(path = "report.html")]
struct HtmlDocument<'a> {
    body: &'a str,
}

/// Renders the report for `window` in the requested dialect.
///
/// Sections appear only for enabled services with collected data; missing
/// metrics inside a section render as zero, except for RDS where the line is
/// left out.
pub fn render(
    services: &ServicesConfig,
    window: &ReportWindow,
    metrics: &MetricsBag,
    dialect: Dialect,
) -> Result<String, RenderError> {
    match dialect {
        Dialect::PlainMarkup => Ok(render_body(&PlainMarkupStyle, services, window, metrics)?),
        Dialect::Html => {
            let body = render_body(&HtmlStyle, services, window, metrics)?;
            Ok(HtmlDocument { body: &body }.render()?)
        }
    }
}

struct ReportWriter<'a, S: Style> {
    style: &'a S,
    out: String,
}

impl<'a, S: Style> ReportWriter<'a, S> {
    fn new(style: &'a S) -> Self {
        Self {
            style,
            out: String::new(),
        }
    }

    fn line<T: AsRef<str>>(&mut self, text: T) {
        self.out.push_str(text.as_ref());
        self.out.push_str(self.style.newline());
    }

    fn blank(&mut self) {
        self.out.push_str(self.style.newline());
    }

    fn separator(&mut self, daily: bool) {
        self.out.push_str(self.style.separator(daily));
    }

    /// `{bold label} {escaped identifier}`
    fn header(&mut self, label: &str, identifier: &str) {
        let text = format!("{} {}", self.style.bold(label), self.style.escape(identifier));
        self.line(text);
    }
}

fn metric(metrics: &FlatMetrics, key: &str) -> f64 {
    metrics.get(key).copied().unwrap_or(0.0)
}

fn count(counts: &LogCounts, level: &str) -> u64 {
    counts.get(level).copied().unwrap_or(0)
}

fn render_body<S: Style>(
    style: &S,
    services: &ServicesConfig,
    window: &ReportWindow,
    metrics: &MetricsBag,
) -> Result<String, DataShapeError> {
    let mut w = ReportWriter::new(style);

    w.separator(window.is_daily());
    w.line(window.end().format(TIMESTAMP_FORMAT).to_string());
    w.blank();

    write_compute(&mut w, services, metrics)?;
    if window.is_daily() {
        write_s3(&mut w, services, metrics)?;
    }
    write_alb(&mut w, services, metrics)?;
    write_cloudfront(&mut w, services, metrics)?;
    write_dynamodb(&mut w, services, metrics)?;
    write_rds(&mut w, services, metrics)?;
    write_waf(&mut w, services, metrics)?;
    write_logs(&mut w, services, metrics)?;

    w.separator(window.is_daily());
    Ok(w.out)
}

/// EC2 instance lines followed by the co-located agent lines, as one section.
fn write_compute<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    let mut written = false;

    if services.ec2.enabled {
        if let Some(m) = metrics.flat(ResourceKind::Ec2)? {
            let text = format!(
                "{}: {}",
                w.style.bold("EC2"),
                w.style.escape(&services.ec2.instance_id)
            );
            w.line(text);
            w.line(format!(
                "CPU: {:.2}% (avg), {:.2}% (max)",
                metric(m, "CPUUtilization_Average"),
                metric(m, "CPUUtilization_Maximum")
            ));
            w.line(format!(
                "Status Checks Failed: {:.0}",
                metric(m, "StatusCheckFailed")
            ));
            w.line(format!("Network In: {:.2} MB", metric(m, "NetworkIn")));
            w.line(format!("Network Out: {:.2} MB", metric(m, "NetworkOut")));
            written = true;
        }
    }

    if services.cloudwatch_agent.enabled {
        if let Some(m) = metrics.flat(ResourceKind::CloudwatchAgent)? {
            w.line(format!(
                "Memory: {:.2}% (avg), {:.2}% (max)",
                metric(m, "mem_used_percent_Average"),
                metric(m, "mem_used_percent_Maximum")
            ));
            w.line(format!("Disk: {:.2}%", metric(m, "disk_used_percent")));
            written = true;
        }
    }

    if written {
        w.blank();
    }
    Ok(())
}

fn write_s3<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.s3.enabled {
        return Ok(());
    }
    let Some(m) = metrics.flat(ResourceKind::S3)? else {
        return Ok(());
    };

    w.header("S3", &services.s3.bucket_name);
    w.line(format!("Size: {:.2} MB", metric(m, "BucketSizeBytes")));
    w.line(format!("Requests: {:.0}", metric(m, "AllRequests")));
    w.line(format!("4xx Errors: {:.0}", metric(m, "4xxErrors")));
    w.line(format!("5xx Errors: {:.0}", metric(m, "5xxErrors")));
    w.blank();
    Ok(())
}

fn write_alb<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.alb.enabled {
        return Ok(());
    }
    let Some(m) = metrics.flat(ResourceKind::Alb)? else {
        return Ok(());
    };

    w.header("ALB", &services.alb.alb_name);
    w.line(format!("Requests: {:.0}", metric(m, "RequestCount")));
    w.line(format!(
        "Response Time: {:.3} s",
        metric(m, "TargetResponseTime")
    ));
    w.line(format!(
        "2xx: {:.0}, 4xx: {:.0}, 5xx: {:.0}",
        metric(m, "HTTPCode_Target_2XX_Count"),
        metric(m, "HTTPCode_Target_4XX_Count"),
        metric(m, "HTTPCode_Target_5XX_Count")
    ));
    w.line(format!(
        "Healthy: {:.0}, Unhealthy: {:.0}",
        metric(m, "HealthyHostCount"),
        metric(m, "UnHealthyHostCount")
    ));
    let elb_errors = metric(m, "HTTPCode_ELB_4XX_Count") + metric(m, "HTTPCode_ELB_5XX_Count");
    w.line(format!("ALB Errors: {:.0}", elb_errors));
    w.blank();
    Ok(())
}

fn write_cloudfront<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.cloudfront.enabled {
        return Ok(());
    }
    let Some(m) = metrics.flat(ResourceKind::Cloudfront)? else {
        return Ok(());
    };

    w.header("CloudFront", &services.cloudfront.distribution_id);
    w.line(format!("Requests: {:.0}", metric(m, "Requests")));
    w.line(format!(
        "Data Downloaded: {:.2} MB",
        metric(m, "BytesDownloaded")
    ));
    w.line(format!("Cache Hit Rate: {:.2}%", metric(m, "CacheHitRate")));
    w.line(format!("4xx Error Rate: {:.2}%", metric(m, "4xxErrorRate")));
    w.line(format!("5xx Error Rate: {:.2}%", metric(m, "5xxErrorRate")));
    w.line(format!("Origin Latency: {:.2} ms", metric(m, "OriginLatency")));
    w.blank();
    Ok(())
}

fn write_dynamodb<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.dynamodb.enabled {
        return Ok(());
    }
    let Some(tables) = metrics.nested(ResourceKind::Dynamodb)? else {
        return Ok(());
    };

    for table in &services.dynamodb.table_names {
        let Some(m) = tables.get(table) else {
            continue;
        };
        w.header("DynamoDB", table);
        w.line(format!("Total Requests: {:.0}", metric(m, "RequestCount")));
        w.line(format!(
            "Read Throttles: {:.0}",
            metric(m, "ReadThrottledRequests")
        ));
        w.line(format!(
            "Write Throttles: {:.0}",
            metric(m, "WriteThrottledRequests")
        ));
        w.line(format!(
            "Latency: {:.2} ms",
            metric(m, "SuccessfulRequestLatency")
        ));
        w.line(format!(
            "Read Capacity: {:.0} units",
            metric(m, "ConsumedReadCapacityUnits")
        ));
        w.line(format!(
            "Write Capacity: {:.0} units",
            metric(m, "ConsumedWriteCapacityUnits")
        ));
        let errors = metric(m, "UserErrors") + metric(m, "SystemErrors");
        w.line(format!("DB Errors: {:.0}", errors));
        w.blank();
    }
    Ok(())
}

fn write_rds<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    let rds = &services.rds;
    if !rds.enabled {
        return Ok(());
    }
    let Some(m) = metrics.flat(ResourceKind::Rds)? else {
        return Ok(());
    };

    let cluster = rds.cluster_id.as_str();
    let instance = rds.db_instance_identifier.as_str();
    let label = w.style.bold("RDS");
    let header = match (cluster.is_empty(), instance.is_empty()) {
        (false, false) => format!(
            "{} {} / {}",
            label,
            w.style.escape(cluster),
            w.style.escape(instance)
        ),
        (false, true) => format!("{} Cluster {}", label, w.style.escape(cluster)),
        (true, false) => format!("{} Instance {}", label, w.style.escape(instance)),
        (true, true) => {
            tracing::warn!("RDS metrics present but no cluster or instance identifier; skipping");
            return Ok(());
        }
    };
    w.line(header);

    // Absent RDS metrics drop their line instead of rendering zero.
    if !instance.is_empty() {
        if let Some(avg) = m.get("Instance_CPUUtilization_Average") {
            let mut text = format!("CPU: {:.2}% (avg)", avg);
            if let Some(max) = m.get("Instance_CPUUtilization_Maximum") {
                text.push_str(&format!(", {:.2}% (max)", max));
            }
            w.line(text);
        }
        if let Some(v) = m.get("Instance_FreeableMemory") {
            w.line(format!("Free Memory: {:.2} GB", v));
        }
        if let Some(v) = m.get("Instance_DatabaseConnections") {
            w.line(format!("Connections: {:.0}", v));
        }
        if let Some(v) = m.get("Instance_ReadLatency") {
            w.line(format!("Read Latency: {:.2} ms", v));
        }
        if let Some(v) = m.get("Instance_WriteLatency") {
            w.line(format!("Write Latency: {:.2} ms", v));
        }
    }
    if !cluster.is_empty() {
        if let Some(v) = m.get("Cluster_VolumeBytesUsed") {
            w.line(format!("Volume Size: {:.2} GB", v));
        }
        if let Some(v) = m.get("Cluster_VolumeReadIOPs") {
            w.line(format!("Read IOPS: {:.0}", v));
        }
        if let Some(v) = m.get("Cluster_VolumeWriteIOPs") {
            w.line(format!("Write IOPS: {:.0}", v));
        }
    }
    w.blank();
    Ok(())
}

fn write_waf<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.waf.enabled {
        return Ok(());
    }
    let Some(m) = metrics.flat(ResourceKind::Waf)? else {
        return Ok(());
    };

    w.header("WAF", &services.waf.web_acl_name);
    w.line(format!("Allowed Requests: {:.0}", metric(m, "AllowedRequests")));
    w.line(format!("Blocked Requests: {:.0}", metric(m, "BlockedRequests")));
    w.blank();
    Ok(())
}

fn write_logs<S: Style>(
    w: &mut ReportWriter<'_, S>,
    services: &ServicesConfig,
    metrics: &MetricsBag,
) -> Result<(), DataShapeError> {
    if !services.cloudwatch_logs.enabled {
        return Ok(());
    }
    let Some(groups) = metrics.counts(ResourceKind::CloudwatchLogs)? else {
        return Ok(());
    };

    let (lambda, application): (Vec<_>, Vec<_>) = services
        .cloudwatch_logs
        .log_group_names
        .iter()
        .filter_map(|name| groups.get(name).map(|counts| (name.as_str(), counts)))
        .partition(|(name, _)| name.contains(LAMBDA_LOG_MARKER));

    write_log_bucket(w, "APPLICATION", &application);
    write_log_bucket(w, "LAMBDA", &lambda);
    Ok(())
}

fn write_log_bucket<S: Style>(
    w: &mut ReportWriter<'_, S>,
    title: &str,
    entries: &[(&str, &LogCounts)],
) {
    if entries.is_empty() {
        return;
    }

    let heading = w.style.bold(title);
    w.line(heading);
    for (name, counts) in entries {
        let text = format!("{}:", w.style.escape(name));
        w.line(text);
        w.line(format!("INFO: {}", count(counts, "info")));
        w.line(format!("WARN: {}", count(counts, "warn")));
        w.line(format!("ERROR: {}", count(counts, "error")));
        w.blank();
    }
}
