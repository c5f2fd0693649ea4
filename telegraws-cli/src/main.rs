use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use telegraws_core::{Config, Dialect, collect_report};
use telegraws_notify::notifier_for;
use telegraws_sdk::MetricsProvider;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "telegraws",
    version,
    about = "Cloud resource health report",
    author = "Telegraws Team"
)]
struct Cli {
    /// Path to the JSON configuration
    #[arg(long)]
    config: PathBuf,

    /// Recorded metrics snapshot (JSON keyed by resource kind)
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Report instant in RFC 3339; defaults to the current time
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,

    /// Output format: auto delivers through the configured channel,
    /// the others print to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    format: OutputFormat,

    /// Print the report in the channel's dialect instead of sending it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Auto,
    Markdown,
    Html,
    Json,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("expected an RFC 3339 timestamp: {}", err))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_providers(metrics: Option<&PathBuf>) -> Result<Vec<Box<dyn MetricsProvider>>> {
    match metrics {
        Some(path) => mod_snapshot::providers_from_path(path),
        None => {
            tracing::warn!("no metrics source given; report will only carry the header");
            Ok(Vec::new())
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let providers = load_providers(cli.metrics.as_ref())?;
    let now = cli.now.unwrap_or_else(Utc::now);
    let report = collect_report(&config, &providers, &now)?;

    let configured = if config.global.notifications.use_email {
        Dialect::Html
    } else {
        Dialect::PlainMarkup
    };

    match cli.format {
        OutputFormat::Json => {
            let payload = report.to_json_value();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Markdown => println!("{}", report.to_markdown()?),
        OutputFormat::Html => println!("{}", report.to_html()?),
        OutputFormat::Auto if cli.dry_run => println!("{}", report.render(configured)?),
        OutputFormat::Auto => {
            let notifier = notifier_for(&config.global.notifications)?;
            let body = report.render(notifier.dialect())?;
            notifier.send(&body).context("failed to deliver report")?;
        }
    }

    Ok(())
}
