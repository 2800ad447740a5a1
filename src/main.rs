use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tipwatch::alerts::{AlertContext, AlertEvaluator, Signals, SubscribeRequest, ThresholdUpdate};
use tipwatch::config::{AppConfig, LoggingConfig};
use tipwatch::signals::{compute_metrics, MetricParams, MetricSeries};
use tipwatch::source::DirectorySource;
use tipwatch::timeseries::TimeSeriesBuilder;

#[derive(Parser)]
#[command(
    name = "tipwatch",
    about = "Early-warning signals of critical slowing down in species detection time series",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults to $TIPWATCH_CONFIG, then /etc/tipwatch/tipwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + alert dispatcher + optional monitor)
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Scan a dataset and print early-warning indicators per species
    Metrics {
        /// Dataset directory laid out as <dir>/<species>/<images>; repeatable
        #[arg(long)]
        dataset: Vec<PathBuf>,

        /// Only report this species
        #[arg(long)]
        species: Option<String>,

        /// Rolling-mean window used for detrending
        #[arg(long)]
        trend_window: Option<usize>,

        /// Window for autocorrelation, variance and slope
        #[arg(long)]
        metric_window: Option<usize>,

        /// Leading points forming the z-score baseline
        #[arg(long)]
        baseline_n: Option<usize>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Evaluate one set of signals against the thresholds and deliver the alert
    Evaluate {
        #[arg(long)]
        variance: f64,

        #[arg(long)]
        autocorrelation: f64,

        /// Webhook to POST the alert to
        #[arg(long)]
        webhook: Option<String>,

        /// Notification address
        #[arg(long)]
        notify: Option<String>,

        #[arg(long)]
        variance_threshold: Option<f64>,

        #[arg(long)]
        autocorrelation_threshold: Option<f64>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    // Logs go to stderr so --json output stays parseable
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load config under a stderr subscriber driven by `RUST_LOG` (default "info"),
/// since the configured subscriber depends on the result.
fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || AppConfig::resolve(explicit))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting tipwatch daemon");
            tipwatch::serve(config).await?;
        }
        Commands::Metrics {
            dataset,
            species,
            trend_window,
            metric_window,
            baseline_n,
            json,
        } => {
            let dirs = if dataset.is_empty() {
                config.dataset.dirs.clone()
            } else {
                dataset
            };
            let params = MetricParams {
                trend_window: trend_window.unwrap_or(config.signals.trend_window),
                metric_window: metric_window.unwrap_or(config.signals.metric_window),
                baseline_n: baseline_n.unwrap_or(config.signals.baseline_n),
            };
            params.validate()?;
            tracing::info!(?dirs, ?params, "Computing metrics");

            let builder = TimeSeriesBuilder::new(Arc::new(DirectorySource::new(dirs)), config.cache.ttl());
            let series = builder.get_or_build(false).await;

            let mut report: BTreeMap<&str, MetricSeries> = BTreeMap::new();
            for (name, s) in series.iter() {
                if species.as_deref().map_or(true, |wanted| wanted == name) {
                    report.insert(name, compute_metrics(s, &params));
                }
            }
            if let Some(wanted) = &species {
                if report.is_empty() {
                    anyhow::bail!("species '{}' not found in dataset", wanted);
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_metrics_table(&report);
            }
        }
        Commands::Evaluate {
            variance,
            autocorrelation,
            webhook,
            notify,
            variance_threshold,
            autocorrelation_threshold,
        } => {
            let evaluator = AlertEvaluator::new(config.alerts.initial(), config.alerts.webhook_timeout())
                .context("failed to initialize alert evaluator")?;
            evaluator
                .subscribe(SubscribeRequest {
                    webhook_target: webhook.or(config.alerts.webhook_target.clone()),
                    notify_address: notify.or(config.alerts.notify_address.clone()),
                    thresholds: Some(ThresholdUpdate {
                        variance: variance_threshold,
                        autocorrelation: autocorrelation_threshold,
                    }),
                })
                .await?;

            let mut context = AlertContext::new();
            context.insert("source".into(), serde_json::json!("cli"));
            let outcome = evaluator
                .evaluate(
                    Signals {
                        variance,
                        autocorrelation,
                    },
                    context,
                )
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

fn print_metrics_table(report: &BTreeMap<&str, MetricSeries>) {
    if report.is_empty() {
        println!("No detections found.");
        return;
    }

    println!("\ntipwatch Early-Warning Indicators (latest day)");
    println!(
        "{:<28} | {:<10} | {:>5} | {:>8} | {:>9} | {:>8} | {:>6}",
        "Species", "Date", "Days", "Autocorr", "Variance", "Trend", "Risk"
    );
    println!("{:-<28}-|-{:-<10}-|-{:->5}-|-{:->8}-|-{:->9}-|-{:->8}-|-{:->6}", "", "", "", "", "", "", "");
    for (species, m) in report {
        if let Some(last) = m.latest() {
            println!(
                "{:<28} | {:<10} | {:>5} | {:>8.3} | {:>9.3} | {:>8.3} | {:>6.1}",
                species,
                last.date,
                m.len(),
                last.autocorrelation,
                last.variance,
                last.trend,
                last.risk
            );
        }
    }
    println!();
}
