mod config;
mod dateranges;
mod decode;
mod error;
mod postgres_alerts;
mod postgres_timetable;

use alerts_core::clock::{Clock, FixedClock, SystemClock};
use alerts_core::orchestrator;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Asia::Jerusalem;
use clap::Parser;
use regex::Regex;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use error::{IngestError, Result};
use postgres_alerts::PgAlertStore;
use postgres_timetable::PgTimetableStore;

/// Runs one ingestion pass against the upstream feed and the configured
/// databases. Mirrors `load_service_alerts.py`'s `load -c <config> [-f <file>]`.
#[derive(Parser, Debug)]
#[command(name = "alerts-ingester")]
struct Cli {
    #[arg(short, long)]
    config: String,

    /// Read the feed from a local file instead of fetching it. If the
    /// filename contains six numbers separated by non-digit characters,
    /// they are parsed as YYYY MM DD HH MM SS local time and used as "today"
    /// for the whole pass, for reproducing a historical run.
    #[arg(short, long)]
    file: Option<String>,
}

fn fake_today_from_filename(path: &str) -> Option<FixedClock> {
    let re = Regex::new(r"(\d+)\D(\d+)\D(\d+)\D(\d+)\D(\d+)\D(\d+)").unwrap();
    let caps = re.captures(path)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let (y, mo, d, h, mi, s) = (num(1)?, num(2)?, num(3)?, num(4)?, num(5)?, num(6)?);
    let date = NaiveDate::from_ymd_opt(y as i32, mo, d)?;
    let naive = date.and_hms_opt(h, mi, s)?;
    let local = Jerusalem.from_local_datetime(&naive).single()?;
    Some(FixedClock(local.with_timezone(&chrono::Utc)))
}

async fn fetch_feed_bytes(cli: &Cli, cfg: &Config) -> Result<Vec<u8>> {
    if let Some(path) = &cli.file {
        return std::fs::read(path).map_err(IngestError::from);
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(cfg.feed.timeout_secs))
        .build()?;
    let response = client.get(&cfg.feed.mot_endpoint).send().await?;
    if !response.status().is_success() {
        return Err(IngestError::FeedStatus(response.status()));
    }
    Ok(response.bytes().await?.to_vec())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    let clock: Box<dyn Clock> = match cli.file.as_deref().and_then(fake_today_from_filename) {
        Some(fixed) => {
            tracing::info!(now = %fixed.0, "using filename-derived fake clock");
            Box::new(fixed)
        }
        None => Box::new(SystemClock),
    };

    let feed_bytes = fetch_feed_bytes(&cli, &cfg).await?;
    let feed = decode::decode_feed(&feed_bytes)?;
    let raw_alerts = decode::raw_alerts_from_feed(&feed);
    tracing::info!(count = raw_alerts.len(), "decoded feed entities");

    let gtfs_pool = PgPoolOptions::new().connect(&cfg.postgres.gtfs_dsn).await?;
    let alerts_pool = PgPoolOptions::new().connect(&cfg.postgres.alerts_dsn).await?;

    sqlx::migrate!("./migrations").run(&alerts_pool).await?;

    let timetable = PgTimetableStore::new(gtfs_pool);
    let alert_store = PgAlertStore::new(alerts_pool);

    let summary = orchestrator::run_ingest_pass(raw_alerts, &timetable, &alert_store, clock.as_ref()).await?;
    tracing::info!(
        upserted = summary.upserted,
        marked_deleted = summary.marked_deleted,
        "ingest pass complete"
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "ingest pass failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_numbers_from_filename() {
        let clock = fake_today_from_filename("feed_2024-01-15_08-30-00.pb").unwrap();
        assert_eq!(clock.today_jerusalem(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn no_match_without_six_numbers() {
        assert!(fake_today_from_filename("feed.pb").is_none());
    }
}
