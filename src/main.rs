//! # gov_news_ingest
//!
//! Incremental ingestion of a government news RSS feed into a queryable
//! record store, with each article's lead image mirrored to object storage.
//!
//! ## Usage
//!
//! ```sh
//! gov_news_ingest --feed-url https://www.argentina.gob.ar/noticias/rss \
//!     --bucket-name news-media --media-path media/news --table-name news
//! gov_news_ingest --table-name news list --limit 5
//! ```
//!
//! ## Architecture
//!
//! One `run` is a single pass, meant to be triggered on a schedule:
//! 1. **Watermark**: newest `CreatedAt` already stored for the source
//! 2. **Feed**: download and parse the RSS feed, keep entries newer than the watermark
//! 3. **Images**: scrape each article page for its lead image (bounded concurrency)
//! 4. **Persist**: upload images, then write one record per entry, in feed order
//!
//! Re-running is safe: records are upserted by `(Source, Id)` and only
//! entries newer than the watermark are considered.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod error;
mod filter;
mod http;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod query;
mod resolver;
mod scrapers;
mod storage;
mod uploader;
mod utils;

use cli::{Action, Cli, FileConfig, ListSettings, RunSettings, StoreSettings};
use http::{ReqwestGet, RetryGet, RetryPolicy};
use outputs::json;
use pipeline::Ingestor;
use scrapers::gobierno::{ArticleImageScraper, GobiernoFeed};
use storage::{S3ObjectStore, SqliteRecordStore};
use uploader::ImageUploader;

/// Dependencies that log too much at `info`.
const QUIET_TARGETS: [&str; 6] = [
    "aws_config",
    "aws_smithy_runtime",
    "hyper",
    "reqwest",
    "sqlx",
    "html5ever",
];

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = level.to_string();
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{target}=warn"));
        }
        EnvFilter::new(directives)
    });
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let file = match &args.config {
        Some(path) => match FileConfig::load(path).await {
            Ok(file) => file,
            Err(e) => {
                // Flags and env only; the file never loaded.
                init_tracing(&args.log_level(&FileConfig::default()));
                error!(path = %path, error = %e, "Failed to load config file");
                return Err(e.into());
            }
        },
        None => FileConfig::default(),
    };

    init_tracing(&args.log_level(&file));
    let start_time = std::time::Instant::now();
    info!("gov_news_ingest starting up");

    let settings = match args.resolve(file) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    debug!(log_level = %settings.log_level, store = ?settings.store, action = ?settings.action, "Resolved settings");

    let store = &settings.store;
    match settings.action {
        Action::Run(run) => {
            let records = SqliteRecordStore::connect(&store.database_url, &store.table_name)
                .await
                .inspect_err(|e| error!(error = %e, "Record store unreachable"))?;
            ingest(store, run, &records).await?
        }
        Action::List(list) => {
            // Listing never creates the database or the table.
            let records = SqliteRecordStore::open_existing(&store.database_url, &store.table_name)
                .await
                .inspect_err(|e| error!(error = %e, "Record store unreachable"))?;
            list_news(list, &records).await?
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(source = %store.source_tag))]
async fn ingest(
    store: &StoreSettings,
    run: RunSettings,
    records: &SqliteRecordStore,
) -> Result<(), Box<dyn Error>> {
    let http = RetryGet::new(
        ReqwestGet::with_timeout(run.http_timeout)?,
        RetryPolicy::default(),
    );
    let objects = S3ObjectStore::new(run.objects).await;
    let feed = GobiernoFeed::new(&http, run.feed_url);
    let scraper = ArticleImageScraper::new(&http);

    let ingestor = Ingestor {
        feed: &feed,
        scraper: &scraper,
        records,
        uploader: ImageUploader::new(&http, &objects, &run.media_path),
        source: &store.source_tag,
        concurrency: run.scrape_concurrency,
    };

    match ingestor.run().await {
        Ok(report) => {
            info!(
                outcome = %report.outcome,
                watermark = ?report.watermark,
                fetched = report.fetched,
                new_entries = report.new_entries,
                skipped_malformed = report.skipped_malformed,
                images_resolved = report.images_resolved,
                images_uploaded = report.images_uploaded,
                saved = report.saved,
                failed_writes = report.failed_writes,
                "Run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            Err(e.into())
        }
    }
}

async fn list_news(list: ListSettings, records: &SqliteRecordStore) -> Result<(), Box<dyn Error>> {
    let page = query::list_news(records, &list.query, &list.options).await?;
    json::write_page(&page, list.output.as_deref()).await
}
