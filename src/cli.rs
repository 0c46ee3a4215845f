//! Command-line interface and configuration resolution.
//!
//! Every value can come from a flag, an environment variable or the optional
//! YAML config file. A flag or environment variable wins over the file, and
//! the file wins over built-in defaults.
//!
//! ```yaml
//! # config.yaml
//! feed_url: https://www.argentina.gob.ar/noticias/rss
//! bucket_name: news-media
//! media_path: media/news
//! table_name: news
//! database_url: sqlite://news.db
//! scrape_concurrency: 8
//! ```

use crate::error::ConfigError;
use crate::query::{DEFAULT_SUMMARY_LENGTH, ListOptions, MAX_LIMIT, NewsQuery};
use crate::resolver::DEFAULT_CONCURRENCY;
use crate::storage::objects::ObjectStoreConfig;
use crate::utils::validate_identifier;
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SOURCE_TAG: &str = "gobierno";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://news.db";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # One ingestion pass (the default command)
/// gov_news_ingest --feed-url https://www.argentina.gob.ar/noticias/rss \
///     --bucket-name news-media --media-path media/news --table-name news
///
/// # Second page of the newest news, five at a time
/// gov_news_ingest -c config.yaml list --limit 5 --cursor eyJTb3VyY2Ui...
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// RSS feed to ingest
    #[arg(long, env = "FEED_URL", global = true)]
    pub feed_url: Option<String>,

    /// Object-store bucket receiving article images
    #[arg(long, env = "BUCKET_NAME", global = true)]
    pub bucket_name: Option<String>,

    /// Key prefix for stored images
    #[arg(long, env = "MEDIA_PATH", global = true)]
    pub media_path: Option<String>,

    /// Record-store table name
    #[arg(long, env = "TABLE_NAME", global = true)]
    pub table_name: Option<String>,

    /// Value stored in every record's `Source` [default: gobierno]
    #[arg(long, env = "SOURCE_TAG", global = true)]
    pub source_tag: Option<String>,

    /// SQLite database URL [default: sqlite://news.db]
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Custom S3 endpoint (MinIO, localstack)
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub s3_endpoint: Option<String>,

    /// S3 region; falls back to the AWS default chain
    #[arg(long, env = "S3_REGION", global = true)]
    pub s3_region: Option<String>,

    /// Use path-style S3 addressing
    #[arg(long, env = "S3_PATH_STYLE", global = true)]
    pub s3_path_style: Option<bool>,

    /// Per-request HTTP timeout in seconds [default: 30]
    #[arg(long, env = "HTTP_TIMEOUT_SECS", global = true)]
    pub http_timeout_secs: Option<u64>,

    /// Article pages fetched at once [default: 8]
    #[arg(long, env = "SCRAPE_CONCURRENCY", global = true)]
    pub scrape_concurrency: Option<usize>,

    /// Default log filter when RUST_LOG is unset [default: info]
    #[arg(long, env = "LOG_LEVEL", global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ingest news published since the last run
    Run,
    /// Print stored news as JSON, newest first
    List(ListArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct ListArgs {
    /// Page size, 1 to 50 [default: 5]
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Only news created at this instant (epoch seconds or RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub created_at: Option<i64>,

    /// `NextCursor` of the previous page
    #[arg(long)]
    pub cursor: Option<String>,

    /// Base URL prepended to image keys
    #[arg(long, env = "MEDIA_URL")]
    pub media_url: Option<String>,

    /// Summaries are cut after this many characters [default: 200]
    #[arg(long)]
    pub summary_length: Option<usize>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Accept `1700000000` as well as `2023-11-14T22:13:20Z`.
fn parse_timestamp(value: &str) -> Result<i64, String> {
    if let Ok(secs) = value.parse::<i64>() {
        return Ok(secs);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|e| format!("expected epoch seconds or RFC 3339: {e}"))
}

/// Keys accepted in the YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub feed_url: Option<String>,
    pub bucket_name: Option<String>,
    pub media_path: Option<String>,
    pub table_name: Option<String>,
    pub source_tag: Option<String>,
    pub database_url: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_path_style: Option<bool>,
    pub http_timeout_secs: Option<u64>,
    pub scrape_concurrency: Option<usize>,
    pub log_level: Option<String>,
    pub media_url: Option<String>,
    pub summary_length: Option<usize>,
}

impl FileConfig {
    pub fn from_yaml(path: &str, text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })
    }

    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
        Self::from_yaml(path, &text)
    }
}

/// Where records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub database_url: String,
    pub table_name: String,
    pub source_tag: String,
}

/// Values needed by an ingestion pass.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub feed_url: String,
    pub objects: ObjectStoreConfig,
    pub media_path: String,
    pub http_timeout: Duration,
    pub scrape_concurrency: usize,
}

/// Values needed by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSettings {
    pub query: NewsQuery,
    pub options: ListOptions,
    pub output: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Action {
    Run(RunSettings),
    List(ListSettings),
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub store: StoreSettings,
    pub action: Action,
}

impl Cli {
    /// Log filter to install before the rest of the settings are resolved.
    pub fn log_level(&self, file: &FileConfig) -> String {
        self.log_level
            .clone()
            .or_else(|| file.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    /// Merge flags, environment and `file` into [`Settings`].
    pub fn resolve(self, file: FileConfig) -> Result<Settings, ConfigError> {
        let table_name = self
            .table_name
            .or(file.table_name)
            .ok_or(ConfigError::Missing("table_name"))?;
        let store = StoreSettings {
            database_url: self
                .database_url
                .or(file.database_url)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            table_name: validate_identifier(&table_name)?,
            source_tag: self
                .source_tag
                .or(file.source_tag)
                .unwrap_or_else(|| DEFAULT_SOURCE_TAG.to_string()),
        };
        let log_level = self
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let action = match self.command.unwrap_or(Command::Run) {
            Command::Run => Action::Run(RunSettings {
                feed_url: self
                    .feed_url
                    .or(file.feed_url)
                    .ok_or(ConfigError::Missing("feed_url"))?,
                objects: ObjectStoreConfig {
                    bucket: self
                        .bucket_name
                        .or(file.bucket_name)
                        .ok_or(ConfigError::Missing("bucket_name"))?,
                    region: self.s3_region.or(file.s3_region),
                    endpoint: self.s3_endpoint.or(file.s3_endpoint),
                    path_style: self.s3_path_style.or(file.s3_path_style).unwrap_or(false),
                },
                media_path: self
                    .media_path
                    .or(file.media_path)
                    .ok_or(ConfigError::Missing("media_path"))?,
                http_timeout: Duration::from_secs(
                    self.http_timeout_secs
                        .or(file.http_timeout_secs)
                        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                ),
                scrape_concurrency: self
                    .scrape_concurrency
                    .or(file.scrape_concurrency)
                    .unwrap_or(DEFAULT_CONCURRENCY)
                    .max(1),
            }),
            Command::List(args) => Action::List(ListSettings {
                query: NewsQuery {
                    source: store.source_tag.clone(),
                    created_at: args.created_at,
                    limit: args.limit,
                    cursor: args.cursor,
                },
                options: ListOptions {
                    max_limit: MAX_LIMIT,
                    summary_length: args
                        .summary_length
                        .or(file.summary_length)
                        .unwrap_or(DEFAULT_SUMMARY_LENGTH),
                    media_url: args.media_url.or(file.media_url),
                },
                output: args.output,
            }),
        };

        Ok(Settings {
            log_level,
            store,
            action,
        })
    }
}
