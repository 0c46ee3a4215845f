//! One incremental ingestion pass.
//!
//! ```text
//! ReadWatermark -> LoadFeed -> FastPathCheck -> Filter -> Key
//!   -> ResolveImages -> PersistLoop (normalize + upload + put) -> Done
//! ```
//!
//! Reading the watermark and loading the feed are the only fatal steps.
//! After that every failure is contained to one entry: a lost image leaves
//! the record without `Image`, a failed write is logged and the loop goes on.
//! Nothing is retried at this level beyond the HTTP retry policy.

use crate::error::IngestError;
use crate::filter::{filter_new, is_fast_path, key_entries};
use crate::http::HttpGet;
use crate::normalize::normalize;
use crate::resolver::resolve_images;
use crate::scrapers::{FeedSource, PageScraper};
use crate::storage::{ObjectStore, RecordStore};
use crate::uploader::ImageUploader;
use crate::utils::truncate_for_log;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, instrument};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Feed timestamp equals the watermark; nothing was compared.
    NoNews,
    /// No entry is newer than the watermark.
    NothingNew,
    /// At least one entry went through the persist loop.
    Ingested,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::NoNews => "no_news",
            Outcome::NothingNew => "nothing_new",
            Outcome::Ingested => "ingested",
        })
    }
}

/// Counters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub watermark: Option<i64>,
    pub fetched: usize,
    pub new_entries: usize,
    pub skipped_malformed: usize,
    pub images_resolved: usize,
    pub images_uploaded: usize,
    pub saved: usize,
    pub failed_writes: usize,
    pub outcome: Outcome,
}

impl RunReport {
    fn empty(watermark: Option<i64>, fetched: usize, outcome: Outcome) -> Self {
        Self {
            watermark,
            fetched,
            new_entries: 0,
            skipped_malformed: 0,
            images_resolved: 0,
            images_uploaded: 0,
            saved: 0,
            failed_writes: 0,
            outcome,
        }
    }
}

/// The collaborators and settings of one source's ingestion.
pub struct Ingestor<'a, F, S, R, H, O> {
    pub feed: &'a F,
    pub scraper: &'a S,
    pub records: &'a R,
    pub uploader: ImageUploader<'a, H, O>,
    /// Tag stored in every record's `Source`.
    pub source: &'a str,
    /// Article pages fetched at once while resolving images.
    pub concurrency: usize,
}

impl<F, S, R, H, O> Ingestor<'_, F, S, R, H, O>
where
    F: FeedSource,
    S: PageScraper,
    R: RecordStore,
    H: HttpGet,
    O: ObjectStore,
{
    /// Ingest every entry published since the last saved record.
    ///
    /// # Returns
    ///
    /// A [`RunReport`] with the watermark read at the start, per-stage counts
    /// and the [`Outcome`].
    ///
    /// # Errors
    ///
    /// [`IngestError::Watermark`] when the record store cannot be read and
    /// [`IngestError::Feed`] when the feed is unreachable or unparseable.
    /// Per-entry failures never surface here; they are counted in the report.
    #[instrument(level = "info", skip_all, fields(source = %self.source))]
    pub async fn run(&self) -> Result<RunReport, IngestError> {
        let t0 = Instant::now();
        info!("Getting news ...");

        let watermark = self
            .records
            .last_update(self.source)
            .await
            .map_err(IngestError::Watermark)?;
        info!(?watermark, "Read watermark");

        let feed = self.feed.load().await?;
        let fetched = feed.entries.len();

        if is_fast_path(feed.updated, watermark) {
            info!("No news to save.");
            return Ok(RunReport::empty(watermark, fetched, Outcome::NoNews));
        }

        let fresh = filter_new(feed.entries, watermark);
        let new_entries = fresh.len();
        let (entries, skipped_malformed) = key_entries(fresh);
        info!(count = entries.len(), skipped_malformed, "{} news to save.", entries.len());

        if entries.is_empty() {
            let mut report = RunReport::empty(watermark, fetched, Outcome::NothingNew);
            report.new_entries = new_entries;
            report.skipped_malformed = skipped_malformed;
            return Ok(report);
        }

        let images = resolve_images(self.scraper, &entries, self.concurrency).await;

        info!("Saving news into the record store ...");
        let mut report = RunReport {
            watermark,
            fetched,
            new_entries,
            skipped_malformed,
            images_resolved: images.len(),
            images_uploaded: 0,
            saved: 0,
            failed_writes: 0,
            outcome: Outcome::Ingested,
        };
        for keyed in &entries {
            let record = normalize(keyed, self.source, &images, &self.uploader).await;
            let has_image = record.image.is_some();
            match self.records.put(&record).await {
                Ok(()) => {
                    report.saved += 1;
                    if has_image {
                        report.images_uploaded += 1;
                    }
                    info!(
                        entry_key = %keyed.key,
                        title = %truncate_for_log(&record.title, 80),
                        image = has_image,
                        "Saved news"
                    );
                }
                Err(e) => {
                    report.failed_writes += 1;
                    error!(entry_key = %keyed.key, error = %e, "Error while trying to save news; continuing");
                }
            }
        }

        info!(
            saved = report.saved,
            failed_writes = report.failed_writes,
            images_uploaded = report.images_uploaded,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "News saved"
        );
        Ok(report)
    }
}
