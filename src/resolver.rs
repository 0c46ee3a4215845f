//! Concurrent lookup of each new entry's lead image.
//!
//! Page fetches are independent and I/O-bound, so they fan out over a
//! bounded number of in-flight requests and fan back in to one immutable
//! [`ImageMapping`]. A page that fails or has no image simply gets no mapping
//! entry.

use crate::models::{ImageMapping, KeyedEntry};
use crate::scrapers::PageScraper;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Default number of article pages fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Resolve the image URL of every entry, keyed by entry key.
///
/// Each page is fetched from the entry's `link`; the result is stored under
/// the key derived from the entry's `id`.
///
/// # Arguments
///
/// * `scraper` - Fetches one article page and extracts its image URL
/// * `entries` - New entries of this run; duplicate keys are fetched once
/// * `concurrency` - Maximum pages in flight (values below 1 count as 1)
///
/// # Returns
///
/// The mapping of entry key to image URL. Entries whose page failed or had
/// no image are absent.
#[instrument(level = "info", skip_all, fields(entries = entries.len(), concurrency = concurrency))]
pub async fn resolve_images<S: PageScraper>(
    scraper: &S,
    entries: &[KeyedEntry],
    concurrency: usize,
) -> ImageMapping {
    let t0 = Instant::now();
    info!("Getting news images ...");

    let images: ImageMapping = stream::iter(entries.iter().unique_by(|k| k.key.clone()))
        .map(|keyed| async move {
            match scraper.image_url(&keyed.entry.link).await {
                Ok(Some(url)) => {
                    debug!(entry_key = %keyed.key, %url, "Found image");
                    Some((keyed.key.clone(), url))
                }
                Ok(None) => {
                    debug!(entry_key = %keyed.key, link = %keyed.entry.link, "Article has no image");
                    None
                }
                Err(e) => {
                    warn!(entry_key = %keyed.key, link = %keyed.entry.link, error = %e, "Image lookup failed");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(
        found = images.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Resolved news images"
    );
    images
}
