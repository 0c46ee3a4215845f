//! Watermark-based selection of the entries a run still has to ingest.

use crate::models::{FeedEntry, KeyedEntry};
use tracing::warn;

/// True when the feed says it has not changed since the last saved record.
///
/// Only an optimisation: [`filter_new`] alone already yields nothing in that
/// case.
pub fn is_fast_path(feed_updated: Option<i64>, watermark: Option<i64>) -> bool {
    matches!((feed_updated, watermark), (Some(updated), Some(mark)) if updated == mark)
}

/// Entries published strictly after `watermark`, in feed order.
///
/// Without a watermark (first run) every entry is new.
pub fn filter_new(entries: Vec<FeedEntry>, watermark: Option<i64>) -> Vec<FeedEntry> {
    match watermark {
        None => entries,
        Some(mark) => entries
            .into_iter()
            .filter(|entry| entry.published_at > mark)
            .collect(),
    }
}

/// Attach an [`EntryKey`](crate::models::EntryKey) to each entry, dropping
/// (and logging) the ones whose id carries no key.
///
/// Returns the keyed entries in input order and the number dropped.
pub fn key_entries(entries: Vec<FeedEntry>) -> (Vec<KeyedEntry>, usize) {
    let mut keyed = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match KeyedEntry::try_from(entry) {
            Ok(k) => keyed.push(k),
            Err(e) => {
                warn!(error = %e, "Malformed feed entry; skipping");
                skipped += 1;
            }
        }
    }
    (keyed, skipped)
}
