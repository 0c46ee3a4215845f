//! Builds persisted [`NewsRecord`]s from feed entries.

use crate::http::HttpGet;
use crate::models::{ImageMapping, KeyedEntry, NewsRecord};
use crate::storage::ObjectStore;
use crate::uploader::ImageUploader;
use tracing::debug;

/// Literal substitutions applied to summaries. No pattern overlaps another and
/// no replacement contains a pattern character, so the order is irrelevant
/// and applying them twice changes nothing.
const SUMMARY_SUBSTITUTIONS: [(&str, &str); 5] = [
    ("\u{a0}", " "),
    ("[&#8230;]", "..."),
    ("&#8211;", "-"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
];

/// Replace the WordPress entity artifacts the feed leaves in summaries.
pub fn clean_summary(summary: &str) -> String {
    SUMMARY_SUBSTITUTIONS
        .iter()
        .fold(summary.to_string(), |text, (from, to)| text.replace(from, to))
}

/// Turn a keyed entry into its record, mirroring its image when one was
/// resolved.
///
/// `Image` is set only when the mapping has a URL for the entry *and* the
/// upload succeeded.
pub async fn normalize<H: HttpGet, O: ObjectStore>(
    keyed: &KeyedEntry,
    source: &str,
    images: &ImageMapping,
    uploader: &ImageUploader<'_, H, O>,
) -> NewsRecord {
    let KeyedEntry { key, entry } = keyed;

    let image = match images.get(key) {
        Some(url) => uploader.upload_for_entry(key, url).await,
        None => {
            debug!(entry_key = %key, "No image resolved for entry");
            None
        }
    };

    NewsRecord {
        id: key.as_str().to_string(),
        title: entry.title.clone(),
        summary: clean_summary(&entry.summary),
        link: entry.link.clone(),
        source: source.to_string(),
        created_at: entry.published_at,
        image,
    }
}
