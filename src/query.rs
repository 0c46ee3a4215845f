//! Paged listing of stored news, newest first.
//!
//! Pages are chained with an opaque cursor: the URL-safe base64 of the JSON
//! key of the last record returned. Clients hand it back unchanged to get
//! the following page.

use crate::error::StoreError;
use crate::models::{NewsPage, NewsRecord, PageKey};
use crate::storage::RecordStore;
use crate::utils::truncate_chars;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{debug, instrument};

/// Page size used when the caller gives none.
pub const DEFAULT_LIMIT: u32 = 5;
/// Largest page a caller can ask for.
pub const MAX_LIMIT: u32 = 50;
/// Summaries longer than this many characters are cut in listings.
pub const DEFAULT_SUMMARY_LENGTH: usize = 200;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub source: String,
    /// Only records with exactly this `CreatedAt`.
    pub created_at: Option<i64>,
    pub limit: Option<u32>,
    /// `next_cursor` of the previous page.
    pub cursor: Option<String>,
}

/// How listed records are presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub max_limit: u32,
    pub summary_length: usize,
    /// Base URL prepended to stored `Image` keys.
    pub media_url: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_limit: MAX_LIMIT,
            summary_length: DEFAULT_SUMMARY_LENGTH,
            media_url: None,
        }
    }
}

pub fn encode_cursor(key: &PageKey) -> Result<String, StoreError> {
    let json = serde_json::to_vec(key).map_err(|e| StoreError::BadCursor(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_cursor(cursor: &str) -> Result<PageKey, StoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim_end_matches('='))
        .map_err(|e| StoreError::BadCursor(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::BadCursor(e.to_string()))
}

/// Clamp a requested page size to `1..=max_limit`.
fn effective_limit(requested: Option<u32>, max_limit: u32) -> u32 {
    let max_limit = max_limit.max(1);
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, max_limit)
}

/// Apply listing presentation to one stored record.
fn present(mut record: NewsRecord, options: &ListOptions) -> NewsRecord {
    let (head, cut) = truncate_chars(&record.summary, options.summary_length);
    if cut {
        record.summary = format!("{head} ...");
    }
    if let (Some(base), Some(image)) = (options.media_url.as_deref(), record.image.as_deref()) {
        record.image = Some(format!("{}{}", base.trim_end_matches('/'), image));
    }
    record
}

/// One page of `query.source`'s records.
///
/// # Arguments
///
/// * `store` - Record store to read from
/// * `query` - Source, optional exact `CreatedAt`, page size and cursor
/// * `options` - Page size cap, summary length and media URL base
///
/// # Returns
///
/// Up to the effective limit of records, newest first, with summaries and
/// image keys presented for clients. `NextCursor` is set only when more
/// records follow.
///
/// # Errors
///
/// [`StoreError::BadCursor`] when the cursor is not one this function
/// produced for the same source, or any store failure.
#[instrument(level = "info", skip_all, fields(source = %query.source, limit = ?query.limit))]
pub async fn list_news<R: RecordStore>(
    store: &R,
    query: &NewsQuery,
    options: &ListOptions,
) -> Result<NewsPage, StoreError> {
    let limit = effective_limit(query.limit, options.max_limit);
    let after = query.cursor.as_deref().map(decode_cursor).transpose()?;
    if let Some(key) = &after {
        if key.source != query.source {
            return Err(StoreError::BadCursor(format!(
                "cursor belongs to source {:?}",
                key.source
            )));
        }
    }

    // One extra row tells whether another page follows.
    let mut rows = store
        .query(&query.source, query.created_at, after.as_ref(), limit + 1)
        .await?;
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);

    let next_cursor = match rows.last() {
        Some(last) if has_more => Some(encode_cursor(&PageKey::from(last))?),
        _ => None,
    };
    debug!(returned = rows.len(), has_more, "Listed news");

    let items: Vec<NewsRecord> = rows.into_iter().map(|r| present(r, options)).collect();
    Ok(NewsPage {
        count: items.len(),
        items,
        next_cursor,
    })
}
