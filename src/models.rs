//! Data models for feed entries and the news records derived from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`FeedEntry`] / [`FeedSnapshot`]: what the feed collaborator hands us
//! - [`EntryKey`]: the stable per-article identifier taken from the entry id
//! - [`ImageMapping`]: entry key to scraped image URL, built once per run
//! - [`NewsRecord`]: the persisted shape, one per new entry
//! - [`NewsPage`] / [`PageKey`]: read-side listing results
//!
//! Record fields use PascalCase on the wire (`Id`, `CreatedAt`, ...) to match
//! the schema consumers of the store already read.

use crate::error::EntryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Query parameter of the entry id that carries the article key.
const KEY_PARAM: &str = "p";

/// A single item as published in the feed.
///
/// `id` is the short GUID-bearing URL (`https://site/?p=123`), `link` is the
/// long article URL that actually serves the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub link: String,
    pub title: String,
    /// Raw summary; may contain HTML entities and non-breaking spaces.
    pub summary: String,
    /// Publication time as a Unix timestamp in seconds.
    pub published_at: i64,
}

/// The feed as loaded for one run.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Feed-level "last updated" timestamp, when the feed declares one.
    pub updated: Option<i64>,
    /// Entries in feed order.
    pub entries: Vec<FeedEntry>,
}

/// Stable per-article identifier extracted from the entry id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    /// Extract the key from an entry id's `p` query parameter.
    ///
    /// # Errors
    ///
    /// [`EntryError::InvalidId`] when the id is not a URL,
    /// [`EntryError::MissingKey`] when the parameter is absent or empty.
    pub fn from_entry_id(id: &str) -> Result<Self, EntryError> {
        let parsed = Url::parse(id).map_err(|source| EntryError::InvalidId {
            id: id.to_string(),
            source,
        })?;
        parsed
            .query_pairs()
            .find(|(name, value)| name == KEY_PARAM && !value.is_empty())
            .map(|(_, value)| EntryKey(value.into_owned()))
            .ok_or_else(|| EntryError::MissingKey { id: id.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A feed entry whose key has already been extracted.
#[derive(Debug, Clone)]
pub struct KeyedEntry {
    pub key: EntryKey,
    pub entry: FeedEntry,
}

impl TryFrom<FeedEntry> for KeyedEntry {
    type Error = EntryError;

    fn try_from(entry: FeedEntry) -> Result<Self, Self::Error> {
        let key = EntryKey::from_entry_id(&entry.id)?;
        Ok(KeyedEntry { key, entry })
    }
}

/// Entry key to image source URL. Built by the resolver, read-only afterwards.
pub type ImageMapping = HashMap<EntryKey, String>;

/// A news record as written to the record store.
///
/// `Image` is omitted entirely when no image was stored; it is never
/// serialized as `null` or an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewsRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Position of a record within a source's `CreatedAt`-descending ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageKey {
    pub source: String,
    pub created_at: i64,
    pub id: String,
}

impl From<&NewsRecord> for PageKey {
    fn from(record: &NewsRecord) -> Self {
        PageKey {
            source: record.source.clone(),
            created_at: record.created_at,
            id: record.id.clone(),
        }
    }
}

/// One page of a news listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewsPage {
    pub items: Vec<NewsRecord>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
