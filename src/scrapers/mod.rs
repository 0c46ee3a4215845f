//! Collaborators that talk to the news source.
//!
//! A source is read in two phases, mirroring how the pipeline uses it:
//!
//! 1. **Feed**: load the syndication feed and turn it into typed entries
//!    ([`FeedSource`])
//! 2. **Page**: fetch one article page and find its representative image
//!    ([`PageScraper`])
//!
//! # Supported Sources
//!
//! | Source | Module | Feed | Image selector |
//! |--------|--------|------|----------------|
//! | Gobierno (WordPress) | [`gobierno`] | RSS via `feed-rs` | `article > div > img` |

use crate::error::{FeedError, FetchError};
use crate::models::FeedSnapshot;

pub mod gobierno;

/// Loads the feed for one run.
pub trait FeedSource {
    async fn load(&self) -> Result<FeedSnapshot, FeedError>;
}

/// Finds the image URL of an article page.
pub trait PageScraper {
    /// `Ok(None)` when the page has no matching image.
    async fn image_url(&self, article_url: &str) -> Result<Option<String>, FetchError>;
}
