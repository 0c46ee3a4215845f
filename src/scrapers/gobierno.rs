//! Government news site (WordPress) feed and article scraper.
//!
//! The site publishes an RSS feed whose `<guid>` is a short URL of the form
//! `https://site/?p=12345` and whose `<link>` is the long article URL. Article
//! pages wrap the lead image as `<article><div><img src=...>`.

use crate::error::{FeedError, FetchError};
use crate::http::HttpGet;
use crate::models::{FeedEntry, FeedSnapshot};
use crate::scrapers::{FeedSource, PageScraper};
use feed_rs::parser;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// First `img` two levels inside an `article`.
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article > div > img").expect("static selector"));

/// RSS feed of the government news site.
#[derive(Debug, Clone)]
pub struct GobiernoFeed<H> {
    http: H,
    url: String,
}

impl<H: HttpGet> GobiernoFeed<H> {
    pub fn new(http: H, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

impl<H: HttpGet> FeedSource for GobiernoFeed<H> {
    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn load(&self) -> Result<FeedSnapshot, FeedError> {
        let response = self.http.get(&self.url).await?;
        let snapshot = parse_feed(&response.body)?;
        info!(
            entries = snapshot.entries.len(),
            updated = ?snapshot.updated,
            "Loaded feed"
        );
        Ok(snapshot)
    }
}

/// Parse RSS/Atom bytes into a [`FeedSnapshot`].
///
/// Entries without a link or a publication time cannot be ingested and are
/// dropped here with a warning. Missing titles and summaries become empty
/// strings.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedSnapshot, FeedError> {
    let feed = parser::parse(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;
    let updated = feed.updated.map(|dt| dt.timestamp());

    let mut entries = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            warn!(id = %entry.id, "Feed entry has no link; skipping");
            continue;
        };
        let Some(published_at) = entry.published.map(|dt| dt.timestamp()) else {
            warn!(id = %entry.id, "Feed entry has no publication date; skipping");
            continue;
        };
        entries.push(FeedEntry {
            id: entry.id,
            link,
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            summary: entry.summary.map(|s| s.content).unwrap_or_default(),
            published_at,
        });
    }

    Ok(FeedSnapshot { updated, entries })
}

/// Scrapes the lead image of an article page.
#[derive(Debug, Clone)]
pub struct ArticleImageScraper<H> {
    http: H,
}

impl<H: HttpGet> ArticleImageScraper<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }
}

impl<H: HttpGet> PageScraper for ArticleImageScraper<H> {
    #[instrument(level = "info", skip_all, fields(article_url = %article_url))]
    async fn image_url(&self, article_url: &str) -> Result<Option<String>, FetchError> {
        let response = self.http.get(article_url).await?;
        let html = String::from_utf8_lossy(&response.body);
        let found = extract_image_url(&html, article_url);
        debug!(image = ?found, bytes = response.body.len(), "Parsed article page");
        Ok(found)
    }
}

/// Find the lead image `src` in an article page, resolved against `page_url`.
pub fn extract_image_url(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let src = document
        .select(&IMAGE_SELECTOR)
        .find_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())?;

    match Url::parse(page_url).and_then(|base| base.join(src)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(src.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ReqwestGet, RetryGet, RetryPolicy};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
    <title>Noticias</title>
    <link>https://chacabuco.gob.ar</link>
    <lastBuildDate>Tue, 14 Nov 2023 22:13:20 +0000</lastBuildDate>
    <item>
        <title>Obra en la plaza</title>
        <link>https://chacabuco.gob.ar/obra-en-la-plaza/</link>
        <guid isPermaLink="false">https://chacabuco.gob.ar/?p=101</guid>
        <pubDate>Tue, 14 Nov 2023 22:13:20 +0000</pubDate>
        <description><![CDATA[Se inaugur&oacute; la obra [&#8230;]]]></description>
    </item>
    <item>
        <title>Sin fecha</title>
        <link>https://chacabuco.gob.ar/sin-fecha/</link>
        <guid isPermaLink="false">https://chacabuco.gob.ar/?p=102</guid>
    </item>
    <item>
        <title>Vacunaci&#243;n</title>
        <link>https://chacabuco.gob.ar/vacunacion/</link>
        <guid isPermaLink="false">https://chacabuco.gob.ar/?p=100</guid>
        <pubDate>Mon, 13 Nov 2023 10:00:00 +0000</pubDate>
        <description>Campa&#241;a</description>
    </item>
</channel></rss>"#;

    const PAGE: &str = r#"<html><body>
        <img src="/logo.png">
        <article>
            <h1>Obra</h1>
            <div><p>texto</p><img src="/wp-content/uploads/2023/11/obra.jpg"><img src="/second.jpg"></div>
        </article>
    </body></html>"#;

    fn http() -> RetryGet<ReqwestGet> {
        RetryGet::new(
            ReqwestGet::with_timeout(Duration::from_secs(5)).unwrap(),
            RetryPolicy::immediate(3),
        )
    }

    #[test]
    fn test_parse_feed_entries_and_updated() {
        let snapshot = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(snapshot.updated, Some(1_700_000_000));
        assert_eq!(snapshot.entries.len(), 2);

        let first = &snapshot.entries[0];
        assert_eq!(first.id, "https://chacabuco.gob.ar/?p=101");
        assert_eq!(first.link, "https://chacabuco.gob.ar/obra-en-la-plaza/");
        assert_eq!(first.title, "Obra en la plaza");
        assert_eq!(first.published_at, 1_700_000_000);
        assert!(first.summary.ends_with("[&#8230;]"));

        assert_eq!(snapshot.entries[1].id, "https://chacabuco.gob.ar/?p=100");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        let err = parse_feed(b"<not valid xml").unwrap_err();
        assert!(matches!(err, FeedError::Parse(_)));
    }

    #[test]
    fn test_extract_image_url_two_levels_inside_article() {
        let url = extract_image_url(PAGE, "https://chacabuco.gob.ar/obra-en-la-plaza/");
        assert_eq!(
            url.as_deref(),
            Some("https://chacabuco.gob.ar/wp-content/uploads/2023/11/obra.jpg")
        );
    }

    #[test]
    fn test_extract_image_url_keeps_absolute_src() {
        let html = r#"<article><div><img src="http://img/x.PNG"></div></article>"#;
        assert_eq!(
            extract_image_url(html, "https://site/a/").as_deref(),
            Some("http://img/x.PNG")
        );
    }

    #[test]
    fn test_extract_image_url_none_when_nested_deeper() {
        let html = r#"<article><div><figure><img src="/deep.jpg"></figure></div></article>"#;
        assert_eq!(extract_image_url(html, "https://site/a/"), None);
        assert_eq!(extract_image_url("<p>no article</p>", "https://site/a/"), None);
    }

    #[tokio::test]
    async fn test_feed_load_over_http() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FEED)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;

        let feed = GobiernoFeed::new(http(), format!("{}/feed/", mock_server.uri()));
        let snapshot = feed.load().await.unwrap();
        assert_eq!(snapshot.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_feed_load_unreachable_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let feed = GobiernoFeed::new(http(), format!("{}/feed/", mock_server.uri()));
        let err = feed.load().await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_scraper_resolves_against_page_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/obra/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&mock_server)
            .await;

        let scraper = ArticleImageScraper::new(http());
        let found = scraper
            .image_url(&format!("{}/obra/", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(
            found,
            Some(format!("{}/wp-content/uploads/2023/11/obra.jpg", mock_server.uri()))
        );
    }
}
