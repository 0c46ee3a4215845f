//! Mirrors article images into the object store.
//!
//! A failed image never blocks its news record: every failure path here logs
//! and returns `None`, and the record is saved without an `Image`.

use crate::http::HttpGet;
use crate::models::EntryKey;
use crate::storage::{ObjectStore, Visibility};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, instrument, warn};

/// First `.jpg`, `.jpeg` or `.png` in the URL, any case.
static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png)").expect("static regex"));

/// Extension of an image URL as written in the URL (`PNG` stays `PNG`).
pub fn image_extension(url: &str) -> Option<&str> {
    EXTENSION_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// `"{key}.{extension}"`, or `None` when the URL has no recognized extension.
pub fn image_file_name(key: &EntryKey, url: &str) -> Option<String> {
    image_extension(url).map(|ext| format!("{key}.{ext}"))
}

/// `"/{media_path}/{file_name}"`, tolerating slashes around `media_path`.
pub fn object_key(media_path: &str, file_name: &str) -> String {
    let prefix = media_path.trim_matches('/');
    if prefix.is_empty() {
        format!("/{file_name}")
    } else {
        format!("/{prefix}/{file_name}")
    }
}

/// Downloads images with the shared retrying client and stores them publicly.
#[derive(Debug)]
pub struct ImageUploader<'a, H, O> {
    http: &'a H,
    objects: &'a O,
    media_path: &'a str,
}

impl<'a, H: HttpGet, O: ObjectStore> ImageUploader<'a, H, O> {
    pub fn new(http: &'a H, objects: &'a O, media_path: &'a str) -> Self {
        Self {
            http,
            objects,
            media_path,
        }
    }

    /// Upload the image of entry `key`, naming the object after the key.
    ///
    /// Returns `None` without any download when the URL has no `jpg`/`jpeg`/
    /// `png` extension.
    pub async fn upload_for_entry(&self, key: &EntryKey, image_url: &str) -> Option<String> {
        let Some(file_name) = image_file_name(key, image_url) else {
            warn!(entry_key = %key, %image_url, "Image URL has no recognized extension; skipping image");
            return None;
        };
        self.upload(Some(image_url), &file_name).await
    }

    /// Download `image_url` and store it under `"/{media_path}/{file_name}"`.
    ///
    /// # Arguments
    ///
    /// * `image_url` - Source of the image; `None` is a no-op
    /// * `file_name` - Object name, usually `"{entry_key}.{extension}"`
    ///
    /// # Returns
    ///
    /// The object key on success. `None` when there is no URL, the download
    /// fails after retries, or the upload fails; each failure is logged.
    #[instrument(level = "info", skip(self))]
    pub async fn upload(&self, image_url: Option<&str>, file_name: &str) -> Option<String> {
        let url = image_url?;

        info!("Downloading image ...");
        let response = match self.http.get(url).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "Error while trying to download image");
                return None;
            }
        };

        info!(status = response.status, bytes = response.body.len(), "Image downloaded. Saving it into object storage ...");
        let key = object_key(self.media_path, file_name);
        match self
            .objects
            .put(
                &key,
                response.body,
                response.content_type.as_deref(),
                Visibility::PublicRead,
            )
            .await
        {
            Ok(()) => {
                info!(%key, "Image successfully uploaded");
                Some(key)
            }
            Err(e) => {
                error!(%key, error = %e, "Error while trying to upload image");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{FetchError, ObjectStoreError};
    use crate::http::{HttpResponse, RetryGet, RetryPolicy};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every put; optionally fails them all.
    #[derive(Default)]
    pub(crate) struct MemoryObjects {
        pub puts: Mutex<Vec<(String, Bytes, Option<String>, Visibility)>>,
        pub fail: bool,
    }

    impl ObjectStore for MemoryObjects {
        async fn put(
            &self,
            key: &str,
            body: Bytes,
            content_type: Option<&str>,
            visibility: Visibility,
        ) -> Result<(), ObjectStoreError> {
            if self.fail {
                return Err(ObjectStoreError::Put {
                    key: key.to_string(),
                    message: "bucket unavailable".to_string(),
                });
            }
            self.puts.lock().unwrap().push((
                key.to_string(),
                body,
                content_type.map(str::to_string),
                visibility,
            ));
            Ok(())
        }
    }

    /// Fails with the queued statuses first, then serves `body`.
    pub(crate) struct FlakyImages {
        pub failures: Mutex<Vec<u16>>,
        pub body: &'static [u8],
        pub calls: AtomicUsize,
    }

    impl FlakyImages {
        pub fn new(mut failures: Vec<u16>, body: &'static [u8]) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                body,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpGet for FlakyImages {
        async fn get(&self, _url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.failures.lock().unwrap().pop() {
                return Err(FetchError::Status(status));
            }
            Ok(HttpResponse {
                status: 200,
                content_type: Some("image/jpeg".to_string()),
                body: Bytes::from_static(self.body),
            })
        }
    }

    fn key(s: &str) -> EntryKey {
        EntryKey::from_entry_id(&format!("https://x/?p={s}")).unwrap()
    }

    #[test]
    fn test_image_extension_matches() {
        assert_eq!(image_extension("http://img/x.jpg"), Some("jpg"));
        assert_eq!(image_extension("http://img/x.jpeg?w=300"), Some("jpeg"));
        assert_eq!(image_extension("http://img/x.PNG"), Some("PNG"));
        assert_eq!(image_extension("http://img/x.JpEg"), Some("JpEg"));
        assert_eq!(image_extension("http://img/x.gif"), None);
        assert_eq!(image_extension("http://img/x"), None);
    }

    #[test]
    fn test_image_file_name_uses_entry_key() {
        assert_eq!(
            image_file_name(&key("abc123"), "http://img/x.PNG").as_deref(),
            Some("abc123.PNG")
        );
        assert_eq!(image_file_name(&key("abc123"), "http://img/x.webp"), None);
    }

    #[test]
    fn test_object_key_layout() {
        assert_eq!(object_key("media/news", "1.jpg"), "/media/news/1.jpg");
        assert_eq!(object_key("/media/news/", "1.jpg"), "/media/news/1.jpg");
        assert_eq!(object_key("", "1.jpg"), "/1.jpg");
    }

    #[tokio::test]
    async fn test_upload_none_url_is_noop() {
        let http = FlakyImages::new(vec![], b"img");
        let objects = MemoryObjects::default();
        let uploader = ImageUploader::new(&http, &objects, "media");

        assert_eq!(uploader.upload(None, "1.jpg").await, None);
        assert_eq!(http.calls(), 0);
        assert!(objects.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_extension_skips_download() {
        let http = FlakyImages::new(vec![], b"img");
        let objects = MemoryObjects::default();
        let uploader = ImageUploader::new(&http, &objects, "media");

        let stored = uploader
            .upload_for_entry(&key("1"), "http://img/photo.webp")
            .await;
        assert_eq!(stored, None);
        assert_eq!(http.calls(), 0);
        assert!(objects.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_503_then_success_uploads_once() {
        let inner = FlakyImages::new(vec![503, 503], b"final-body");
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));
        let objects = MemoryObjects::default();
        let uploader = ImageUploader::new(&http, &objects, "media/news");

        let stored = uploader.upload(Some("http://img/x.jpg"), "7.jpg").await;
        assert_eq!(stored.as_deref(), Some("/media/news/7.jpg"));
        assert_eq!(inner.calls(), 3);

        let puts = objects.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        let (put_key, body, content_type, visibility) = &puts[0];
        assert_eq!(put_key, "/media/news/7.jpg");
        assert_eq!(&body[..], b"final-body");
        assert_eq!(content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(*visibility, Visibility::PublicRead);
    }

    #[tokio::test]
    async fn test_exhausted_download_returns_none() {
        let inner = FlakyImages::new(vec![500, 502, 504], b"never");
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));
        let objects = MemoryObjects::default();
        let uploader = ImageUploader::new(&http, &objects, "media");

        assert_eq!(uploader.upload(Some("http://img/x.jpg"), "1.jpg").await, None);
        assert_eq!(inner.calls(), 3);
        assert!(objects.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_client_error_download_not_retried() {
        let inner = FlakyImages::new(vec![403], b"never");
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));
        let objects = MemoryObjects::default();
        let uploader = ImageUploader::new(&http, &objects, "media");

        assert_eq!(uploader.upload(Some("http://img/x.jpg"), "1.jpg").await, None);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_put_returns_none() {
        let http = FlakyImages::new(vec![], b"img");
        let objects = MemoryObjects {
            fail: true,
            ..Default::default()
        };
        let uploader = ImageUploader::new(&http, &objects, "media");

        assert_eq!(uploader.upload(Some("http://img/x.png"), "1.png").await, None);
        assert_eq!(http.calls(), 1);
    }
}
