use crate::error::ObjectStoreError;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::Region,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Who may read an uploaded object. Article images are served straight from
/// the bucket, so public-read is the only level in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    PublicRead,
}

impl Visibility {
    /// Canned ACL sent with the put.
    fn canned_acl(self) -> ObjectCannedAcl {
        match self {
            Visibility::PublicRead => ObjectCannedAcl::PublicRead,
        }
    }
}

/// Put-object capability.
pub trait ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        visibility: Visibility,
    ) -> Result<(), ObjectStoreError>;
}

/// Connection settings for the S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint (MinIO, localstack).
    pub endpoint: Option<String>,
    pub path_style: bool,
}

/// [`ObjectStore`] on an S3 bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS configuration (environment,
    /// profile, instance role) plus the overrides in `config`.
    pub async fn new(config: ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %config.bucket, endpoint = ?config.endpoint, "Object store client initialized");
        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }
}

impl ObjectStore for S3ObjectStore {
    #[instrument(level = "info", skip(self, body), fields(bucket = %self.bucket, bytes = body.len()))]
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        visibility: Visibility,
    ) -> Result<(), ObjectStoreError> {
        debug!("Uploading object");
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .acl(visibility.canned_acl());

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(|e| ObjectStoreError::Put {
            key: key.to_string(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

        info!("Object uploaded");
        Ok(())
    }
}
