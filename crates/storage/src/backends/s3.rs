//! S3-compatible storage backend using AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{CompletedPart, FinalizedObject, MultipartUpload, ObjectStore, PutOptions};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::instrument;

/// Characters escaped in each key segment of a constructed object URL.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Marker included in lazy-credentials initialization errors so we can map them
/// to actionable storage config errors instead of generic S3 transport failures.
const CREDENTIALS_INIT_ERROR_MARKER: &str = "packyard-s3-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "packyard-s3-lazy-credentials-resolve";

/// Lazily initializes the AWS default credentials chain on first signed request.
///
/// This avoids constructor-time side effects (notably TLS/native-root initialization)
/// in environments where no root certificates are available.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn build_chain(
        &self,
    ) -> Result<aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        let region = aws_config::Region::new(self.region.clone());

        tokio::task::spawn(async move {
            aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region)
                .build()
                .await
        })
        .await
        .map_err(|join_err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_INIT_ERROR_MARKER}: failed to initialize AWS default credential chain: {join_err}"
            ))
        })
    }

    async fn chain(
        &self,
    ) -> Result<&aws_config::default_provider::credentials::DefaultCredentialsChain, CredentialsError>
    {
        self.chain
            .get_or_try_init(|| async { self.build_chain().await })
            .await
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self.chain().await?;
        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let err_text = err.to_string();
    if err_text.contains(CREDENTIALS_INIT_ERROR_MARKER)
        || err_text.contains(CREDENTIALS_RESOLVE_ERROR_MARKER)
    {
        return StorageError::Config(
            "S3 credential initialization failed. Configure AWS credentials explicitly or ensure ambient AWS credentials and trust roots are available."
                .to_string(),
        );
    }

    StorageError::S3(Box::new(err))
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Normalized endpoint, or the canonical AWS endpoint for the region.
    endpoint: String,
    region: String,
    force_path_style: bool,
    custom_endpoint: bool,
    public_base_url: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`) instead of
    ///   virtual-hosted style (`bucket.endpoint/key`). Required for MinIO and some
    ///   S3-compatible services.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
        public_base_url: Option<String>,
    ) -> StorageResult<Self> {
        let has_access_key_id = access_key_id.is_some();
        let has_secret_access_key = secret_access_key.is_some();
        if has_access_key_id ^ has_secret_access_key {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "packyard-config",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            s3_config_builder = s3_config_builder
                .credentials_provider(LazyDefaultCredentialsProvider::new(resolved_region.clone()));
        }

        let normalized_endpoint = endpoint.as_ref().map(|endpoint_url| {
            // Bare host:port endpoints (e.g., "minio:9000") are plain HTTP.
            let endpoint_lower = endpoint_url.to_lowercase();
            if endpoint_lower.starts_with("http://") || endpoint_lower.starts_with("https://") {
                endpoint_url.trim_end_matches('/').to_string()
            } else {
                format!("http://{}", endpoint_url.trim_end_matches('/'))
            }
        });

        if let Some(endpoint_url) = &normalized_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);

            // Plain HTTP endpoints get an HTTP-only client so initialization
            // doesn't depend on native trust roots.
            if endpoint_url.to_ascii_lowercase().starts_with("http://") {
                s3_config_builder =
                    s3_config_builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let stored_endpoint = match &normalized_endpoint {
            Some(url) => url.clone(),
            None => format!("https://s3.{}.amazonaws.com", resolved_region),
        };

        // Strip trailing slashes to avoid double-slash keys like "prefix//key"
        let normalized_prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
            endpoint: stored_endpoint,
            region: resolved_region,
            force_path_style,
            custom_endpoint: normalized_endpoint.is_some(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Build the object URL for a full key.
    ///
    /// Used when the service does not report a location for a completed upload.
    fn url_for_full_key(&self, full_key: &str) -> String {
        let encoded_key = full_key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");

        if let Some(base) = &self.public_base_url {
            return format!("{base}/{encoded_key}");
        }

        if self.force_path_style || self.custom_endpoint {
            format!("{}/{}/{}", self.endpoint, self.bucket, encoded_key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded_key
            )
        }
    }

    /// Convert an AWS SDK error to StorageError, mapping NotFound appropriately.
    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
            let raw = service_err.raw();
            if raw.status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        map_s3_operation_error(err)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err
                    && service_err.raw().status().as_u16() == 404
                {
                    return Ok(false);
                }
                Err(map_s3_operation_error(err))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();

        Ok(bytes)
    }

    #[instrument(skip(self, options), fields(backend = "s3"))]
    async fn begin_multipart(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn MultipartUpload>> {
        let full_key = self.full_key(key);

        let create_output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&full_key)
            .set_content_type(options.content_type.clone())
            .set_acl(options.acl.as_deref().map(ObjectCannedAcl::from))
            .set_server_side_encryption(
                options
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        let upload_id = create_output
            .upload_id()
            .ok_or_else(|| StorageError::Multipart("S3 did not return upload_id".to_string()))?
            .to_string();

        tracing::debug!(key = %full_key, upload_id = %upload_id, "Started S3 multipart upload");

        Ok(Box::new(S3Multipart {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            fallback_url: self.url_for_full_key(&full_key),
            full_key,
            upload_id,
            options: options.clone(),
        }))
    }

    fn object_url(&self, key: &str) -> String {
        self.url_for_full_key(&self.full_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let marker_key = self.full_key(".packyard-health-check");

        let health_check_future = async {
            let marker_data = Bytes::from_static(b"health-check");
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(marker_data.into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    if let aws_sdk_s3::error::SdkError::ServiceError(ref se) = e
                        && se.raw().status().as_u16() != 404
                    {
                        return Err(map_s3_operation_error(e));
                    }
                }
            }

            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check_future)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
    }
}

/// S3 multipart upload.
struct S3Multipart {
    client: Client,
    bucket: String,
    key: String,
    full_key: String,
    upload_id: String,
    fallback_url: String,
    options: PutOptions,
}

#[async_trait]
impl MultipartUpload for S3Multipart {
    fn key(&self) -> &str {
        &self.key
    }

    async fn write_part(&self, part_number: i32, data: Bytes) -> StorageResult<CompletedPart> {
        let size = data.len() as u64;
        let upload_output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.full_key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(CompletedPart {
            part_number,
            e_tag: upload_output.e_tag().map(|s| s.to_string()),
            size,
        })
    }

    async fn finalize(
        self: Box<Self>,
        mut parts: Vec<CompletedPart>,
    ) -> StorageResult<FinalizedObject> {
        parts.sort_by_key(|p| p.part_number);
        let size = parts.iter().map(|p| p.size).sum();

        // Multipart uploads need at least one part, so empty objects go through PutObject.
        if parts.is_empty() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.full_key)
                .upload_id(&self.upload_id)
                .send()
                .await
            {
                tracing::warn!(
                    key = %self.full_key,
                    upload_id = %self.upload_id,
                    error = %e,
                    "Failed to abort multipart upload for zero-byte object, orphaned parts may remain"
                );
            }

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.full_key)
                .set_content_type(self.options.content_type.clone())
                .set_acl(self.options.acl.as_deref().map(ObjectCannedAcl::from))
                .body(Bytes::new().into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            return Ok(FinalizedObject {
                url: self.fallback_url.clone(),
                size: 0,
            });
        }

        let completed_parts = parts
            .iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .set_e_tag(p.e_tag.clone())
                    .part_number(p.part_number)
                    .build()
            })
            .collect::<Vec<_>>();

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let output = match self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.full_key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                // The caller gave up ownership, so the uploaded parts are ours to release
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.full_key)
                    .upload_id(&self.upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        key = %self.full_key,
                        upload_id = %self.upload_id,
                        error = %abort_err,
                        "Failed to abort multipart upload after completion failed, orphaned parts may remain"
                    );
                }
                return Err(map_s3_operation_error(err));
            }
        };

        let url = output
            .location()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.fallback_url.clone());

        Ok(FinalizedObject { url, size })
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.full_key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(())
    }
}
