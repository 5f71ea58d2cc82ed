//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Object options applied when a blob is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// MIME type stored with the object.
    pub content_type: Option<String>,
    /// Canned ACL (e.g., "public-read"). Ignored by backends without ACLs.
    pub acl: Option<String>,
    /// Server-side encryption algorithm (e.g., "AES256"). Ignored by backends
    /// that always encrypt or never do.
    pub server_side_encryption: Option<String>,
}

/// Receipt for one uploaded part, handed back at finalize time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number; parts are assembled in ascending order.
    pub part_number: i32,
    /// Entity tag reported by the backend, if any.
    pub e_tag: Option<String>,
    /// Part size in bytes.
    pub size: u64,
}

/// A finalized, addressable object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedObject {
    /// URL the object is reachable at, as reported by the backend.
    pub url: String,
    /// Total object size in bytes.
    pub size: u64,
}

/// Object store abstraction for package archives.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Start a multipart upload.
    ///
    /// Nothing becomes visible under `key` until [`MultipartUpload::finalize`]
    /// succeeds.
    async fn begin_multipart(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn MultipartUpload>>;

    /// URL an object would be addressed by once stored.
    fn object_url(&self, key: &str) -> String;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// An in-progress multipart upload.
///
/// Parts may be written concurrently through a shared reference. The upload
/// must end in exactly one of `finalize` or `abort`; dropping it without
/// either leaves incomplete state for the backend to expire.
#[async_trait]
pub trait MultipartUpload: Send + Sync {
    /// Destination key of the upload.
    fn key(&self) -> &str;

    /// Upload one part. Re-uploading a part number replaces it.
    async fn write_part(&self, part_number: i32, data: Bytes) -> StorageResult<CompletedPart>;

    /// Assemble the parts and make the object addressable.
    async fn finalize(self: Box<Self>, parts: Vec<CompletedPart>)
    -> StorageResult<FinalizedObject>;

    /// Discard all uploaded parts.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
