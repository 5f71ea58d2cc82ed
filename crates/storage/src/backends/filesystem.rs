//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{CompletedPart, FinalizedObject, MultipartUpload, ObjectStore, PutOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Directory under the root holding parts of in-progress multipart uploads.
const MULTIPART_DIR: &str = ".multipart";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;
        Ok(Self {
            root,
            public_base_url: None,
        })
    }

    /// Serve object URLs from `base_url` instead of `file://` paths.
    pub fn with_public_base_url(mut self, base_url: Option<String>) -> Self {
        self.public_base_url = base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    /// Storage root (canonicalized).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// This is an async wrapper around `key_path_sync` that uses `spawn_blocking`
    /// to avoid blocking the Tokio runtime during `canonicalize` and
    /// `symlink_metadata`.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation with path traversal protection.
    ///
    /// Returns an error if the key would escape the storage root, including
    /// through symlinks, or if it targets the multipart staging area.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\')
        {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        if key == MULTIPART_DIR || key.starts_with(&format!("{MULTIPART_DIR}/")) {
            return Err(StorageError::InvalidKey(format!("reserved prefix: {key}")));
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Existing paths (including broken symlinks) must resolve inside the root.
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let canonical = path.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "symlink target missing or invalid: {key}"
                        ))
                    } else {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    }
                })?;

                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat path: {err}"),
                )));
            }
        }

        // New paths: the nearest existing ancestor must resolve inside the root,
        // so directories are never created through a symlinked parent.
        let mut ancestor = path.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::symlink_metadata(parent) {
                Ok(meta) => {
                    let parent_canonical = parent.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "ancestor symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize ancestor: {e}"),
                            ))
                        }
                    })?;

                    if !parent_canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "ancestor path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat ancestor: {err}"),
                    )));
                }
            }
            ancestor = parent;
        }

        Ok(path)
    }

    /// Sibling temp path with a unique suffix, so concurrent writers never collide.
    fn temp_path_for(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        )
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(not_found_or_io(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, _options), fields(backend = "filesystem"))]
    async fn begin_multipart(
        &self,
        key: &str,
        _options: &PutOptions,
    ) -> StorageResult<Box<dyn MultipartUpload>> {
        let final_path = self.key_path(key).await?;
        let upload_id = Uuid::new_v4();
        let staging_dir = self.root.join(MULTIPART_DIR).join(upload_id.to_string());
        fs::create_dir_all(&staging_dir).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Started filesystem multipart upload");

        Ok(Box::new(FilesystemMultipart {
            key: key.to_string(),
            staging_dir,
            final_path,
            url: self.object_url(key),
        }))
    }

    fn object_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("file://{}/{}", self.root.display(), key),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Multipart upload staged as one file per part under `.multipart/<id>/`.
struct FilesystemMultipart {
    key: String,
    staging_dir: PathBuf,
    final_path: PathBuf,
    url: String,
}

impl FilesystemMultipart {
    fn part_path(&self, part_number: i32) -> PathBuf {
        self.staging_dir.join(format!("part-{part_number:05}"))
    }

    /// Concatenate the parts into a sibling temp file and rename it into place.
    async fn assemble(&self, mut parts: Vec<CompletedPart>) -> StorageResult<u64> {
        parts.sort_by_key(|p| p.part_number);
        if let Some(window) = parts.windows(2).find(|w| w[0].part_number == w[1].part_number) {
            return Err(StorageError::Multipart(format!(
                "duplicate part number {}",
                window[0].part_number
            )));
        }

        if let Some(parent) = self.final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = FilesystemBackend::temp_path_for(&self.final_path);

        let written = async {
            let mut out = fs::File::create(&temp_path).await?;
            let mut size = 0u64;
            for part in &parts {
                let mut input = fs::File::open(self.part_path(part.part_number))
                    .await
                    .map_err(|e| {
                        StorageError::Multipart(format!(
                            "part {} unavailable: {e}",
                            part.part_number
                        ))
                    })?;
                size += tokio::io::copy(&mut input, &mut out).await?;
            }
            out.sync_all().await?;
            fs::rename(&temp_path, &self.final_path).await?;
            Ok::<u64, StorageError>(size)
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        written
    }
}

#[async_trait]
impl MultipartUpload for FilesystemMultipart {
    fn key(&self) -> &str {
        &self.key
    }

    async fn write_part(&self, part_number: i32, data: Bytes) -> StorageResult<CompletedPart> {
        if part_number < 1 {
            return Err(StorageError::Multipart(format!(
                "part numbers start at 1, got {part_number}"
            )));
        }
        let part_path = self.part_path(part_number);
        let temp_path = FilesystemBackend::temp_path_for(&part_path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &part_path).await?;

        Ok(CompletedPart {
            part_number,
            e_tag: None,
            size: data.len() as u64,
        })
    }

    async fn finalize(
        self: Box<Self>,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<FinalizedObject> {
        // Staging is released whether or not assembly succeeds
        let assembled = self.assemble(parts).await;
        if let Err(e) = fs::remove_dir_all(&self.staging_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                key = %self.key,
                error = %e,
                "Failed to remove multipart staging directory"
            );
        }

        let size = assembled?;
        Ok(FinalizedObject {
            url: self.url.clone(),
            size,
        })
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        match fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
