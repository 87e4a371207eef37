//! Content-addressed blob storage
//!
//! A blob is identified by the SHA-256 hash of its bytes. Writers hash the
//! stream as it arrives so the caller learns the content hash and length
//! without buffering the whole object in memory first.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use hafiz_core::{Error, Result};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Incrementally hashes and writes a single blob. Obtained from
/// [`BlobStore::open_writer`]; consumed by [`BlobWriter::finish`].
#[async_trait]
pub trait BlobWriter: Send {
    /// Feed the next chunk of the blob into the writer.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Finalize the write, moving the temp file into place under its
    /// content hash. Returns the hex-encoded hash and the total length
    /// written.
    async fn finish(self: Box<Self>) -> Result<(String, u64)>;
}

/// Local content-addressed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a streaming writer for a new blob.
    async fn open_writer(&self) -> Result<Box<dyn BlobWriter>>;

    /// Store a blob in one call, for callers that already hold the full
    /// buffer. Equivalent to driving a writer with a single chunk.
    async fn store_blob(&self, data: Bytes) -> Result<(String, u64)> {
        let mut writer = self.open_writer().await?;
        writer.write_chunk(data).await?;
        writer.finish().await
    }

    /// Retrieve a blob's full contents by hash.
    async fn get_blob(&self, hash: &str) -> Result<Bytes>;

    /// Delete a blob by hash. Deleting a hash that is not present is not
    /// an error.
    async fn delete_blob(&self, hash: &str) -> Result<()>;

    /// Check whether a blob is present locally.
    async fn exists(&self, hash: &str) -> Result<bool>;

    /// Size of a locally stored blob.
    async fn blob_size(&self, hash: &str) -> Result<u64>;

    /// `(bytes_used, bytes_free)`, with `bytes_free` clamped to the
    /// configured storage ceiling.
    async fn free_space(&self) -> Result<(u64, u64)>;

    /// Hashes of every blob currently held locally, used by the
    /// reconciler to compare disk contents against ownership records.
    async fn list_local_blobs(&self) -> Result<Vec<String>>;
}

/// Filesystem-backed [`BlobStore`]. Blobs live at
/// `<data_dir>/objects/<hash[..2]>/<hash>`, sharded by hash prefix so no
/// single directory accumulates too many entries. New writes land in
/// `<data_dir>/tmp/<uuid>` and are renamed into place once the hash is
/// known.
pub struct LocalBlobStore {
    data_dir: PathBuf,
    max_storage: u64,
}

impl LocalBlobStore {
    pub fn new(data_dir: impl AsRef<Path>, max_storage: u64) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            max_storage,
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.objects_dir()).await?;
        fs::create_dir_all(self.tmp_dir()).await?;
        info!(data_dir = %self.data_dir.display(), "blob store initialized");
        Ok(())
    }

    fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        let prefix = &hash[..2.min(hash.len())];
        self.objects_dir().join(prefix).join(hash)
    }

    /// Health check — verify the store is accessible and writable.
    pub async fn health_check(&self) -> Result<()> {
        if !self.data_dir.exists() {
            return Err(Error::InternalError("data directory does not exist".to_string()));
        }
        let probe = self.data_dir.join(".health_check");
        fs::write(&probe, b"ok")
            .await
            .map_err(|e| Error::InternalError(format!("storage not writable: {e}")))?;
        let _ = fs::remove_file(&probe).await;
        Ok(())
    }
}

pub struct LocalBlobWriter {
    tmp_path: PathBuf,
    objects_dir: PathBuf,
    file: fs::File,
    hasher: Sha256,
    written: u64,
}

impl LocalBlobWriter {
    async fn create(store: &LocalBlobStore) -> Result<Self> {
        fs::create_dir_all(store.tmp_dir()).await?;
        let tmp_path = store.tmp_dir().join(uuid::Uuid::new_v4().to_string());
        let file = fs::File::create(&tmp_path).await?;
        Ok(Self {
            tmp_path,
            objects_dir: store.objects_dir(),
            file,
            hasher: Sha256::new(),
            written: 0,
        })
    }
}

#[async_trait]
impl BlobWriter for LocalBlobWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.hasher.update(&chunk);
        self.written += chunk.len() as u64;
        self.file.write_all(&chunk).await?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(String, u64)> {
        self.file.sync_all().await?;
        let hash = hex::encode(self.hasher.finalize());

        let prefix = &hash[..2.min(hash.len())];
        let dest_dir = self.objects_dir.join(prefix);
        fs::create_dir_all(&dest_dir).await?;
        let dest = dest_dir.join(&hash);

        if fs::metadata(&dest).await.is_ok() {
            // Identical content already stored under this hash; drop the
            // duplicate temp file rather than overwrite.
            let _ = fs::remove_file(&self.tmp_path).await;
        } else {
            fs::rename(&self.tmp_path, &dest).await?;
        }

        debug!(%hash, bytes = self.written, "blob stored");
        Ok((hash, self.written))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn open_writer(&self) -> Result<Box<dyn BlobWriter>> {
        Ok(Box::new(LocalBlobWriter::create(self).await?))
    }

    async fn get_blob(&self, hash: &str) -> Result<Bytes> {
        let path = self.object_path(hash);
        if !path.exists() {
            return Err(Error::NoSuchBlob(hash.to_string()));
        }
        let data = fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete_blob(&self, hash: &str) -> Result<()> {
        let path = self.object_path(hash);
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(%hash, "blob deleted");
        }
        Ok(())
    }

    async fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.object_path(hash).exists())
    }

    async fn blob_size(&self, hash: &str) -> Result<u64> {
        let path = self.object_path(hash);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| Error::NoSuchBlob(hash.to_string()))?;
        Ok(metadata.len())
    }

    async fn free_space(&self) -> Result<(u64, u64)> {
        let mut bytes_used = 0u64;
        let mut dirs = vec![self.objects_dir()];
        while let Some(dir) = dirs.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    dirs.push(entry.path());
                } else {
                    bytes_used += meta.len();
                }
            }
        }

        let data_dir = self.data_dir.clone();
        let raw_free = tokio::task::spawn_blocking(move || fs2::available_space(&data_dir))
            .await
            .map_err(|e| Error::InternalError(format!("free space check panicked: {e}")))?
            .map_err(|_| Error::FreeSpaceUnsupported)?;

        let bytes_free = hafiz_core::utils::clamp_free_space(raw_free, bytes_used, self.max_storage);
        Ok((bytes_used, bytes_free))
    }

    async fn list_local_blobs(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        let mut dirs = vec![self.objects_dir()];
        while let Some(dir) = dirs.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    dirs.push(entry.path());
                } else if let Some(name) = entry.file_name().to_str() {
                    hashes.push(name.to_string());
                }
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (LocalBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), 0);
        store.init().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn store_and_get_roundtrips() {
        let (store, _dir) = store().await;
        let (hash, len) = store.store_blob(Bytes::from_static(b"hello world")).await.unwrap();
        assert_eq!(len, 11);
        assert!(store.exists(&hash).await.unwrap());
        let back = store.get_blob(&hash).await.unwrap();
        assert_eq!(back, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn identical_content_shares_one_hash() {
        let (store, _dir) = store().await;
        let (h1, _) = store.store_blob(Bytes::from_static(b"same")).await.unwrap();
        let (h2, _) = store.store_blob(Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.list_local_blobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_blob_is_no_such_blob() {
        let (store, _dir) = store().await;
        let err = store.get_blob("deadbeef").await.unwrap_err();
        assert!(matches!(err, Error::NoSuchBlob(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _dir) = store().await;
        let (hash, _) = store.store_blob(Bytes::from_static(b"x")).await.unwrap();
        store.delete_blob(&hash).await.unwrap();
        store.delete_blob(&hash).await.unwrap();
        assert!(!store.exists(&hash).await.unwrap());
    }
}
