//! src/services/object_store.rs
//!
//! Client interface to the storage network plus the filesystem gateway that
//! implements it. Buckets map to directories beneath `base_path` and object
//! payloads are sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Byte stream accepted by uploads.
pub type ObjectStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// Reader handed back by downloads.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// What the store knows about a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    /// Hex MD5 of the payload. Only known right after an upload.
    pub etag: Option<String>,
}

/// Operations the application needs from the storage network.
///
/// Implementations must be safe to share across request tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Remove a bucket and every object in it.
    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Stream an upload into `bucket/key`, replacing any previous payload.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        stream: ObjectStream<'_>,
    ) -> StoreResult<ObjectInfo>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<(ObjectInfo, ObjectReader)>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Verify the store is reachable and writable.
    async fn health_check(&self) -> StoreResult<()>;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Object store gateway on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory where buckets live.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// Two-level shard directories for an object key.
    ///
    /// First two bytes of MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.bucket_root(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Validate the bucket name and check its directory exists.
    async fn existing_bucket_root(&self, bucket: &str) -> StoreResult<PathBuf> {
        validate_bucket_name(bucket)?;
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(StoreError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket_name(bucket)?;
        fs::create_dir_all(&self.base_path).await?;
        match fs::create_dir(self.bucket_root(bucket)).await {
            Ok(_) => {
                debug!(bucket, "created bucket");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        match self.existing_bucket_root(bucket).await {
            Ok(_) => Ok(true),
            Err(StoreError::BucketNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        let root = self.existing_bucket_root(bucket).await?;
        fs::remove_dir_all(&root).await?;
        debug!(bucket, "deleted bucket");
        Ok(())
    }

    /// Writes into a temporary file while hashing, fsyncs, then renames into
    /// place. The temporary file is removed on any failure.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut stream: ObjectStream<'_>,
    ) -> StoreResult<ObjectInfo> {
        validate_object_key(key)?;
        self.existing_bucket_root(bucket).await?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = self.bucket_root(bucket).join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let etag = format!("{:x}", digest.compute());
        debug!(bucket, key, size_bytes, %etag, "stored object");

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size_bytes,
            etag: Some(etag),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<(ObjectInfo, ObjectReader)> {
        validate_object_key(key)?;
        self.existing_bucket_root(bucket).await?;

        let file_path = self.object_path(bucket, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;
        let size_bytes = file.metadata().await?.len();

        let info = ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size_bytes,
            etag: None,
        };
        Ok((info, Box::new(file)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        validate_object_key(key)?;
        let bucket_root = self.existing_bucket_root(bucket).await?;

        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// Writes, reads back and removes a scratch file under `base_path`.
    async fn health_check(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let scratch = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&scratch, b"readyz").await?;
        let bytes = fs::read(&scratch).await;
        let _ = fs::remove_file(&scratch).await;
        if bytes? != b"readyz" {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "scratch file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Validate a bucket name against the storage network's naming rules.
///
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
///
/// Usernames are bucket names, so registration runs this too.
pub fn validate_bucket_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Reject keys that could escape the bucket directory.
fn validate_object_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(StoreError::InvalidObjectKey);
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidObjectKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StoreError::InvalidObjectKey);
    }
    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn body(chunks: &[&'static [u8]]) -> ObjectStream<'static> {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, io::Error>(Bytes::from_static(*c)))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[test]
    fn bucket_names_follow_network_rules() {
        assert!(validate_bucket_name("alice").is_ok());
        assert!(validate_bucket_name("dj-bob.2").is_ok());

        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name("Alice").is_err());
        assert!(validate_bucket_name("al_ice").is_err());
        assert!(validate_bucket_name("-alice").is_err());
        assert!(validate_bucket_name("alice.").is_err());
        assert!(validate_bucket_name("al..ice").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
    }

    #[test]
    fn object_keys_cannot_escape_the_bucket() {
        assert!(validate_object_key("0b1c/track.mp3").is_ok());
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("/etc/passwd").is_err());
        assert!(validate_object_key("a/../../b").is_err());
        assert!(validate_object_key("a/./b").is_err());
        assert!(validate_object_key("a//b").is_err());
        assert!(validate_object_key("0b1c/Wait... what.mp3").is_ok());
        assert!(validate_object_key("0b1c/..hidden..mp3").is_ok());
        assert!(validate_object_key("dir/").is_err());
        assert!(validate_object_key("bad\\key").is_err());
    }

    #[test]
    fn ipv4_detection() {
        assert!(is_ipv4_like("10.0.0.1"));
        assert!(!is_ipv4_like("999.1.1.1"));
        assert!(!is_ipv4_like("a.b.c.d"));
        assert!(!is_ipv4_like("1.2.3"));
    }

    #[tokio::test]
    async fn put_get_delete_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.create_bucket("alice").await.unwrap();

        let info = store
            .put_object("alice", "k1/song.mp3", body(&[b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(info.size_bytes, 11);
        assert_eq!(
            info.etag.as_deref(),
            Some(format!("{:x}", md5::compute(b"hello world")).as_str())
        );

        let (meta, mut reader) = store.get_object("alice", "k1/song.mp3").await.unwrap();
        assert_eq!(meta.size_bytes, 11);
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello world");

        store.delete_object("alice", "k1/song.mp3").await.unwrap();
        assert!(matches!(
            store.get_object("alice", "k1/song.mp3").await,
            Err(StoreError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            store.delete_object("alice", "k1/song.mp3").await,
            Err(StoreError::ObjectNotFound { .. })
        ));

        // Shard directories are pruned; only the bucket root is left.
        let mut entries = fs::read_dir(dir.path().join("alice")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uploads_require_an_existing_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let err = store
            .put_object("ghost", "k/file.mp3", body(&[b"x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_object_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.create_bucket("alice").await.unwrap();

        let broken: ObjectStream<'static> = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ])
        .boxed();
        assert!(store.put_object("alice", "k/x.mp3", broken).await.is_err());
        assert!(store.get_object("alice", "k/x.mp3").await.is_err());
    }

    #[tokio::test]
    async fn bucket_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().join("objects"));

        assert!(!store.bucket_exists("alice").await.unwrap());
        store.create_bucket("alice").await.unwrap();
        assert!(store.bucket_exists("alice").await.unwrap());
        assert!(matches!(
            store.create_bucket("alice").await,
            Err(StoreError::BucketAlreadyExists(_))
        ));

        store
            .put_object("alice", "k/a.mp3", body(&[b"a"]))
            .await
            .unwrap();
        store.delete_bucket("alice").await.unwrap();
        assert!(!store.bucket_exists("alice").await.unwrap());
        assert!(matches!(
            store.delete_bucket("alice").await,
            Err(StoreError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn health_check_passes_on_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.health_check().await.unwrap();
    }
}
