use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::fs;

use crate::config::{AppConfig, StorageBackend};

const COPY_SOURCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

/// Key/value blob store. Keys are `/`-separated; prefixes passed to the
/// listing and deletion methods name a directory-like namespace.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>)
        -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// All keys below `prefix`, sorted.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Removes every key below `prefix` and returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    async fn move_object(&self, from: &str, to: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| anyhow!("S3_BUCKET must be set for the s3 storage backend"))?;

        let region = Region::new(config.aws_region.clone());
        let region_provider = RegionProviderChain::first_try(Some(region))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);

        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(credentials);
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        Ok(Self::new(S3Client::from_conf(s3_config), bucket))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download object from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("failed to list objects in S3")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list_objects(prefix).await?;
        for key in &keys {
            self.delete_object(key).await?;
        }
        Ok(keys.len())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        let source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(from, COPY_SOURCE_ENCODE_SET)
        );

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(to)
            .send()
            .await
            .context("failed to copy object in S3")?;

        self.delete_object(from).await
    }
}

/// Stores objects as plain files below a private root directory.
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_matches('/'));
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                bail!("invalid storage key '{key}'");
            }
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStorage for LocalDiskStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory for {key}"))?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {key}"))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path)
            .await
            .with_context(|| format!("failed to read {key}"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow!(err).context(format!("failed to delete {key}"))),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.resolve(prefix)?;
        let mut keys = Vec::new();
        let mut pending = vec![base];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(anyhow!(err).context(format!("failed to list {}", dir.display())))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if let Some(key) = self.key_for(&entry.path()) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let removed = self.list_objects(prefix).await?.len();
        let dir = self.resolve(prefix)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(removed),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(anyhow!(err).context(format!("failed to delete {prefix}"))),
        }
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target)
            .await
            .with_context(|| format!("failed to move {from} to {to}"))
    }
}

/// Builds the backend selected by `STORAGE_BACKEND`.
pub async fn connect_storage(config: &AppConfig) -> Result<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match config.storage_backend {
        StorageBackend::Local => Arc::new(LocalDiskStorage::new(config.storage_root.clone())),
        StorageBackend::S3 => Arc::new(S3Storage::connect(config).await?),
    };
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::{LocalDiskStorage, ObjectStorage};

    #[tokio::test]
    async fn local_disk_lists_nested_keys_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        storage
            .put_object("contract_docs/a/one.pdf", b"1".to_vec(), None)
            .await
            .unwrap();
        storage
            .put_object("contract_docs/a/nested/two.pdf", b"2".to_vec(), None)
            .await
            .unwrap();
        storage
            .put_object("contract_docs/b/three.pdf", b"3".to_vec(), None)
            .await
            .unwrap();

        let keys = storage.list_objects("contract_docs/a/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "contract_docs/a/nested/two.pdf".to_string(),
                "contract_docs/a/one.pdf".to_string(),
            ]
        );
        assert!(storage.list_objects("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_disk_moves_and_deletes_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        storage
            .put_object("staging/batch/file.txt", b"hello".to_vec(), None)
            .await
            .unwrap();
        storage
            .move_object("staging/batch/file.txt", "docs/42/file.txt")
            .await
            .unwrap();

        assert_eq!(storage.get_object("docs/42/file.txt").await.unwrap(), b"hello");
        assert!(storage.list_objects("staging/").await.unwrap().is_empty());

        assert_eq!(storage.delete_prefix("docs/42/").await.unwrap(), 1);
        assert_eq!(storage.delete_prefix("docs/42/").await.unwrap(), 0);
        assert!(!dir.path().join("docs/42").exists());
    }

    #[tokio::test]
    async fn local_disk_rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        assert!(storage
            .put_object("../escape.txt", b"x".to_vec(), None)
            .await
            .is_err());
        assert!(storage.get_object("docs/../../etc/passwd").await.is_err());
    }
}
