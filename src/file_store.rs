//! Private per-entity document folders.
//!
//! Every disk is a namespace in the configured [`ObjectStorage`]. A record's
//! documents live under `{disk}/{id}/`, the downloadable archive is
//! materialized at `{disk}/zip/{id}/docs.zip`, and uploads wait under
//! `{disk}/staging/{stamp}-{batch}/` until the owning row is committed.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::ObjectStorage;

const STAGING_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disk {
    ContractDocs,
    ContractSubsetDocs,
}

impl Disk {
    pub const ALL: [Disk; 2] = [Disk::ContractDocs, Disk::ContractSubsetDocs];

    pub fn as_str(self) -> &'static str {
        match self {
            Disk::ContractDocs => "contract_docs",
            Disk::ContractSubsetDocs => "contract_subset_docs",
        }
    }

    pub fn entity_prefix(self, entity_id: Uuid) -> String {
        format!("{}/{}/", self.as_str(), entity_id)
    }

    pub fn archive_key(self, entity_id: Uuid) -> String {
        format!("{}/zip/{}/docs.zip", self.as_str(), entity_id)
    }

    fn archive_prefix(self, entity_id: Uuid) -> String {
        format!("{}/zip/{}/", self.as_str(), entity_id)
    }

    fn staging_prefix(self) -> String {
        format!("{}/staging/", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to write archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("no documents stored for this record")]
    NoDocuments,
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug)]
struct StagedFile {
    staged_key: String,
    file_name: String,
}

/// Uploads written to the staging area and not yet attached to a record.
#[derive(Debug)]
#[must_use = "staged uploads must be finalized or discarded"]
pub struct StagedUploads {
    disk: Disk,
    batch_prefix: String,
    files: Vec<StagedFile>,
}

impl StagedUploads {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn disk(&self) -> Disk {
        self.disk
    }
}

#[derive(Clone)]
pub struct FileStore {
    storage: Arc<dyn ObjectStorage>,
}

impl FileStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub async fn stage(
        &self,
        disk: Disk,
        uploads: Vec<UploadedFile>,
    ) -> FileStoreResult<StagedUploads> {
        let batch_prefix = format!(
            "{}{}-{}/",
            disk.staging_prefix(),
            Utc::now().format(STAGING_STAMP_FORMAT),
            Uuid::new_v4().simple()
        );
        let mut staged = StagedUploads {
            disk,
            batch_prefix,
            files: Vec::with_capacity(uploads.len()),
        };

        for upload in uploads {
            let file_name = stored_file_name(&upload.original_name);
            let staged_key = format!("{}{}", staged.batch_prefix, file_name);
            let content_type = upload.content_type.or_else(|| {
                mime_guess::from_path(&upload.original_name)
                    .first()
                    .map(|mime| mime.to_string())
            });

            if let Err(err) = self
                .storage
                .put_object(&staged_key, upload.bytes.to_vec(), content_type)
                .await
            {
                warn!(disk = disk.as_str(), key = %staged_key, error = %err, "failed to stage upload");
                self.discard(staged).await.ok();
                return Err(err.into());
            }

            staged.files.push(StagedFile {
                staged_key,
                file_name,
            });
        }

        Ok(staged)
    }

    /// Moves staged uploads into the record's folder.
    pub async fn finalize(&self, staged: StagedUploads, entity_id: Uuid) -> FileStoreResult<usize> {
        let target_prefix = staged.disk.entity_prefix(entity_id);
        let mut moved = 0;

        for file in &staged.files {
            let target = format!("{target_prefix}{}", file.file_name);
            self.storage.move_object(&file.staged_key, &target).await?;
            moved += 1;
        }

        self.storage.delete_prefix(&staged.batch_prefix).await?;
        debug!(
            disk = staged.disk.as_str(),
            entity_id = %entity_id,
            moved,
            "finalized staged uploads"
        );
        Ok(moved)
    }

    pub async fn discard(&self, staged: StagedUploads) -> FileStoreResult<usize> {
        if staged.files.is_empty() {
            return Ok(0);
        }
        Ok(self.storage.delete_prefix(&staged.batch_prefix).await?)
    }

    pub async fn list(&self, disk: Disk, entity_id: Uuid) -> FileStoreResult<Vec<String>> {
        Ok(self
            .storage
            .list_objects(&disk.entity_prefix(entity_id))
            .await?)
    }

    /// Removes the record's folder together with its cached archive.
    pub async fn delete_directory(&self, disk: Disk, entity_id: Uuid) -> FileStoreResult<usize> {
        let removed = self
            .storage
            .delete_prefix(&disk.entity_prefix(entity_id))
            .await?;
        self.storage
            .delete_prefix(&disk.archive_prefix(entity_id))
            .await?;
        Ok(removed)
    }

    /// Zips the record's folder, stores the archive at
    /// [`Disk::archive_key`] and returns its bytes. Rebuilt on every call.
    pub async fn build_archive(&self, disk: Disk, entity_id: Uuid) -> FileStoreResult<Vec<u8>> {
        let prefix = disk.entity_prefix(entity_id);
        let keys = self.storage.list_objects(&prefix).await?;
        if keys.is_empty() {
            return Err(FileStoreError::NoDocuments);
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self.storage.get_object(&key).await?;
            let name = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
            entries.push((name, bytes));
        }

        let archive = tokio::task::spawn_blocking(move || write_zip(entries)).await??;

        self.storage
            .put_object(
                &disk.archive_key(entity_id),
                archive.clone(),
                Some(ARCHIVE_CONTENT_TYPE.to_string()),
            )
            .await?;

        Ok(archive)
    }

    /// Deletes staging batches created before `cutoff`. Returns the number of
    /// files removed.
    pub async fn sweep_staging(&self, disk: Disk, cutoff: NaiveDateTime) -> FileStoreResult<usize> {
        let staging_prefix = disk.staging_prefix();
        let keys = self.storage.list_objects(&staging_prefix).await?;

        let mut batches: BTreeMap<String, usize> = BTreeMap::new();
        for key in &keys {
            let Some(rest) = key.strip_prefix(&staging_prefix) else {
                continue;
            };
            if let Some((batch, _)) = rest.split_once('/') {
                *batches.entry(batch.to_string()).or_default() += 1;
            }
        }

        let mut removed = 0;
        for (batch, count) in batches {
            let Some(staged_at) = staging_batch_time(&batch) else {
                warn!(disk = disk.as_str(), batch = %batch, "unrecognized staging batch");
                continue;
            };
            if staged_at >= cutoff {
                continue;
            }
            self.storage
                .delete_prefix(&format!("{staging_prefix}{batch}/"))
                .await?;
            removed += count;
        }

        if removed > 0 {
            info!(disk = disk.as_str(), removed, "swept orphaned staged uploads");
        }
        Ok(removed)
    }
}

fn staging_batch_time(batch: &str) -> Option<NaiveDateTime> {
    let (stamp, _) = batch.split_once('-')?;
    NaiveDateTime::parse_from_str(stamp, STAGING_STAMP_FORMAT).ok()
}

fn stored_file_name(original_name: &str) -> String {
    format!(
        "{}-{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(original_name)
    )
}

fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let sanitized: String = base
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "document".to_string()
    } else {
        sanitized.to_string()
    }
}

fn write_zip(entries: Vec<(String, Vec<u8>)>) -> FileStoreResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}
