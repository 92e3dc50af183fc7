//! Repairs file-store drift left behind when a request failed between the
//! database commit and the storage step.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::PgPool,
    error::{AppError, AppResult},
    file_store::{Disk, FileStore},
    schema::{contract_headers, contract_subsets},
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub staged_files_removed: usize,
    pub flags_set: usize,
    pub flags_cleared: usize,
    pub orphan_folders_removed: usize,
}

type LiveRow = (Uuid, bool, NaiveDateTime);

/// `(id, files flag, updated_at)` for live rows and ids of soft-deleted rows
/// on `disk`.
fn load_rows(conn: &mut PgConnection, disk: Disk) -> AppResult<(Vec<LiveRow>, Vec<Uuid>)> {
    let rows = match disk {
        Disk::ContractDocs => {
            let live: Vec<LiveRow> = contract_headers::table
                .filter(contract_headers::deleted_at.is_null())
                .select((
                    contract_headers::id,
                    contract_headers::files,
                    contract_headers::updated_at,
                ))
                .load(conn)?;
            let deleted: Vec<Uuid> = contract_headers::table
                .filter(contract_headers::deleted_at.is_not_null())
                .select(contract_headers::id)
                .load(conn)?;
            (live, deleted)
        }
        Disk::ContractSubsetDocs => {
            let live: Vec<LiveRow> = contract_subsets::table
                .filter(contract_subsets::deleted_at.is_null())
                .select((
                    contract_subsets::id,
                    contract_subsets::files,
                    contract_subsets::updated_at,
                ))
                .load(conn)?;
            let deleted: Vec<Uuid> = contract_subsets::table
                .filter(contract_subsets::deleted_at.is_not_null())
                .select(contract_subsets::id)
                .load(conn)?;
            (live, deleted)
        }
    };
    Ok(rows)
}

fn set_files_flag(conn: &mut PgConnection, disk: Disk, id: Uuid, files: bool) -> AppResult<()> {
    match disk {
        Disk::ContractDocs => diesel::update(contract_headers::table.find(id))
            .set(contract_headers::files.eq(files))
            .execute(conn)?,
        Disk::ContractSubsetDocs => diesel::update(contract_subsets::table.find(id))
            .set(contract_subsets::files.eq(files))
            .execute(conn)?,
    };
    Ok(())
}

/// Sweeps staging batches older than `staged_before`, aligns the `files` flag
/// of live records with their folders and removes folders still held by
/// soft-deleted records.
///
/// Records written at or after `staged_before` are left alone: their uploads
/// may still be moving out of staging.
pub async fn reconcile(
    pool: &PgPool,
    files: &FileStore,
    staged_before: NaiveDateTime,
) -> AppResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for disk in Disk::ALL {
        report.staged_files_removed += files.sweep_staging(disk, staged_before).await?;

        let (live, deleted) = {
            let mut conn = pool
                .get()
                .map_err(|err| AppError::internal(format!("database pool error: {err}")))?;
            load_rows(&mut conn, disk)?
        };

        for (id, flagged, updated_at) in live {
            if updated_at >= staged_before {
                continue;
            }
            let has_documents = !files.list(disk, id).await?.is_empty();
            if has_documents == flagged {
                continue;
            }

            let mut conn = pool
                .get()
                .map_err(|err| AppError::internal(format!("database pool error: {err}")))?;
            set_files_flag(&mut conn, disk, id, has_documents)?;
            if has_documents {
                report.flags_set += 1;
            } else {
                report.flags_cleared += 1;
            }
            warn!(disk = disk.as_str(), id = %id, files = has_documents, "corrected files flag");
        }

        for id in deleted {
            if files.list(disk, id).await?.is_empty() {
                continue;
            }
            files.delete_directory(disk, id).await?;
            report.orphan_folders_removed += 1;
            warn!(disk = disk.as_str(), id = %id, "removed folder of deleted record");
        }
    }

    info!(
        staged_files_removed = report.staged_files_removed,
        flags_set = report.flags_set,
        flags_cleared = report.flags_cleared,
        orphan_folders_removed = report.orphan_folders_removed,
        "file reconciliation finished"
    );
    Ok(report)
}
