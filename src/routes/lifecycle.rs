//! Shared create/update/delete/toggle/download flow for managed records.
//!
//! Each record type plugs its own validation and queries into
//! [`ManagedResource`]; the handlers here own authorization, the
//! transaction, the staged-upload dance and the flash payload.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use diesel::{Connection, PgConnection};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{Action, AuthenticatedUser, RequestContext, Resource},
    error::{AppError, AppResult},
    file_store::{Disk, StagedUploads, UploadedFile},
    state::AppState,
};

const UPLOAD_FIELDS: [&str; 2] = ["upload_files", "upload_files[]"];
const ARCHIVE_NAME_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Warning,
}

/// Outcome message answered by every mutation.
#[derive(Debug, Serialize)]
pub struct Flash {
    pub result: FlashLevel,
    pub message: &'static str,
}

impl Flash {
    pub fn success(message: &'static str) -> Self {
        Self {
            result: FlashLevel::Success,
            message,
        }
    }

    pub fn warning(message: &'static str) -> Self {
        Self {
            result: FlashLevel::Warning,
            message,
        }
    }
}

/// Text parts of a submitted form. Blank values count as absent.
#[derive(Debug, Default)]
pub struct FormFields {
    values: HashMap<String, String>,
}

impl FormFields {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, name: &str) -> AppResult<String> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request(format!("the {name} field is required")))
    }

    pub fn optional_uuid(&self, name: &str) -> AppResult<Option<Uuid>> {
        self.text(name)
            .map(|value| {
                Uuid::parse_str(value)
                    .map_err(|_| AppError::bad_request(format!("the {name} field must be a valid UUID")))
            })
            .transpose()
    }

    pub fn required_uuid(&self, name: &str) -> AppResult<Uuid> {
        self.optional_uuid(name)?
            .ok_or_else(|| AppError::bad_request(format!("the {name} field is required")))
    }
}

#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: FormFields,
    pub uploads: Vec<UploadedFile>,
}

pub async fn read_form(mut multipart: Multipart) -> AppResult<SubmittedForm> {
    let mut form = SubmittedForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if UPLOAD_FIELDS.contains(&name.as_str()) {
            let original_name = field.file_name().map(str::to_string).unwrap_or_default();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|err| {
                error!(error = %err, "failed to read upload bytes");
                AppError::bad_request(format!("failed to read uploaded file: {err}"))
            })?;
            // Browsers submit an empty part for an untouched file input.
            if bytes.is_empty() {
                continue;
            }
            form.uploads.push(UploadedFile {
                original_name,
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await.map_err(|err| {
                AppError::bad_request(format!("invalid value for {name}: {err}"))
            })?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// A record type driven through the shared lifecycle handlers.
pub trait ManagedResource: Send + Sync + 'static {
    const RESOURCE: Resource;
    const DISK: Disk;
    /// Singular noun used in log lines.
    const LABEL: &'static str;

    type Input: Send + 'static;

    /// Field-level validation of the submitted form.
    fn parse(fields: &FormFields) -> AppResult<Self::Input>;

    /// Checks against stored rows, run inside the write transaction.
    /// `current` is the record being updated, if any.
    fn check(conn: &mut PgConnection, input: &Self::Input, current: Option<Uuid>) -> AppResult<()>;

    fn insert(
        conn: &mut PgConnection,
        id: Uuid,
        input: &Self::Input,
        owner: Uuid,
        files: bool,
    ) -> AppResult<()>;

    /// Writes `input`, re-attributes the record to `owner` and sets `files`
    /// when new uploads arrived. An existing `files = true` is never cleared.
    fn update(
        conn: &mut PgConnection,
        id: Uuid,
        input: &Self::Input,
        owner: Uuid,
        new_files: bool,
    ) -> AppResult<()>;

    fn ensure_exists(conn: &mut PgConnection, id: Uuid) -> AppResult<()>;

    fn has_dependents(conn: &mut PgConnection, id: Uuid) -> AppResult<bool>;

    fn soft_delete(conn: &mut PgConnection, id: Uuid) -> AppResult<()>;

    /// Flips `inactive` and returns the new value.
    fn toggle_status(conn: &mut PgConnection, id: Uuid) -> AppResult<bool>;
}

pub(crate) fn in_transaction<T, F>(state: &AppState, work: F) -> AppResult<T>
where
    F: FnOnce(&mut PgConnection) -> AppResult<T>,
{
    let mut conn = state.db()?;
    PgConnection::transaction::<T, AppError, _>(&mut conn, work)
}

/// Moves staged uploads into place once the row is committed, or drops them
/// when the write failed.
async fn settle_uploads(
    state: &AppState,
    staged: StagedUploads,
    entity_id: Uuid,
    written: AppResult<()>,
) -> AppResult<usize> {
    let disk = staged.disk();
    if let Err(err) = written {
        if let Err(discard_err) = state.files.discard(staged).await {
            warn!(
                disk = disk.as_str(),
                error = %discard_err,
                "failed to discard staged uploads"
            );
        }
        return Err(err);
    }

    if staged.is_empty() {
        state.files.discard(staged).await?;
        return Ok(0);
    }

    state.files.finalize(staged, entity_id).await.map_err(|err| {
        error!(
            disk = disk.as_str(),
            entity_id = %entity_id,
            error = %err,
            "failed to finalize uploads after commit"
        );
        AppError::from(err)
    })
}

pub async fn store<R: ManagedResource>(
    State(state): State<AppState>,
    context: RequestContext,
    multipart: Multipart,
) -> AppResult<Json<Flash>> {
    context.authorize(Action::Create, R::RESOURCE)?;

    let form = read_form(multipart).await?;
    let input = R::parse(&form.fields)?;
    let id = Uuid::new_v4();

    let staged = state.files.stage(R::DISK, form.uploads).await?;
    let has_files = !staged.is_empty();
    let written = in_transaction(&state, |conn| {
        R::check(conn, &input, None)?;
        R::insert(conn, id, &input, context.user_id, has_files)
    });
    let attached = settle_uploads(&state, staged, id, written).await?;

    info!(
        resource = R::LABEL,
        id = %id,
        user_id = %context.user_id,
        attached,
        "record created"
    );
    Ok(Json(Flash::success("saved")))
}

pub async fn update<R: ManagedResource>(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Flash>> {
    context.authorize(Action::Edit, R::RESOURCE)?;

    {
        let mut conn = state.db()?;
        R::ensure_exists(&mut conn, id)?;
    }

    let form = read_form(multipart).await?;
    let input = R::parse(&form.fields)?;

    let staged = state.files.stage(R::DISK, form.uploads).await?;
    let has_files = !staged.is_empty();
    let written = in_transaction(&state, |conn| {
        R::ensure_exists(conn, id)?;
        R::check(conn, &input, Some(id))?;
        R::update(conn, id, &input, context.user_id, has_files)
    });
    let attached = settle_uploads(&state, staged, id, written).await?;

    info!(
        resource = R::LABEL,
        id = %id,
        user_id = %context.user_id,
        attached,
        "record updated"
    );
    Ok(Json(Flash::success("updated")))
}

enum Removal {
    Blocked,
    Removed,
}

pub async fn destroy<R: ManagedResource>(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Flash>> {
    context.authorize(Action::Delete, R::RESOURCE)?;

    let removal = in_transaction(&state, |conn| {
        R::ensure_exists(conn, id)?;
        if R::has_dependents(conn, id)? {
            return Ok(Removal::Blocked);
        }
        R::soft_delete(conn, id)?;
        Ok(Removal::Removed)
    })?;

    match removal {
        Removal::Blocked => {
            info!(resource = R::LABEL, id = %id, "delete blocked by dependent records");
            Ok(Json(Flash::warning("relation_exists")))
        }
        Removal::Removed => {
            let removed = state
                .files
                .delete_directory(R::DISK, id)
                .await
                .map_err(|err| {
                    error!(
                        disk = R::DISK.as_str(),
                        id = %id,
                        error = %err,
                        "record deleted but its folder could not be removed"
                    );
                    AppError::from(err)
                })?;
            info!(
                resource = R::LABEL,
                id = %id,
                user_id = %context.user_id,
                removed_files = removed,
                "record deleted"
            );
            Ok(Json(Flash::success("deleted")))
        }
    }
}

pub async fn toggle_status<R: ManagedResource>(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Flash>> {
    context.authorize(Action::Activation, R::RESOURCE)?;

    let inactive = in_transaction(&state, |conn| R::toggle_status(conn, id))?;
    info!(resource = R::LABEL, id = %id, inactive, "status toggled");

    Ok(Json(Flash::success(if inactive {
        "deactivated"
    } else {
        "activated"
    })))
}

/// Streams every document of the record as one zip. Any signed-in user may
/// download.
pub async fn download_docs<R: ManagedResource>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let archive = state.files.build_archive(R::DISK, id).await?;
    let file_name = archive_file_name(Utc::now());

    let disposition = HeaderValue::from_str(&inline_content_disposition(&file_name))
        .map_err(|err| AppError::internal(format!("invalid content disposition: {err}")))?;

    info!(
        resource = R::LABEL,
        id = %id,
        user_id = %user.user_id,
        bytes = archive.len(),
        "documents archive downloaded"
    );

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}

fn archive_file_name(now: chrono::DateTime<Utc>) -> String {
    format!("contract_docs_{}.zip", now.format(ARCHIVE_NAME_FORMAT))
}

fn inline_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!("inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}
