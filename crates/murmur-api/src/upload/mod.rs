//! File acceptance and persistence for complaint attachments.

pub mod scanner;
pub mod store;
pub mod validator;

use std::collections::HashMap;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use tracing::warn;
use uuid::Uuid;

use murmur_db::Database;
use murmur_db::models::{AttachmentRow, NewAttachment};

use crate::error::{AppError, AppResult};
use crate::state::AppStateInner;

pub use scanner::{ClamdScanner, MalwareScanner, ScanVerdict};
pub use store::{FileStore, StoredFile, sanitize_filename};
pub use validator::{FileValidator, UploadRejection, UploadedFile};

/// A decoded multipart body: text fields by name plus every non-empty file part.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Drain a multipart body. Zero-byte file parts are skipped; more than
/// `max_files` non-empty file parts is a validation error.
pub async fn read_multipart(mut multipart: Multipart, max_files: usize) -> AppResult<MultipartForm> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
            continue;
        };

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            continue;
        }
        if form.files.len() >= max_files {
            return Err(AppError::validation(format!(
                "Too many files (maximum {max_files})"
            )));
        }
        form.files.push(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    Ok(form)
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation("Request body is too large")
    } else {
        AppError::validation(format!("Invalid form data: {}", e.body_text()))
    }
}

/// A validated file that has been written to the store but not yet recorded.
#[derive(Debug)]
pub struct PendingAttachment {
    pub id: String,
    /// Display name, sanitized before it is persisted.
    pub file_name: String,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    pub sha256: String,
}

impl PendingAttachment {
    pub fn as_new<'a>(&'a self, complaint_id: &'a str) -> NewAttachment<'a> {
        NewAttachment {
            id: &self.id,
            complaint_id,
            file_name: &self.file_name,
            storage_key: &self.storage_key,
            file_size: self.size as i64,
            mime_type: &self.mime_type,
            sha256: &self.sha256,
        }
    }
}

pub fn new_attachments<'a>(complaint_id: &'a str, pending: &'a [PendingAttachment]) -> Vec<NewAttachment<'a>> {
    pending.iter().map(|p| p.as_new(complaint_id)).collect()
}

/// Write already validated files to the store. If any write fails, the
/// files written so far are removed and nothing is left behind.
pub async fn write_files(
    store: &FileStore,
    owner_id: &str,
    files: Vec<UploadedFile>,
) -> AppResult<Vec<PendingAttachment>> {
    let mut pending = Vec::with_capacity(files.len());
    for file in files {
        match store.save(owner_id, &file.file_name, &file.data).await {
            Ok(stored) => pending.push(PendingAttachment {
                id: Uuid::new_v4().to_string(),
                file_name: sanitize_filename(&file.file_name),
                storage_key: stored.storage_key,
                size: stored.size,
                mime_type: validator::normalize_mime(&file.content_type),
                sha256: stored.sha256,
            }),
            Err(e) => {
                discard(store, &pending).await;
                return Err(AppError::UploadFailed(e));
            }
        }
    }
    Ok(pending)
}

/// Record rows for written files with `record`. When recording fails the
/// files are removed, so a failed request leaves neither rows nor files.
pub async fn record_attachments<F, T>(
    state: &AppStateInner,
    pending: Vec<PendingAttachment>,
    record: F,
) -> AppResult<T>
where
    F: FnOnce(&Database, &[PendingAttachment]) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (result, pending) = {
        let db = state.db.clone();
        tokio::task::spawn_blocking(move || {
            let result = record(&db, pending.as_slice());
            (result, pending)
        })
        .await
        .map_err(anyhow::Error::from)?
    };

    if result.is_err() {
        discard(&state.store, &pending).await;
    }
    Ok(result?)
}

async fn discard(store: &FileStore, pending: &[PendingAttachment]) {
    for file in pending {
        if let Err(e) = store.delete(&file.storage_key).await {
            warn!(storage_key = %file.storage_key, error = %e, "Failed to remove unrecorded upload");
        }
    }
}

/// Persist already validated files for an existing complaint.
pub async fn store_attachments(
    state: &AppStateInner,
    complaint_id: &str,
    files: Vec<UploadedFile>,
) -> AppResult<Vec<AttachmentRow>> {
    let pending = write_files(&state.store, complaint_id, files).await?;
    let complaint_id = complaint_id.to_string();
    record_attachments(state, pending, move |db, pending| {
        db.insert_attachments(&new_attachments(&complaint_id, pending))
    })
    .await
}
