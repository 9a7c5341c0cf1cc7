//! Acceptance checks run on every uploaded file before it is persisted.
//!
//! The checks run in a fixed order and stop at the first failure:
//! size, declared MIME type, extension, dangerous extension, magic bytes,
//! then the optional malware scan.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::scanner::{MalwareScanner, ScanVerdict};

/// Per-file ceiling: 5 MiB.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "pdf", "txt", "doc", "docx",
];

/// Rejected wherever they appear in the name, so `report.php.pdf` fails too.
pub const SUSPICIOUS_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "sh", "ps1", "vbs", "js", "jar", "php", "phtml",
    "asp", "aspx", "jsp", "cgi",
];

/// Leading byte signatures for the declared types that have one.
const MAGIC_BYTES: &[(&str, &[u8])] = &[
    ("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    ("image/png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    ("image/gif", b"GIF8"),
    ("application/pdf", b"%PDF"),
];

/// A file part received from a client, before acceptance.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Lowercase final extension without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.file_name)
    }
}

/// Why a file was refused. The message is shown to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("File {file_name} is too large (maximum 5 MB)")]
    TooLarge { file_name: String },

    #[error("File {file_name} has an unsupported file type")]
    UnsupportedType { file_name: String },

    #[error("File {file_name} has an unsupported extension")]
    UnsupportedExtension { file_name: String },

    #[error("File {file_name} is potentially dangerous")]
    Dangerous { file_name: String },

    #[error("File {file_name} content does not match its declared type")]
    ContentMismatch { file_name: String },

    #[error("File {file_name} failed the malware scan")]
    MalwareScanFailed { file_name: String },
}

/// Runs the acceptance pipeline. The malware scan is only performed when a
/// scanner is configured.
#[derive(Clone, Default)]
pub struct FileValidator {
    scanner: Option<Arc<dyn MalwareScanner>>,
}

impl FileValidator {
    pub fn new(scanner: Option<Arc<dyn MalwareScanner>>) -> Self {
        Self { scanner }
    }

    pub fn scans_for_malware(&self) -> bool {
        self.scanner.is_some()
    }

    pub async fn validate(&self, file: &UploadedFile) -> Result<(), UploadRejection> {
        check_static(file)?;

        let Some(scanner) = &self.scanner else {
            return Ok(());
        };

        match scanner.scan(&file.data).await {
            Ok(ScanVerdict::Clean) => Ok(()),
            Ok(ScanVerdict::Infected(signature)) => {
                warn!(file = %file.file_name, %signature, "Malware detected in upload");
                Err(UploadRejection::MalwareScanFailed {
                    file_name: file.file_name.clone(),
                })
            }
            Err(e) => {
                warn!(file = %file.file_name, error = %e, "Malware scan failed");
                Err(UploadRejection::MalwareScanFailed {
                    file_name: file.file_name.clone(),
                })
            }
        }
    }

    /// Validate a batch; the first failing file rejects the whole batch.
    pub async fn validate_all(&self, files: &[UploadedFile]) -> Result<(), UploadRejection> {
        for file in files {
            self.validate(file).await?;
        }
        if !files.is_empty() {
            info!("Accepted {} uploaded file(s)", files.len());
        }
        Ok(())
    }
}

/// Checks that need nothing but the bytes and declared metadata.
pub fn check_static(file: &UploadedFile) -> Result<(), UploadRejection> {
    let file_name = || file.file_name.clone();

    if file.data.len() > MAX_FILE_SIZE {
        return Err(UploadRejection::TooLarge { file_name: file_name() });
    }

    let mime = normalize_mime(&file.content_type);
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(UploadRejection::UnsupportedType { file_name: file_name() });
    }

    match file.extension() {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => return Err(UploadRejection::UnsupportedExtension { file_name: file_name() }),
    }

    if has_suspicious_extension(&file.file_name) {
        return Err(UploadRejection::Dangerous { file_name: file_name() });
    }

    if !magic_bytes_match(&mime, &file.data) {
        return Err(UploadRejection::ContentMismatch { file_name: file_name() });
    }

    Ok(())
}

/// `true` when `mime` has no registered signature or `data` starts with it.
pub fn magic_bytes_match(mime: &str, data: &[u8]) -> bool {
    MAGIC_BYTES
        .iter()
        .find(|(m, _)| *m == mime)
        .is_none_or(|(_, signature)| data.starts_with(signature))
}

/// Strip parameters (`; charset=utf-8`) and lowercase.
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn has_suspicious_extension(file_name: &str) -> bool {
    base_name(file_name)
        .split('.')
        .skip(1)
        .map(|segment| segment.trim().to_ascii_lowercase())
        .any(|segment| SUSPICIOUS_EXTENSIONS.contains(&segment.as_str()))
}

pub(crate) fn extension_of(file_name: &str) -> Option<String> {
    let base = base_name(file_name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Last path component, tolerating both separator styles clients send.
fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}
