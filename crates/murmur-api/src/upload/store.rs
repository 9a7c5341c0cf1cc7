use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::validator::extension_of;

/// Result of persisting one file.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// File name relative to the store directory.
    pub storage_key: String,
    pub sha256: String,
    pub size: u64,
}

/// Flat on-disk store for attachments.
///
/// Files live at `{dir}/{owner}-{millis}-{token}{.ext}`. The client's file
/// name only ever contributes its extension.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` under a fresh name. The bytes go to a `.part` file that
    /// is renamed into place once flushed, so a returned key always refers
    /// to a complete file.
    pub async fn save(&self, owner_id: &str, original_name: &str, data: &[u8]) -> Result<StoredFile> {
        fs::create_dir_all(&self.dir).await?;

        let storage_key = storage_name(owner_id, original_name);
        let path = self.dir.join(&storage_key);
        let partial = self.dir.join(format!("{storage_key}.part"));

        let mut file = fs::File::create(&partial).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, &path).await?;

        let sha256 = hex::encode(Sha256::digest(data));
        info!("Stored {} ({} bytes) as {}", original_name, data.len(), storage_key);

        Ok(StoredFile {
            storage_key,
            sha256,
            size: data.len() as u64,
        })
    }

    /// Absolute path for a stored key. Keys that would escape the store
    /// directory are refused.
    pub fn path_for(&self, storage_key: &str) -> Result<PathBuf> {
        let key = Path::new(storage_key);
        let mut components = key.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(key)),
            _ => bail!("invalid storage key: {}", storage_key),
        }
    }

    pub async fn open(&self, storage_key: &str) -> Result<fs::File> {
        Ok(fs::File::open(self.path_for(storage_key)?).await?)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, storage_key: &str) -> Result<()> {
        let path = self.path_for(storage_key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted stored file {}", storage_key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} already gone", storage_key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn storage_name(owner_id: &str, original_name: &str) -> String {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let millis = chrono::Utc::now().timestamp_millis();
    let ext = extension_of(original_name)
        .map(|e| format!(".{}", sanitize_filename(&e)))
        .unwrap_or_default();
    format!("{}-{}-{}{}", sanitize_filename(owner_id), millis, token, ext)
}

/// Reduce a client-supplied name to `[a-z0-9._-]`, collapsing runs of
/// replaced characters into one `_`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(['.', '_']);
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_characters_only() {
        assert_eq!(sanitize_filename("My Report (final).PDF"), "my_report_final_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("ระบบล่ม.png"), "png");
        assert_eq!(sanitize_filename("???"), "file");
    }

    #[tokio::test]
    async fn save_creates_missing_directory_and_names_by_owner() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("nested").join("uploads"));

        let stored = store.save("c1", "ระบบล่ม.PNG", b"abc").await.unwrap();
        assert!(stored.storage_key.starts_with("c1-"));
        assert!(stored.storage_key.ends_with(".png"));
        assert_eq!(stored.size, 3);
        assert_eq!(
            stored.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let on_disk = std::fs::read(store.path_for(&stored.storage_key).unwrap()).unwrap();
        assert_eq!(on_disk, b"abc");
        // no leftover partial file
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn same_name_twice_gets_distinct_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        let a = store.save("c1", "a.txt", b"1").await.unwrap();
        let b = store.save("c1", "a.txt", b"2").await.unwrap();
        assert_ne!(a.storage_key, b.storage_key);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        let stored = store.save("c1", "a.txt", b"1").await.unwrap();
        store.delete(&stored.storage_key).await.unwrap();
        store.delete(&stored.storage_key).await.unwrap();
    }

    #[test]
    fn traversal_keys_are_refused() {
        let store = FileStore::new("/srv/uploads");
        assert!(store.path_for("../secret").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("a/b").is_err());
        assert!(store.path_for("").is_err());
        assert_eq!(store.path_for("c1-1-x.png").unwrap(), PathBuf::from("/srv/uploads/c1-1-x.png"));
    }
}
