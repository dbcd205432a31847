//! Persistence of the content document
//!
//! The document is always loaded and saved whole. A [`ContentStore`] reports
//! "no backup yet" as `Ok(None)`, which callers treat differently from a
//! failed read.

use crate::content_model::TableOfContents;
use crate::default_content::default_toc;
use crate::notify::{Notification, Notifier};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default backup file name
pub const DEFAULT_BACKUP_FILE: &str = "content-backup.json";

/// Errors that can occur while loading or saving the document
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid content document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Whole-document storage
pub trait ContentStore: Send + Sync {
    /// Read the document; `Ok(None)` when no backup exists yet
    fn load(&self) -> Result<Option<TableOfContents>, StoreError>;

    /// Replace the stored document
    fn save(&self, toc: &TableOfContents) -> Result<(), StoreError>;

    /// Human-readable location, for messages
    fn describe(&self) -> String;
}

/// Backup kept in a JSON file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backup file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the backup as any deserializable type
    pub fn read_document<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write any serializable value as pretty JSON
    ///
    /// The file is written next to the target and renamed over it, so a
    /// crash mid-write never leaves a truncated backup.
    pub fn write_document<T: Serialize + ?Sized>(&self, document: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, content).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        log::debug!("Wrote backup to {}", self.path.display());
        Ok(())
    }
}

impl ContentStore for FileStore {
    fn load(&self) -> Result<Option<TableOfContents>, StoreError> {
        self.read_document()
    }

    fn save(&self, toc: &TableOfContents) -> Result<(), StoreError> {
        self.write_document(toc)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Where the initial document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Restored from the store
    Restored,
    /// The store had no backup; the built-in document is used
    NoBackup,
    /// Loading failed; the built-in document is used
    Fallback(String),
}

/// Initial document plus its origin
#[derive(Debug, Clone)]
pub struct InitialLoad {
    /// The document to start editing
    pub toc: TableOfContents,
    /// Where it came from
    pub origin: LoadOrigin,
}

/// Load the document, falling back to the built-in one
///
/// Never fails. A restored backup is announced to the user; a missing one is
/// silent; any other failure is logged and also falls back.
pub fn load_or_default(store: &dyn ContentStore, notifier: &dyn Notifier) -> InitialLoad {
    match store.load() {
        Ok(Some(toc)) => {
            log::info!("Restored content from {}", store.describe());
            notifier.notify(Notification::info(
                "Content restored",
                "Your previously saved progress was loaded.",
            ));
            InitialLoad {
                toc,
                origin: LoadOrigin::Restored,
            }
        }
        Ok(None) => {
            log::info!("No backup at {}, using default content", store.describe());
            InitialLoad {
                toc: default_toc(),
                origin: LoadOrigin::NoBackup,
            }
        }
        Err(e) => {
            log::error!(
                "Could not load backup content from {}, loading default: {}",
                store.describe(),
                e
            );
            InitialLoad {
                toc: default_toc(),
                origin: LoadOrigin::Fallback(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::{Chapter, ContentBlock, Section};
    use crate::notify::RecordingNotifier;
    use tempfile::tempdir;

    fn sample_toc() -> TableOfContents {
        vec![Chapter::new(
            "1",
            "SEÑALES Y SISTEMAS",
            vec![Section::new(
                "1.1",
                "Señales",
                vec![ContentBlock::new("b1", "<p>$$x(t)$$</p>")],
            )],
        )]
    }

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("content-backup.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/content-backup.json"));

        store.save(&sample_toc()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, sample_toc());

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"chapter\": \"1\""));
    }

    #[test]
    fn test_load_then_save_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content-backup.json");
        let original = r#"[{"chapter":"1","title":"Uno","sections":[
            {"id":"1.1","title":"A","content":[{"id":"x","html":"<p>x</p>"}]},
            {"id":"1.2","title":"B","content":[],"subsections":[]}]}]"#;
        fs::write(&path, original).unwrap();

        let store = FileStore::new(&path);
        let loaded = store.load().unwrap().unwrap();
        store.save(&loaded).unwrap();

        let before: serde_json::Value = serde_json::from_str(original).unwrap();
        let after: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_or_default_restores_backup() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("content-backup.json"));
        store.save(&sample_toc()).unwrap();
        let recorder = RecordingNotifier::new();

        let initial = load_or_default(&store, &recorder);

        assert_eq!(initial.origin, LoadOrigin::Restored);
        assert_eq!(initial.toc, sample_toc());
        assert_eq!(recorder.entries().len(), 1);
        assert!(recorder.errors().is_empty());
    }

    #[test]
    fn test_load_or_default_without_backup_is_silent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("content-backup.json"));
        let recorder = RecordingNotifier::new();

        let initial = load_or_default(&store, &recorder);

        assert_eq!(initial.origin, LoadOrigin::NoBackup);
        assert_eq!(initial.toc, default_toc());
        assert!(recorder.entries().is_empty());
    }

    #[test]
    fn test_load_or_default_falls_back_on_corrupt_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content-backup.json");
        fs::write(&path, "{ truncated").unwrap();
        let recorder = RecordingNotifier::new();

        let initial = load_or_default(&FileStore::new(&path), &recorder);

        assert!(matches!(initial.origin, LoadOrigin::Fallback(_)));
        assert_eq!(initial.toc, default_toc());
        assert!(recorder.errors().is_empty());
    }
}
