//! JSON document stores backing the engine's durable state.
//!
//! Each store owns one file under the data directory. A missing file
//! loads as the document's default value; saves write the whole
//! document through a temp file and rename so a crash never leaves a
//! half-written store behind.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::models::{HistoryDoc, RateLimitState, ResumeCatalogDoc, UserSettings};

pub const HISTORY_FILE: &str = "history.json";
pub const RATE_LIMIT_FILE: &str = "rate_limits.json";
pub const RESUME_CATALOG_FILE: &str = "resumes.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const RESUMES_DIR: &str = "resumes";
pub const COOKIES_DIR: &str = "cookies";

/// Root of the on-disk state: the JSON documents plus the managed
/// resume and cookie directories.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Opens the platform data directory, e.g.
    /// `~/.local/share/easyapply` on Linux. Creates it if needed.
    pub fn default_location() -> Result<Self, StoreError> {
        let dirs = directories::ProjectDirs::from("", "", "easyapply")
            .ok_or(StoreError::NoDataDir)?;
        Self::at(dirs.data_dir())
    }

    /// Opens an explicit directory instead of the platform default.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resumes_dir(&self) -> PathBuf {
        self.root.join(RESUMES_DIR)
    }

    pub fn cookies_dir(&self) -> PathBuf {
        self.root.join(COOKIES_DIR)
    }

    pub fn history(&self) -> JsonStore<HistoryDoc> {
        JsonStore::new(self.root.join(HISTORY_FILE))
    }

    pub fn rate_limits(&self) -> JsonStore<RateLimitState> {
        JsonStore::new(self.root.join(RATE_LIMIT_FILE))
    }

    pub fn resume_catalog(&self) -> JsonStore<ResumeCatalogDoc> {
        JsonStore::new(self.root.join(RESUME_CATALOG_FILE))
    }

    pub fn settings(&self) -> JsonStore<UserSettings> {
        JsonStore::new(self.root.join(SETTINGS_FILE))
    }
}

/// One whole-document JSON store.
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    _doc: PhantomData<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, or its default if the file does not exist
    /// yet. A file that exists but does not parse is an error, not a
    /// default; silently resetting it would drop user data.
    pub fn load(&self) -> Result<T, StoreError> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the document on disk. Writes to a sibling temp file and
    /// renames it over the target so readers never observe a torn doc.
    pub fn save(&self, doc: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Temp-file-then-rename write, shared by the stores and the cookie
/// cache.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp = path.with_extension("tmp");
    fs::write(&temp, bytes).map_err(|source| StoreError::Write {
        path: temp.clone(),
        source,
    })?;
    fs::rename(&temp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserHistory;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        assert_eq!(data.root(), dir.path());
        let history = data.history().load().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();

        let mut doc = HistoryDoc::new();
        let mut user = UserHistory::default();
        user.applied_job_ids.insert("job-1".to_string());
        doc.insert("alice@example.com".to_string(), user);

        let store = data.history();
        store.save(&doc).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded["alice@example.com"].applied_job_ids.contains("job-1"));
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        data.rate_limits().save(&RateLimitState::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_default() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        fs::write(dir.path().join(HISTORY_FILE), "{not json").unwrap();

        let err = data.history().load().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
