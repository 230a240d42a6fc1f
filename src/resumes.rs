//! Resume catalog: managed copies of resume files plus the JSON index
//! that describes them.
//!
//! Adding a resume copies it into the data directory, so submissions
//! keep working after the original file moves or disappears. The
//! catalog document and the files on disk must agree; operations that
//! would leave them disagreeing fail loudly instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ResumeCatalogDoc, ResumeEntry};
use crate::rate_limit::RateLimiter;
use crate::store::{DataDir, JsonStore};

/// Result of trying to add a resume while the upload budget applies.
#[derive(Debug)]
pub enum UploadOutcome {
    Added(ResumeEntry),
    /// The one-per-minute upload budget is in force. Nothing was
    /// copied or cataloged.
    CooldownActive { retry_in: Duration },
}

pub struct ResumeCatalog {
    store: JsonStore<ResumeCatalogDoc>,
    files_dir: PathBuf,
}

impl ResumeCatalog {
    pub fn open(data: &DataDir) -> Result<Self, StoreError> {
        let files_dir = data.resumes_dir();
        fs::create_dir_all(&files_dir).map_err(|source| StoreError::Write {
            path: files_dir.clone(),
            source,
        })?;
        Ok(Self {
            store: data.resume_catalog(),
            files_dir,
        })
    }

    /// All entries in stored-name order.
    pub fn entries(&self) -> Result<Vec<ResumeEntry>, StoreError> {
        Ok(self.store.load()?.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<ResumeEntry>, StoreError> {
        Ok(self.store.load()?.get(name).cloned())
    }

    /// Absolute path of a cataloged resume, verified to exist on disk.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let doc = self.store.load()?;
        if !doc.contains_key(name) {
            return Err(StoreError::UnknownResume(name.to_string()));
        }
        let path = self.files_dir.join(name);
        if !path.is_file() {
            return Err(StoreError::CatalogInconsistent(format!(
                "catalog lists '{name}' but {} is missing",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Copies `source` into the managed directory and catalogs it,
    /// subject to the upload budget. A name clash with an existing
    /// entry or file gets a numeric suffix instead of overwriting.
    pub fn add(
        &self,
        source: &Path,
        notes: Option<String>,
        limiter: &mut RateLimiter,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome, StoreError> {
        if let Some(retry_in) = limiter.upload_retry_in(now) {
            return Ok(UploadOutcome::CooldownActive { retry_in });
        }

        let metadata = fs::metadata(source).map_err(|source_err| StoreError::Read {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume".to_string());

        let mut doc = self.store.load()?;
        let stored_name = self.available_name(&doc, &original_name);
        let dest = self.files_dir.join(&stored_name);

        fs::copy(source, &dest).map_err(|source_err| StoreError::Write {
            path: dest.clone(),
            source: source_err,
        })?;

        let entry = ResumeEntry {
            stored_name: stored_name.clone(),
            original_name,
            uploaded_at: now,
            size_bytes: metadata.len(),
            notes,
            last_used: None,
        };
        doc.insert(stored_name, entry.clone());
        self.store.save(&doc)?;

        limiter.record_upload(now);
        Ok(UploadOutcome::Added(entry))
    }

    /// Renames a stored resume, file and entry together. A collision
    /// with an existing name fails and leaves both resumes untouched.
    pub fn rename(&self, old: &str, new: &str) -> Result<ResumeEntry, StoreError> {
        validate_name(new)?;

        let mut doc = self.store.load()?;
        if !doc.contains_key(old) {
            return Err(StoreError::UnknownResume(old.to_string()));
        }
        let new_path = self.files_dir.join(new);
        if doc.contains_key(new) || new_path.exists() {
            return Err(StoreError::DuplicateResume(new.to_string()));
        }

        let old_path = self.files_dir.join(old);
        fs::rename(&old_path, &new_path).map_err(|source| StoreError::Write {
            path: new_path.clone(),
            source,
        })?;

        // The file has moved; the catalog must follow or the two views
        // of the store disagree.
        let mut entry = match doc.remove(old) {
            Some(entry) => entry,
            None => {
                return Err(StoreError::CatalogInconsistent(format!(
                    "entry for '{old}' vanished mid-rename"
                )));
            }
        };
        entry.stored_name = new.to_string();
        doc.insert(new.to_string(), entry.clone());
        if let Err(err) = self.store.save(&doc) {
            return Err(StoreError::CatalogInconsistent(format!(
                "file renamed to '{new}' but the catalog update failed: {err}"
            )));
        }
        Ok(entry)
    }

    pub fn set_notes(&self, name: &str, notes: Option<String>) -> Result<(), StoreError> {
        let mut doc = self.store.load()?;
        match doc.get_mut(name) {
            Some(entry) => entry.notes = notes,
            None => return Err(StoreError::UnknownResume(name.to_string())),
        }
        self.store.save(&doc)
    }

    /// Stamps an entry as used at `now`.
    pub fn touch_last_used(&self, name: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut doc = self.store.load()?;
        match doc.get_mut(name) {
            Some(entry) => entry.last_used = Some(now),
            None => return Err(StoreError::UnknownResume(name.to_string())),
        }
        self.store.save(&doc)
    }

    /// Deletes a resume, file first and entry second. A file already
    /// missing from disk is tolerated so a broken catalog can still be
    /// cleaned up.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.store.load()?;
        if !doc.contains_key(name) {
            return Err(StoreError::UnknownResume(name.to_string()));
        }

        let path = self.files_dir.join(name);
        if let Err(source) = fs::remove_file(&path) {
            if source.kind() != std::io::ErrorKind::NotFound {
                return Err(StoreError::Write { path, source });
            }
        }

        doc.remove(name);
        self.store.save(&doc)
    }

    /// First free name for an incoming file: the original name, or
    /// `stem_1.ext`, `stem_2.ext` and so on when taken.
    fn available_name(&self, doc: &ResumeCatalogDoc, original: &str) -> String {
        let taken = |name: &str| doc.contains_key(name) || self.files_dir.join(name).exists();

        if !taken(original) {
            return original.to_string();
        }

        let path = Path::new(original);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| original.to_string());
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut n = 1u32;
        loop {
            let candidate = format!("{stem}_{n}{ext}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RateLimitState;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DataDir, ResumeCatalog) {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        let catalog = ResumeCatalog::open(&data).unwrap();
        (dir, data, catalog)
    }

    // Adds with a fresh limiter each time so the upload cooldown never
    // interferes with tests that are not about the cooldown.
    fn add_file(catalog: &ResumeCatalog, dir: &Path, name: &str) -> ResumeEntry {
        let source = dir.join(name);
        if !source.exists() {
            fs::write(&source, b"resume body").unwrap();
        }
        let mut limiter = RateLimiter::new(RateLimitState::default(), 15, 1);
        match catalog.add(&source, None, &mut limiter, Utc::now()).unwrap() {
            UploadOutcome::Added(entry) => entry,
            UploadOutcome::CooldownActive { .. } => panic!("upload unexpectedly blocked"),
        }
    }

    #[test]
    fn add_copies_file_and_catalogs_it() {
        let (dir, data, catalog) = setup();
        let source_dir = dir.path().join("incoming");
        fs::create_dir_all(&source_dir).unwrap();

        let entry = add_file(&catalog, &source_dir, "cv.pdf");
        assert_eq!(entry.stored_name, "cv.pdf");
        assert_eq!(entry.original_name, "cv.pdf");
        assert!(data.resumes_dir().join("cv.pdf").is_file());

        let resolved = catalog.resolve("cv.pdf").unwrap();
        assert_eq!(resolved, data.resumes_dir().join("cv.pdf"));
    }

    #[test]
    fn name_collisions_get_numeric_suffixes() {
        let (dir, _data, catalog) = setup();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let first = add_file(&catalog, &a, "cv.pdf");
        let second = add_file(&catalog, &b, "cv.pdf");
        assert_eq!(first.stored_name, "cv.pdf");
        assert_eq!(second.stored_name, "cv_1.pdf");
        assert_eq!(second.original_name, "cv.pdf");
    }

    #[test]
    fn upload_cooldown_blocks_a_second_add() {
        let (dir, _data, catalog) = setup();
        let mut limiter = RateLimiter::new(RateLimitState::default(), 15, 1);
        let source = dir.path().join("cv.pdf");
        fs::write(&source, b"x").unwrap();

        let now = Utc::now();
        let first = catalog.add(&source, None, &mut limiter, now).unwrap();
        assert!(matches!(first, UploadOutcome::Added(_)));

        let second = catalog
            .add(&source, None, &mut limiter, now + chrono::Duration::seconds(10))
            .unwrap();
        match second {
            UploadOutcome::CooldownActive { retry_in } => {
                assert_eq!(retry_in, Duration::from_secs(50));
            }
            UploadOutcome::Added(_) => panic!("second upload should be blocked"),
        }
    }

    #[test]
    fn rename_moves_file_and_entry_together() {
        let (dir, data, catalog) = setup();
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        add_file(&catalog, &incoming, "old.pdf");

        let entry = catalog.rename("old.pdf", "new.pdf").unwrap();
        assert_eq!(entry.stored_name, "new.pdf");
        assert!(!data.resumes_dir().join("old.pdf").exists());
        assert!(data.resumes_dir().join("new.pdf").is_file());
        assert!(catalog.get("old.pdf").unwrap().is_none());
        assert!(catalog.get("new.pdf").unwrap().is_some());
    }

    #[test]
    fn rename_collision_leaves_both_resumes_untouched() {
        let (dir, data, catalog) = setup();
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();

        fs::write(incoming.join("a.pdf"), b"contents of a").unwrap();
        fs::write(incoming.join("b.pdf"), b"contents of b").unwrap();
        add_file(&catalog, &incoming, "a.pdf");
        add_file(&catalog, &incoming, "b.pdf");

        let err = catalog.rename("a.pdf", "b.pdf").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateResume(_)));

        // Files and entries both survive unchanged.
        assert_eq!(fs::read(data.resumes_dir().join("a.pdf")).unwrap(), b"contents of a");
        assert_eq!(fs::read(data.resumes_dir().join("b.pdf")).unwrap(), b"contents of b");
        assert!(catalog.get("a.pdf").unwrap().is_some());
        assert!(catalog.get("b.pdf").unwrap().is_some());
    }

    #[test]
    fn remove_deletes_file_and_entry() {
        let (dir, data, catalog) = setup();
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        add_file(&catalog, &incoming, "cv.pdf");

        catalog.remove("cv.pdf").unwrap();
        assert!(!data.resumes_dir().join("cv.pdf").exists());
        assert!(catalog.get("cv.pdf").unwrap().is_none());
        assert!(matches!(
            catalog.remove("cv.pdf"),
            Err(StoreError::UnknownResume(_))
        ));
    }

    #[test]
    fn resolve_reports_a_missing_file_as_inconsistency() {
        let (dir, data, catalog) = setup();
        let incoming = dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        add_file(&catalog, &incoming, "cv.pdf");

        fs::remove_file(data.resumes_dir().join("cv.pdf")).unwrap();
        let err = catalog.resolve("cv.pdf").unwrap_err();
        assert!(matches!(err, StoreError::CatalogInconsistent(_)));
    }

    #[test]
    fn rename_rejects_path_like_names() {
        let (_dir, _data, catalog) = setup();
        assert!(matches!(
            catalog.rename("a.pdf", "../b.pdf"),
            Err(StoreError::InvalidName(_))
        ));
    }
}
