use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;
use serde::Serialize;

use crate::error::{ExtractError, Result};
use crate::resource::ResourcePath;

/// Every resource is stored as `<dir>/GET.json`, mirroring an HTTP GET.
pub const SNAPSHOT_FILE_NAME: &str = "GET.json";

/// Writes resources into a directory tree that mirrors their API paths.
///
/// `/api/pipelines/group/app/builds` ends up in
/// `<root>/api/pipelines/group/app/builds/GET.json`. Existing files are
/// overwritten; writing the same path twice within one run is refused.
pub struct Persister {
    root: PathBuf,
    written: Mutex<HashSet<PathBuf>>,
}

impl Persister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a resource is stored in; depends on nothing but `path`.
    pub fn target_dir(&self, path: &ResourcePath) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for segment in path.segments() {
            if segment == ".." {
                return Err(ExtractError::io(
                    &self.root,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{path} escapes the snapshot directory"),
                    ),
                ));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    /// Serializes `value` as indented JSON and stores it.
    pub fn persist_json<T: Serialize>(&self, path: &ResourcePath, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.persist_bytes(path, &bytes)
    }

    /// Stores `bytes` as-is.
    pub fn persist_bytes(&self, path: &ResourcePath, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.target_dir(path)?;
        let file = dir.join(SNAPSHOT_FILE_NAME);

        {
            let mut written = self
                .written
                .lock()
                .map_err(|_| ExtractError::Task("persister state is poisoned".to_string()))?;
            if !written.insert(file.clone()) {
                return Err(ExtractError::AlreadyPersisted(file));
            }
        }

        fs::create_dir_all(&dir).map_err(|e| ExtractError::io(&dir, e))?;
        fs::write(&file, bytes).map_err(|e| ExtractError::io(&file, e))?;

        info!("Fetched and saved {path}");
        Ok(file)
    }

    /// Number of files written so far.
    pub fn written_count(&self) -> usize {
        self.written.lock().map(|w| w.len()).unwrap_or_default()
    }
}
