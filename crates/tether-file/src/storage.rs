//! JSON file storage for persisted credentials.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, instrument, trace};

use tether_core::Result;
use tether_core::Storage;
use tether_core::error::{Error, StorageError};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

type Entries = BTreeMap<String, String>;

/// A [`Storage`] backed by a single JSON object on disk.
///
/// Every operation re-reads the file, so several processes sharing the same
/// path observe each other's writes. Writers serialize on an advisory lock
/// file next to the data file; the data file is replaced atomically and, on
/// Unix, readable only by its owner.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error::Storage(StorageError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

impl FileStorage {
    /// Use (and lazily create) the JSON file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let lock_path = self.lock_path();
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))
    }

    fn read_entries(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let json = fs::read_to_string(&self.path).map_err(|e| io_error(&self.path, e))?;
        if json.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&json).map_err(|e| {
            Error::Storage(StorageError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");

        fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tmp)
                .map_err(|e| io_error(&tmp, e))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms).map_err(|e| io_error(&tmp, e))?;
        }

        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }

    fn update(&self, f: impl FnOnce(&mut Entries)) -> Result<()> {
        let lock_file = self.open_lock()?;
        lock_file
            .lock_exclusive()
            .map_err(|e| io_error(&self.lock_path(), e))?;

        let result = self.read_entries().and_then(|mut entries| {
            f(&mut entries);
            self.write_entries(&entries)
        });

        lock_file
            .unlock()
            .map_err(|e| io_error(&self.lock_path(), e))?;
        result
    }
}

impl Storage for FileStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn get(&self, key: &str) -> Result<Option<String>> {
        let lock_file = self.open_lock()?;
        lock_file
            .lock_shared()
            .map_err(|e| io_error(&self.lock_path(), e))?;

        let result = self.read_entries().map(|mut entries| entries.remove(key));

        lock_file
            .unlock()
            .map_err(|e| io_error(&self.lock_path(), e))?;
        trace!(found = matches!(result, Ok(Some(_))), "Read key");
        result
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Writing key");
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        debug!("Removing key");
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
