//! File persistence for key stores.

use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{PersistError, Result};
use crate::format;
use crate::record::KeysData;
use crate::store::SaveKeys;

/// A storage backend for persisting key files.
///
/// `Storage` reads and writes the JSON key file on the filesystem. It is the
/// persistence collaborator handed to [`KeyStore::open`].
///
/// [`KeyStore::open`]: crate::KeyStore::open
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the key file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads and parses the key file.
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid key file.
    pub fn load(&self) -> Result<KeysData> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "key file absent, starting empty");
                return Ok(KeysData::new());
            }
            Err(e) => return Err(PersistError::from(e).into()),
        };
        let keys = format::parse(&data)?;
        tracing::debug!(path = %self.path.display(), keys = keys.len(), "loaded key file");
        Ok(keys)
    }

    /// Writes data to the key file using atomic write.
    ///
    /// This method ensures crash-safety by:
    /// 1. Writing data to a temporary file with random name
    /// 2. Syncing the temporary file to disk
    /// 3. Atomically replacing the old file with the new one
    /// 4. Syncing the parent directory to ensure the rename is persisted
    ///
    /// If a crash occurs during the write, either the old or new file will be
    /// present, never a corrupted partial write.
    ///
    /// Creates parent directories if they don't exist.
    pub fn write(&self, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        // fails if the name is already taken
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.parent_dir() {
            sync_dir(parent)?;
        }

        Ok(())
    }

    /// Returns the path to the key file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> io::Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|e| io::Error::other(e.to_string()))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "key file path has no file name"))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
    /// so the replacement is persisted to disk. `ReplaceFileW` requires the
    /// target to exist, so the first write falls back to a rename.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> io::Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            return fs::rename(tmp_path, &self.path);
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> io::Result<()> {
        fs::rename(tmp_path, &self.path)
    }
}

#[cfg(not(target_os = "windows"))]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened as files on Windows; ReplaceFileW already
// writes through.
#[cfg(target_os = "windows")]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl SaveKeys for Storage {
    fn save(&mut self, keys: &KeysData) -> std::result::Result<(), PersistError> {
        let data = format::serialize(keys)?;
        self.write(&data)?;
        tracing::debug!(path = %self.path.display(), keys = keys.len(), "wrote key file");
        Ok(())
    }
}
