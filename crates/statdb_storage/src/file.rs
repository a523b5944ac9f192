//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix of the scratch file used by [`StorageBackend::replace_all`].
const REPLACE_SUFFIX: &str = "compact";

/// Options controlling how a [`FileBackend`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBackendOptions {
    /// Create missing parent directories.
    pub create_dirs: bool,
    /// Permission bits for a newly created file (Unix only).
    pub mode: Option<u32>,
}

impl Default for FileBackendOptions {
    fn default() -> Self {
        Self {
            create_dirs: false,
            mode: None,
        }
    }
}

/// A storage backend over a single file.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
/// - `replace_all()` writes a sibling file, syncs it and renames it over the
///   original, so readers never see a half-written file
///
/// # Example
///
/// ```no_run
/// use statdb_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("stats.db")).unwrap();
/// backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    options: FileBackendOptions,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, FileBackendOptions::default())
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        Self::open_with(
            path,
            FileBackendOptions {
                create_dirs: true,
                mode: None,
            },
        )
    }

    /// Opens or creates a file backend with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with(path: &Path, options: FileBackendOptions) -> StorageResult<Self> {
        if options.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let file = open_file(path, options.mode)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            options,
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scratch_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(REPLACE_SUFFIX);
        self.path.with_file_name(name)
    }

    #[cfg(unix)]
    fn sync_parent_dir(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent_dir(&self) -> StorageResult<()> {
        // NTFS journals the rename itself
        Ok(())
    }
}

fn open_file(path: &Path, mode: Option<u32>) -> StorageResult<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(options.open(path)?)
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn replace_all(&mut self, data: &[u8]) -> StorageResult<()> {
        let scratch = self.scratch_path();

        let mut tmp = OpenOptions::new();
        tmp.write(true).create(true).truncate(true);
        #[cfg(unix)]
        if let Some(mode) = self.options.mode {
            use std::os::unix::fs::OpenOptionsExt;
            tmp.mode(mode);
        }

        let written = tmp.open(&scratch).and_then(|mut f| {
            f.write_all(data)?;
            f.sync_all()
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&scratch);
            return Err(err.into());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        if let Err(err) = fs::rename(&scratch, &self.path) {
            let _ = fs::remove_file(&scratch);
            return Err(err.into());
        }

        // The old handle now points at an unlinked inode
        *file = open_file(&self.path, None)?;
        *size = data.len() as u64;

        self.sync_parent_dir()
    }
}
