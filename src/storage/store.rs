// Shared flat file directory exposed to clients

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use crate::common::error::{Error, Result};
use crate::common::types::{FileEntry, UPLOAD_TEMP_PREFIX};
use super::locks::FileLocks;

/// Flat directory of named files shared by every session.
///
/// There is no locking around reads or listings. Uploads are written to a
/// hidden temp file in the same directory and renamed over the final name, so
/// readers see either the old or the new content, never a partial file.
/// Concurrent uploads to one name: last rename wins.
pub struct FileStore {
    root: PathBuf,
    write_locks: Option<FileLocks>,
}

impl FileStore {
    /// Open an existing directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::ConfigError(format!("store root {:?} is not a directory", root)));
        }
        Ok(Self { root, write_locks: None })
    }

    /// Open `root`, creating it first if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Self::open(root)
    }

    /// Serialize the rename step of uploads that target the same name
    pub fn with_write_locks(mut self) -> Self {
        self.write_locks = Some(FileLocks::new());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current files, sorted by name. In-flight uploads are not listed.
    pub fn list(&self) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    log::warn!("Skipping non UTF-8 file name {:?}", raw);
                    continue;
                }
            };
            if name.starts_with(UPLOAD_TEMP_PREFIX) {
                continue;
            }

            let metadata = match fs::metadata(entry.path()) {
                Ok(m) => m,
                // removed between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if metadata.is_file() {
                files.push(FileEntry::new(name, metadata.len()));
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub fn contains(&self, name: &str) -> bool {
        validate_filename(name).is_ok() && self.root.join(name).is_file()
    }

    /// Whole file contents; the length of the returned buffer is the size to
    /// advertise.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_filename(name)?;
        let path = self.root.join(name);

        if path.is_dir() {
            return Err(Error::FileNotFound(name.to_string()));
        }
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(name.to_string()),
            _ => Error::Io(e),
        })
    }

    /// Start an upload to `name`; nothing is visible until [`Upload::commit`].
    pub fn begin_upload(&self, name: &str) -> Result<Upload<'_>> {
        validate_filename(name)?;
        let temp = tempfile::Builder::new()
            .prefix(UPLOAD_TEMP_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.root)?;

        Ok(Upload {
            store: self,
            name: name.to_string(),
            temp,
            written: 0,
        })
    }

    /// Atomically replace `name` with `data`
    pub fn write(&self, name: &str, data: &[u8]) -> Result<u64> {
        let mut upload = self.begin_upload(name)?;
        upload.write_all(data)?;
        upload.commit()
    }
}

/// Pending upload backed by a temp file in the store directory.
///
/// Dropping it without committing deletes the temp file.
pub struct Upload<'a> {
    store: &'a FileStore,
    name: String,
    temp: NamedTempFile,
    written: u64,
}

impl Upload<'_> {
    /// Flush to disk and rename over the final name
    pub fn commit(self) -> Result<u64> {
        let Upload { store, name, mut temp, written } = self;
        temp.flush()?;
        temp.as_file().sync_all()?;

        let target = store.root.join(&name);
        let persist = move || -> Result<()> {
            temp.persist(&target).map_err(|e| Error::Io(e.error))?;
            Ok(())
        };

        match &store.write_locks {
            Some(locks) => locks.with_lock(&name, persist)?,
            None => persist()?,
        }

        log::debug!("Stored {} ({} bytes)", name, written);
        Ok(written)
    }
}

impl Write for Upload<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.temp.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Accept only a flat file name: no separators, no `.`/`..`, not empty, not
/// one of our temp names.
pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.starts_with(UPLOAD_TEMP_PREFIX);

    if invalid {
        return Err(Error::InvalidFilename(name.to_string()));
    }
    Ok(())
}
