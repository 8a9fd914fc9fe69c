//! Storage collaborator contract and the filesystem backend
//!
//! The cache never holds record contents beyond a single call. Everything it
//! needs from the block-storage layer is expressed by two traits:
//! - [`Storage`]: open/delete/list named records in one directory
//! - [`Record`]: sequential read, seek-then-write, close on an open record
//!
//! [`DirStorage`] maps each record to one file inside a directory.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// How a record is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only, fails with `NotFound` if absent
    ReadOnly,
    /// Read and write, fails with `NotFound` if absent
    ReadWrite,
    /// Read and write, created empty if absent, existing contents kept
    Create,
    /// Read and write, created if absent, existing contents discarded
    Truncate,
}

impl OpenMode {
    /// Whether records opened in this mode accept writes
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// An open named record
pub trait Record {
    /// Read up to `buf.len()` bytes from the current position
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the cursor to an absolute byte offset
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Write all of `buf` at the current position
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Current record length in bytes
    fn len(&self) -> Result<u64>;

    /// Flush and release the record
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// True when the record holds no bytes
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fill `buf` completely, failing with `Corrupt` on a short record
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Corrupt(format!(
                    "unexpected end of record after {} of {} bytes",
                    filled,
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read from the current position to the end of the record
    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}

/// A directory of named records
pub trait Storage {
    /// Handle type returned by [`Storage::open`]
    type Record: Record;

    /// Open a record by name
    fn open(&self, name: &str, mode: OpenMode) -> Result<Self::Record>;

    /// Remove a record, `NotFound` if it does not exist
    fn delete(&self, name: &str) -> Result<()>;

    /// Names of all records currently in the directory
    fn list(&self) -> Result<Vec<String>>;

    /// Check whether a record exists
    fn exists(&self, name: &str) -> Result<bool> {
        match self.open(name, OpenMode::ReadOnly) {
            Ok(record) => {
                record.close()?;
                Ok(true)
            }
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Filesystem-backed storage: one file per record
#[derive(Debug, Clone)]
pub struct DirStorage {
    /// Directory holding the records
    root: PathBuf,
}

impl DirStorage {
    /// Open or create a record directory at the given path
    ///
    /// # Arguments
    /// * `path` - Directory path for the record files
    ///
    /// # Returns
    /// * `Result<DirStorage>` - Storage handle
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(DirStorage { root })
    }

    /// Directory holding the records
    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Storage for DirStorage {
    type Record = FileRecord;

    fn open(&self, name: &str, mode: OpenMode) -> Result<FileRecord> {
        let mut options = OpenOptions::new();
        options.read(true);
        match mode {
            OpenMode::ReadOnly => {}
            OpenMode::ReadWrite => {
                options.write(true);
            }
            OpenMode::Create => {
                options.write(true).create(true);
            }
            OpenMode::Truncate => {
                options.write(true).create(true).truncate(true);
            }
        }

        let file = options.open(self.root.join(name))?;
        Ok(FileRecord { file, dirty: false })
    }

    fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.root.join(name))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// An open record file
#[derive(Debug)]
pub struct FileRecord {
    file: File,
    /// Set once a write happened, so close only syncs what changed
    dirty: bool,
}

impl Record for FileRecord {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        self.dirty = true;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn close(mut self) -> Result<()> {
        if self.dirty {
            self.file.flush()?;
            self.file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path().join("remote_fonts")).unwrap();

        let mut record = storage.open("42", OpenMode::Create).unwrap();
        record.write_all(b"glyph").unwrap();
        record.close().unwrap();

        let mut record = storage.open("42", OpenMode::ReadOnly).unwrap();
        assert_eq!(record.read_to_end().unwrap(), b"glyph");
        assert_eq!(record.len().unwrap(), 5);
    }

    #[test]
    fn test_open_missing() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();

        assert!(matches!(storage.open("7", OpenMode::ReadOnly), Err(Error::NotFound)));
        assert!(matches!(storage.open("7", OpenMode::ReadWrite), Err(Error::NotFound)));
        assert!(!storage.exists("7").unwrap());
    }

    #[test]
    fn test_truncate_discards_contents() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();

        let mut record = storage.open("1", OpenMode::Create).unwrap();
        record.write_all(b"longer payload").unwrap();
        record.close().unwrap();

        let mut record = storage.open("1", OpenMode::Truncate).unwrap();
        record.write_all(b"short").unwrap();
        record.close().unwrap();

        let mut record = storage.open("1", OpenMode::ReadOnly).unwrap();
        assert_eq!(record.read_to_end().unwrap(), b"short");
    }

    #[test]
    fn test_seek_then_write() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();

        let mut record = storage.open("0.lnk", OpenMode::Create).unwrap();
        record.write_all(&[1, 2, 3, 4]).unwrap();
        record.seek(2).unwrap();
        record.write_all(&[9, 9]).unwrap();
        record.close().unwrap();

        let mut record = storage.open("0.lnk", OpenMode::ReadOnly).unwrap();
        let mut buf = [0u8; 4];
        record.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 9, 9]);
    }

    #[test]
    fn test_read_exact_short() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();

        let mut record = storage.open("3", OpenMode::Create).unwrap();
        record.write_all(&[1]).unwrap();
        record.seek(0).unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(record.read_exact(&mut buf), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_delete_and_list() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        for name in ["1", "2", "2.lnk"] {
            storage.open(name, OpenMode::Create).unwrap().close().unwrap();
        }

        let mut names = storage.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["1", "2", "2.lnk"]);

        storage.delete("2").unwrap();
        assert!(matches!(storage.delete("2"), Err(Error::NotFound)));
        assert!(storage.exists("2.lnk").unwrap());
        assert_eq!(storage.list().unwrap().len(), 2);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();
        storage.open("5", OpenMode::Create).unwrap().close().unwrap();

        let mut record = storage.open("5", OpenMode::ReadOnly).unwrap();
        assert!(record.write_all(b"x").is_err());
    }
}
