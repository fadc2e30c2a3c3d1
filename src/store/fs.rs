//! Filesystem seam of the object store. Paths are `/`-separated and relative to the store root.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

/// Minimal file operations the store needs. Implementations must make [`Vfs::write`] atomic:
/// a reader sees either the old content or the new one, never a partial file.
pub trait Vfs: Send + Sync {
    /// Whole-file read; a missing file is an [`io::ErrorKind::NotFound`] error.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    /// Atomically replace `path` with `data`, creating parent directories.
    fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;
    fn exists(&self, path: &str) -> bool;
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;
    /// Remove `path`; removing a missing file is not an error.
    fn delete(&self, path: &str) -> io::Result<()>;
    /// File names directly inside `dir`; a missing directory lists as empty.
    fn list(&self, dir: &str) -> io::Result<Vec<String>>;
}

/// [`Vfs`] over a local directory. Writes go to a temp file in the destination directory and
/// are persisted over the target.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFs { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl Vfs for LocalFs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let target = self.resolve(to);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::rename(self.resolve(from), target)
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.resolve(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_rename_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        fs.write("objects/ab/cdef", b"payload").unwrap();
        assert!(fs.exists("objects/ab/cdef"));
        assert_eq!(fs.read("objects/ab/cdef").unwrap(), b"payload");

        fs.write("objects/ab/cdef", b"replaced").unwrap();
        assert_eq!(fs.read("objects/ab/cdef").unwrap(), b"replaced");

        fs.rename("objects/ab/cdef", "objects/info/moved").unwrap();
        assert!(!fs.exists("objects/ab/cdef"));
        assert_eq!(fs.list("objects/info").unwrap(), vec!["moved".to_string()]);

        fs.delete("objects/info/moved").unwrap();
        fs.delete("objects/info/moved").unwrap();
        assert!(!fs.exists("objects/info/moved"));
    }

    #[test]
    fn missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let err = fs.read("nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(fs.list("objects/pack").unwrap().is_empty());
    }

    #[test]
    fn writes_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        for i in 0..5u8 {
            fs.write("objects/pack/data", &[i; 16]).unwrap();
        }
        assert_eq!(fs.list("objects/pack").unwrap(), vec!["data".to_string()]);
    }
}
