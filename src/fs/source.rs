//! Source tree pass-through interface
//!
//! Provides read-only access to the backing directory tree.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::os::unix::fs::DirEntryExt;
use std::path::{Path, PathBuf};

use super::inode::FileKind;

/// Directory entry from the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDirEntry {
    pub name: OsString,
    /// Inode number inside the source filesystem
    pub ino: u64,
    pub kind: FileKind,
}

/// Pass-through interface to the backing directory tree
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Root path of the backing tree
    root: PathBuf,
}

impl SourceTree {
    /// Create a new source tree interface
    pub fn new(root: PathBuf) -> Result<Self> {
        if !root.exists() {
            return Err(Error::PathNotFound(root.to_string_lossy().to_string()));
        }
        Ok(Self { root })
    }

    /// Resolve a virtual path to a backing path.
    ///
    /// This is plain concatenation of the root and the virtual path, so
    /// `/a.mp4` under `/data` becomes `/data/a.mp4`. Nothing is normalized.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = OsString::from(self.root.as_os_str());
        resolved.push(path.as_os_str());
        PathBuf::from(resolved)
    }

    /// Status of a path, following symlinks like `stat(2)`
    pub fn metadata(&self, path: &Path) -> Result<Metadata> {
        fs::metadata(self.resolve(path)).map_err(Error::Io)
    }

    /// Open a path read-only
    pub fn open(&self, path: &Path) -> Result<File> {
        File::open(self.resolve(path)).map_err(Error::Io)
    }

    /// Read directory entries in enumeration order.
    ///
    /// `.` and `..` are not part of the result; the kernel-facing layer adds
    /// them.
    pub fn read_dir(&self, path: &Path) -> Result<Vec<SourceDirEntry>> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();

        for entry in fs::read_dir(&resolved).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            let file_type = entry.file_type().map_err(Error::Io)?;

            // report what stat would report for symlinks
            let kind = if file_type.is_symlink() {
                fs::metadata(entry.path())
                    .map(|m| FileKind::from(m.file_type()))
                    .unwrap_or(FileKind::Symlink)
            } else {
                FileKind::from(file_type)
            };

            entries.push(SourceDirEntry {
                name: entry.file_name(),
                ino: entry.ino(),
                kind,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_concatenates() {
        let dir = tempdir().unwrap();
        let source = SourceTree::new(dir.path().to_path_buf()).unwrap();

        let resolved = source.resolve(Path::new("/clips/a.mp4"));
        let mut expected = dir.path().as_os_str().to_os_string();
        expected.push("/clips/a.mp4");
        assert_eq!(resolved.as_os_str(), expected.as_os_str());

        assert_eq!(source.resolve(Path::new("/")), PathBuf::from(format!("{}/", dir.path().display())));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            SourceTree::new(missing),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn test_metadata_passthrough() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("test.txt"), b"hello world").unwrap();
        let source = SourceTree::new(dir.path().to_path_buf()).unwrap();

        let meta = source.metadata(Path::new("/test.txt")).unwrap();
        assert_eq!(meta.len(), 11);
        assert!(meta.is_file());

        let err = source.metadata(Path::new("/missing.txt")).unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT);
    }

    #[test]
    fn test_read_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("file1.mp4"), b"1").unwrap();
        fs::write(dir.path().join("file2.txt"), b"2").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let source = SourceTree::new(dir.path().to_path_buf()).unwrap();
        let entries = source.read_dir(Path::new("/")).unwrap();

        let names: HashSet<OsString> = entries.iter().map(|e| e.name.clone()).collect();
        let expected: HashSet<OsString> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, expected);

        let subdir = entries.iter().find(|e| e.name == "subdir").unwrap();
        assert_eq!(subdir.kind, FileKind::Directory);

        use std::os::unix::fs::MetadataExt;
        let file1 = entries.iter().find(|e| e.name == "file1.mp4").unwrap();
        assert_eq!(file1.ino, fs::metadata(dir.path().join("file1.mp4")).unwrap().ino());
    }

    #[test]
    fn test_read_dir_on_file_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("plain"), b"x").unwrap();
        let source = SourceTree::new(dir.path().to_path_buf()).unwrap();

        let err = source.read_dir(Path::new("/plain")).unwrap_err();
        assert_eq!(err.errno(), libc::ENOTDIR);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_reported_as_target() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let source = SourceTree::new(dir.path().to_path_buf()).unwrap();

        let entries = source.read_dir(Path::new("/")).unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert_eq!(link.kind, FileKind::Directory);
    }
}
