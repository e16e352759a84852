//! Inode bookkeeping
//!
//! FUSE addresses files by inode number while the overlay works on
//! virtual paths, so every path handed to the kernel gets a stable
//! virtual inode.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Inode number of the mount root
pub const ROOT_INO: u64 = 1;

/// File type as reported to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl From<std::fs::FileType> for FileKind {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_block_device() {
            FileKind::BlockDevice
        } else if ft.is_char_device() {
            FileKind::CharDevice
        } else if ft.is_fifo() {
            FileKind::Fifo
        } else if ft.is_socket() {
            FileKind::Socket
        } else {
            FileKind::RegularFile
        }
    }
}

impl FileKind {
    pub fn to_fuser_type(self) -> fuser::FileType {
        match self {
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Directory => fuser::FileType::Directory,
            FileKind::Symlink => fuser::FileType::Symlink,
            FileKind::BlockDevice => fuser::FileType::BlockDevice,
            FileKind::CharDevice => fuser::FileType::CharDevice,
            FileKind::Fifo => fuser::FileType::NamedPipe,
            FileKind::Socket => fuser::FileType::Socket,
        }
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// Translate source metadata into kernel attributes under a virtual inode
pub fn file_attr(ino: u64, meta: &Metadata) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: meta.len(),
        blocks: meta.blocks(),
        atime: unix_time(meta.atime(), meta.atime_nsec()),
        mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
        ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
        crtime: meta.created().unwrap_or(UNIX_EPOCH),
        kind: FileKind::from(meta.file_type()).to_fuser_type(),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        flags: 0,
    }
}

/// A known virtual inode
struct InodeEntry {
    path: PathBuf,
    /// References held by the kernel, released through `forget`
    lookups: u64,
}

/// Maps virtual inode numbers to virtual paths and back
pub struct InodeTable {
    /// Next virtual inode number
    next_ino: AtomicU64,
    /// Virtual ino -> entry
    entries: RwLock<HashMap<u64, InodeEntry>>,
    /// Virtual path -> virtual ino
    inos: RwLock<HashMap<PathBuf, u64>>,
}

impl InodeTable {
    pub fn new() -> Self {
        let table = Self {
            next_ino: AtomicU64::new(ROOT_INO + 1),
            entries: RwLock::new(HashMap::new()),
            inos: RwLock::new(HashMap::new()),
        };

        let root = PathBuf::from("/");
        table.entries.write().insert(
            ROOT_INO,
            InodeEntry {
                path: root.clone(),
                lookups: 0,
            },
        );
        table.inos.write().insert(root, ROOT_INO);

        table
    }

    /// Virtual path for an inode
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.entries.read().get(&ino).map(|e| e.path.clone())
    }

    /// Inode of a virtual path, if one has been handed out
    pub fn peek(&self, path: &Path) -> Option<u64> {
        self.inos.read().get(path).copied()
    }

    /// Inode for a virtual path, allocating one on first sight
    pub fn ino_for(&self, path: &Path) -> u64 {
        if let Some(ino) = self.peek(path) {
            return ino;
        }
        self.acquire(path, 0)
    }

    /// Inode for a path handed to the kernel by `lookup`.
    ///
    /// Each call takes one reference that `forget` gives back.
    pub fn lookup(&self, path: &Path) -> u64 {
        self.acquire(path, 1)
    }

    fn acquire(&self, path: &Path, refs: u64) -> u64 {
        let mut inos = self.inos.write();
        let mut entries = self.entries.write();

        // another thread may have won the race
        if let Some(&ino) = inos.get(path) {
            if let Some(entry) = entries.get_mut(&ino) {
                entry.lookups = entry.lookups.saturating_add(refs);
            }
            return ino;
        }

        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        inos.insert(path.to_path_buf(), ino);
        entries.insert(
            ino,
            InodeEntry {
                path: path.to_path_buf(),
                lookups: refs,
            },
        );
        ino
    }

    /// Drop `nlookup` kernel references to `ino`.
    ///
    /// The inode is evicted once no references remain. Returns whether it
    /// was evicted. The root is never evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INO {
            return false;
        }

        let mut inos = self.inos.write();
        let mut entries = self.entries.write();

        let Some(entry) = entries.get_mut(&ino) else {
            return false;
        };
        entry.lookups = entry.lookups.saturating_sub(nlookup);
        if entry.lookups > 0 {
            return false;
        }

        if let Some(entry) = entries.remove(&ino) {
            inos.remove(&entry.path);
        }
        true
    }

    /// Inode of the parent directory of `ino`
    pub fn parent_of(&self, ino: u64) -> Option<u64> {
        let path = self.path(ino)?;
        match path.parent() {
            Some(parent) => Some(self.ino_for(parent)),
            None => Some(ROOT_INO),
        }
    }

    /// Number of known inodes
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
