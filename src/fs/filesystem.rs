//! FUSE filesystem implementation
//!
//! Serves the source tree read-only, hiding the `ctts` tag of MP4 files.

use fuser::{
    FileAttr, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{
    handle::{is_write_intent, HandleTable, PatchedFile},
    inode::{file_attr, FileKind, InodeTable},
    source::SourceTree,
};
use crate::config::Config;
use crate::error::{Error, Result};

/// Directory listing entry as handed to the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: OsString,
    pub kind: FileKind,
}

/// Read-only overlay that erases `ctts` tags
pub struct CttsEraserFs {
    /// Backing directory tree
    source: SourceTree,
    /// Virtual inode management
    inodes: InodeTable,
    /// Open file handles
    handles: HandleTable,
    /// Attribute cache lifetime
    ttl: Duration,
}

impl CttsEraserFs {
    /// Create a filesystem over `source`
    pub fn new(source: SourceTree, ttl: Duration) -> Self {
        Self {
            source,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            ttl,
        }
    }

    /// Create a filesystem from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = SourceTree::new(config.source.clone())?;
        Ok(Self::new(source, config.mount.attr_ttl()))
    }

    /// Open handles
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Virtual inodes
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    fn path_of(&self, ino: u64) -> Result<PathBuf> {
        self.inodes.path(ino).ok_or(Error::InodeNotFound(ino))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<PathBuf> {
        Ok(self.path_of(parent)?.join(name))
    }

    /// Attributes of a virtual path handed to the kernel by name.
    ///
    /// Takes a reference on the inode only when the path exists.
    pub fn lookup_path(&self, path: &Path) -> Result<FileAttr> {
        let meta = self.source.metadata(path)?;
        Ok(file_attr(self.inodes.lookup(path), &meta))
    }

    /// Give back `nlookup` references taken by `lookup_path`
    pub fn forget_inode(&self, ino: u64, nlookup: u64) -> bool {
        self.inodes.forget(ino, nlookup)
    }

    /// Attributes of a virtual path
    pub fn getattr_path(&self, path: &Path) -> Result<FileAttr> {
        let meta = self.source.metadata(path)?;
        Ok(file_attr(self.inodes.ino_for(path), &meta))
    }

    /// Entries of a virtual directory, `.` and `..` first
    pub fn readdir_path(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let ino = self.inodes.ino_for(path);
        let parent = self.inodes.parent_of(ino).unwrap_or(ino);

        let mut entries = vec![
            DirEntry {
                ino,
                name: OsString::from("."),
                kind: FileKind::Directory,
            },
            DirEntry {
                ino: parent,
                name: OsString::from(".."),
                kind: FileKind::Directory,
            },
        ];

        for entry in self.source.read_dir(path)? {
            let child = self
                .inodes
                .peek(&path.join(&entry.name))
                .unwrap_or(entry.ino);
            entries.push(DirEntry {
                ino: child,
                name: entry.name,
                kind: entry.kind,
            });
        }

        Ok(entries)
    }

    /// Open a virtual path for reading and return the handle id
    pub fn open_path(&self, path: &Path, flags: i32) -> Result<u64> {
        if is_write_intent(flags) {
            return Err(Error::WriteDenied(path.display().to_string()));
        }

        let file = self.source.open(path)?;
        let patched = PatchedFile::new(file);
        debug!("open({:?}): ctts tag at {:?}", path, patched.masked_tag());

        Ok(self.handles.insert(patched))
    }

    /// Read from an open handle
    pub fn read_handle(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| Error::InvalidOffset(offset))?;
        let handle = self.handles.get(fh).ok_or(Error::InvalidHandle(fh))?;
        handle.read_at(offset, size)
    }

    /// Release an open handle
    pub fn release_handle(&self, fh: u64) -> Result<()> {
        self.handles
            .release(fh)
            .map(|_| ())
            .ok_or(Error::InvalidHandle(fh))
    }
}

/// Entries after directory cookie `offset`, each with its own cookie.
///
/// The cookie of an entry is its 1-based position, so resuming at the
/// cookie of the last entry delivered continues with the next one.
fn dir_page(
    entries: &[DirEntry],
    offset: i64,
) -> impl Iterator<Item = (u64, i64, FileKind, &OsStr)> {
    let skip = usize::try_from(offset).unwrap_or(0);
    entries
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, e)| (e.ino, (i + 1) as i64, e.kind, e.name.as_os_str()))
}

impl Filesystem for CttsEraserFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);

        let result = self
            .child_path(parent, name)
            .and_then(|path| self.lookup_path(&path));

        match result {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        if self.forget_inode(ino, nlookup) {
            debug!("forget(ino={}): evicted", ino);
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);

        match self.path_of(ino).and_then(|path| self.getattr_path(&path)) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => {
                debug!("getattr(ino={}) failed: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, offset={})", ino, offset);

        let entries = match self.path_of(ino).and_then(|path| self.readdir_path(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("readdir(ino={}) failed: {}", ino, e);
                reply.error(e.errno());
                return;
            }
        };

        for (child, cookie, kind, name) in dir_page(&entries, offset) {
            if reply.add(child, cookie, kind.to_fuser_type(), name) {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={:#o})", ino, flags);

        match self.path_of(ino).and_then(|path| self.open_path(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => {
                warn!("open(ino={}) failed: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        match self.read_handle(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read(ino={}, fh={}) failed: {}", ino, fh, e);
                reply.error(e.errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release(ino={}, fh={})", ino, fh);

        match self.release_handle(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }
}
