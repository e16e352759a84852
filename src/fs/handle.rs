//! Patched file handle management

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::mask::apply_mask;
use crate::error::Result;
use crate::mp4::ctts_tag_offset;

/// Whether open flags ask for anything other than reading
pub fn is_write_intent(flags: i32) -> bool {
    let accmode = flags & libc::O_ACCMODE;
    accmode == libc::O_WRONLY || accmode == libc::O_RDWR || flags & libc::O_TRUNC != 0
}

/// An open source file together with the tag it hides
#[derive(Debug)]
pub struct PatchedFile {
    /// Read-only descriptor on the source file
    file: File,
    /// Absolute offset of the masked `ctts` type field
    masked_tag: Option<u64>,
}

impl PatchedFile {
    /// Wrap an opened file, locating the tag to mask once.
    pub fn new(file: File) -> Self {
        let masked_tag = ctts_tag_offset(&file);
        Self { file, masked_tag }
    }

    /// Offset of the masked tag, if any
    pub fn masked_tag(&self) -> Option<u64> {
        self.masked_tag
    }

    /// Read up to `size` bytes at `offset` with the tag masked.
    ///
    /// A single positioned read is issued, so short reads are returned
    /// as they come.
    pub fn read_at(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size as usize];
        let n = self.file.read_at(&mut buffer, offset)?;
        buffer.truncate(n);

        if let Some(tag) = self.masked_tag {
            apply_mask(&mut buffer, offset, tag);
        }

        Ok(buffer)
    }
}

/// Manages open patched files
pub struct HandleTable {
    next_fh: AtomicU64,
    handles: RwLock<HashMap<u64, Arc<PatchedFile>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handle and return its id
    pub fn insert(&self, file: PatchedFile) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.write().insert(fh, Arc::new(file));
        fh
    }

    /// Get handle by id
    pub fn get(&self, fh: u64) -> Option<Arc<PatchedFile>> {
        self.handles.read().get(&fh).cloned()
    }

    /// Drop a handle; the descriptor closes once no read holds it
    pub fn release(&self, fh: u64) -> Option<Arc<PatchedFile>> {
        self.handles.write().remove(&fh)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
