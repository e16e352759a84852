//! FUSE filesystem implementation
//!
//! Passes the source tree through read-only and masks the `ctts` tag
//! of MP4 files on the read path.

mod filesystem;
mod handle;
mod inode;
mod mask;
mod source;

pub use filesystem::{CttsEraserFs, DirEntry};
pub use handle::{is_write_intent, HandleTable, PatchedFile};
pub use inode::{file_attr, FileKind, InodeTable, ROOT_INO};
pub use mask::{apply_mask, tag_range, MASK_BYTE, TAG_LEN};
pub use source::{SourceDirEntry, SourceTree};
