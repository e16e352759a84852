//! cttsfs - Read-only overlay that hides the `ctts` box of MP4 files
//!
//! This library provides a FUSE filesystem that mirrors a directory tree
//! unchanged, except that the type tag of the first `ctts` box in every
//! MP4 file reads back as `@@@@`. Decoders that mishandle composition
//! offsets then ignore the box, while the files on disk stay untouched.

pub mod config;
pub mod error;
pub mod fs;
pub mod mp4;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, MountConfig};
    pub use crate::error::{Error, Result};
    pub use crate::fs::CttsEraserFs;
}
