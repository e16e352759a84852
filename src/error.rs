//! Error types for cttsfs

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the overlay
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Inode not found: {0}")]
    InodeNotFound(u64),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    #[error("Write access denied: {0}")]
    WriteDenied(String),

    #[error("Invalid read offset: {0}")]
    InvalidOffset(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mount failed: {0}")]
    Mount(String),
}

impl Error {
    /// Errno reported to the kernel for this error
    pub fn errno(&self) -> i32 {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::PathNotFound(_) | Error::InodeNotFound(_) => libc::ENOENT,
            Error::InvalidHandle(_) => libc::EBADF,
            Error::WriteDenied(_) => libc::EACCES,
            Error::InvalidOffset(_) | Error::InvalidConfig(_) => libc::EINVAL,
            Error::Config(_) | Error::Mount(_) => libc::EIO,
        }
    }
}
