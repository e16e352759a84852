//! ISO base media (MP4) container support
//!
//! Only as much of the box hierarchy is understood as is needed to
//! find the `ctts` box; everything else is treated as opaque.

mod atom;
mod walker;

pub use atom::{AtomHeader, AtomType, HEADER_LEN, LARGE_HEADER_LEN, TYPE_FIELD_OFFSET};
pub use walker::{ctts_tag_offset, AtomWalker, MAX_DEPTH};

use thiserror::Error;

/// Parse failure while walking a container
#[derive(Error, Debug)]
pub enum AtomError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid size {size} for atom at offset {offset}")]
    InvalidSize { offset: u64, size: u64 },

    #[error("Atom at offset {offset} overflows the addressable range")]
    Overflow { offset: u64 },

    #[error("Atom nesting deeper than {depth} at offset {offset}")]
    TooDeep { offset: u64, depth: usize },
}
