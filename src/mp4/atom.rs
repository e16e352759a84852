//! Atom header definitions.

use std::io::{Read, Seek, SeekFrom};

use super::AtomError;

/// Size of a compact atom header (32-bit size + type).
pub const HEADER_LEN: u64 = 8;

/// Size of a header carrying a 64-bit largesize.
pub const LARGE_HEADER_LEN: u64 = 16;

/// Offset of the type field from the start of an atom.
pub const TYPE_FIELD_OFFSET: u64 = 4;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const TRAK: Self = Self(*b"trak");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const CTTS: Self = Self(*b"ctts");

    /// Create from a big-endian fourcc value.
    pub fn from_u32(code: u32) -> Self {
        Self(code.to_be_bytes())
    }

    /// Fourcc as a big-endian integer.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Whether atoms of this type are descended into while searching.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            AtomType::MOOV | AtomType::TRAK | AtomType::MDIA | AtomType::MINF | AtomType::STBL
        )
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    /// Total atom size including the header.
    pub size: u64,
    /// Atom type code.
    pub atom_type: AtomType,
    /// Header length (8, or 16 with a largesize).
    pub header_len: u64,
}

impl AtomHeader {
    /// Read the header of the atom starting at `offset`.
    ///
    /// The size is not validated here: a target atom is reported by its
    /// position alone, so validation happens in [`AtomHeader::end`].
    pub fn read_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Self, AtomError> {
        reader.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header)?;

        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let atom_type = AtomType([header[4], header[5], header[6], header[7]]);

        if size == 1 {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext)?;
            Ok(Self {
                size: u64::from_be_bytes(ext),
                atom_type,
                header_len: LARGE_HEADER_LEN,
            })
        } else {
            Ok(Self {
                size: size as u64,
                atom_type,
                header_len: HEADER_LEN,
            })
        }
    }

    /// Absolute end offset of this atom when it starts at `offset`.
    pub fn end(&self, offset: u64) -> Result<u64, AtomError> {
        if self.size < self.header_len {
            return Err(AtomError::InvalidSize {
                offset,
                size: self.size,
            });
        }
        offset
            .checked_add(self.size)
            .ok_or(AtomError::Overflow { offset })
    }

    /// Absolute offset of this atom's first child.
    pub fn body_start(&self, offset: u64) -> Result<u64, AtomError> {
        offset
            .checked_add(self.header_len)
            .ok_or(AtomError::Overflow { offset })
    }
}
