//! Depth-first search for a target atom.

use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

use super::atom::{AtomHeader, AtomType, HEADER_LEN, TYPE_FIELD_OFFSET};
use super::AtomError;

/// Deepest container nesting followed before giving up.
pub const MAX_DEPTH: usize = 16;

/// Walks the atom tree of a seekable byte source.
pub struct AtomWalker<R> {
    reader: R,
    target: AtomType,
}

impl<R: Read + Seek> AtomWalker<R> {
    /// Walker searching for `ctts`.
    pub fn new(reader: R) -> Self {
        Self::with_target(reader, AtomType::CTTS)
    }

    /// Walker searching for an arbitrary atom type.
    pub fn with_target(reader: R, target: AtomType) -> Self {
        Self { reader, target }
    }

    /// Offset of the target's type field, searching the whole file.
    ///
    /// Returns `Ok(None)` when the file does not start with `ftyp` or the
    /// target is absent.
    pub fn find(&mut self) -> Result<Option<u64>, AtomError> {
        let len = self.reader.seek(SeekFrom::End(0))?;

        let ftyp = AtomHeader::read_at(&mut self.reader, 0)?;
        if ftyp.atom_type != AtomType::FTYP {
            return Ok(None);
        }
        let start = ftyp.end(0)?;

        self.find_in(start, len)
    }

    /// Offset of the target's type field within `[start, end)`.
    pub fn find_in(&mut self, start: u64, end: u64) -> Result<Option<u64>, AtomError> {
        self.walk(start, end, 0)
    }

    fn walk(&mut self, start: u64, end: u64, depth: usize) -> Result<Option<u64>, AtomError> {
        if depth > MAX_DEPTH {
            return Err(AtomError::TooDeep {
                offset: start,
                depth: MAX_DEPTH,
            });
        }

        let mut cursor = start;
        while has_room(cursor, end) {
            let header = AtomHeader::read_at(&mut self.reader, cursor)?;

            if header.atom_type == self.target {
                return Ok(Some(cursor + TYPE_FIELD_OFFSET));
            }

            let next = header.end(cursor)?;

            if header.atom_type.is_container() {
                let body = header.body_start(cursor)?;
                if let Some(found) = self.walk(body, next, depth + 1)? {
                    return Ok(Some(found));
                }
            }

            cursor = next;
        }

        Ok(None)
    }
}

/// Whether another header fits between `cursor` and `end`.
fn has_room(cursor: u64, end: u64) -> bool {
    end.checked_sub(HEADER_LEN)
        .map_or(false, |last| cursor <= last)
}

/// Offset of the `ctts` type field, or `None` when nothing should be masked.
///
/// Parse failures are logged and treated like a missing atom so that a
/// malformed file is still served unmodified.
pub fn ctts_tag_offset<R: Read + Seek>(reader: R) -> Option<u64> {
    match AtomWalker::new(reader).find() {
        Ok(offset) => offset,
        Err(e) => {
            debug!("atom walk failed, serving unmodified: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom(ty: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(ty);
        out.extend_from_slice(payload);
        out
    }

    fn ftyp() -> Vec<u8> {
        atom(b"ftyp", b"isom\0\0\0\x01isom")
    }

    fn nested_ctts() -> Vec<u8> {
        let ctts = atom(b"ctts", &[0, 0, 0, 0]);
        let stbl = atom(b"stbl", &ctts);
        let minf = atom(b"minf", &stbl);
        let mdia = atom(b"mdia", &minf);
        let trak = atom(b"trak", &mdia);
        atom(b"moov", &trak)
    }

    fn find(bytes: Vec<u8>) -> Result<Option<u64>, AtomError> {
        AtomWalker::new(Cursor::new(bytes)).find()
    }

    #[test]
    fn test_finds_nested_ctts() {
        let mut file = ftyp();
        let ftyp_len = file.len() as u64;
        file.extend(nested_ctts());

        let offset = find(file.clone()).unwrap().unwrap();
        assert_eq!(offset, ftyp_len + 5 * 8 + 4);
        assert_eq!(&file[offset as usize..offset as usize + 4], b"ctts");
    }

    #[test]
    fn test_skips_leading_siblings() {
        let mut file = ftyp();
        file.extend(atom(b"free", &[0; 32]));
        file.extend(atom(b"mdat", &[0xAA; 64]));
        let moov_at = file.len() as u64;

        let mvhd = atom(b"mvhd", &[0; 100]);
        let tkhd = atom(b"tkhd", &[0; 84]);
        let stts = atom(b"stts", &[0; 16]);
        let ctts = atom(b"ctts", &[0; 16]);
        let stbl = atom(b"stbl", &[stts.clone(), ctts].concat());
        let minf = atom(b"minf", &[atom(b"vmhd", &[0; 12]), stbl].concat());
        let mdia = atom(b"mdia", &[atom(b"mdhd", &[0; 24]), minf].concat());
        let trak = atom(b"trak", &[tkhd.clone(), mdia].concat());
        file.extend(atom(b"moov", &[mvhd.clone(), trak].concat()));

        let expected = moov_at
            + 8
            + mvhd.len() as u64
            + 8
            + tkhd.len() as u64
            + 8
            + 8
            + 24
            + 8
            + 8
            + 12
            + 8
            + stts.len() as u64
            + 4;
        let offset = find(file.clone()).unwrap().unwrap();
        assert_eq!(offset, expected);
        assert_eq!(&file[offset as usize..offset as usize + 4], b"ctts");
    }

    #[test]
    fn test_first_match_wins_across_tracks() {
        let empty_trak = atom(b"trak", &atom(b"tkhd", &[0; 8]));
        let mut file = ftyp();
        let moov_at = file.len() as u64;
        let moov = atom(b"moov", &[empty_trak.clone(), nested_ctts()[8..].to_vec()].concat());
        file.extend(moov);

        let offset = find(file).unwrap().unwrap();
        assert_eq!(offset, moov_at + 8 + empty_trak.len() as u64 + 4 * 8 + 4);
    }

    #[test]
    fn test_no_ctts() {
        let stbl = atom(b"stbl", &atom(b"stts", &[0; 8]));
        let mut file = ftyp();
        file.extend(atom(b"moov", &atom(b"trak", &stbl)));
        assert_eq!(find(file).unwrap(), None);
    }

    #[test]
    fn test_ctts_in_opaque_atom_ignored() {
        let mut file = ftyp();
        file.extend(atom(b"udta", &atom(b"ctts", &[0; 4])));
        assert_eq!(find(file).unwrap(), None);
    }

    #[test]
    fn test_requires_ftyp_first() {
        let mut file = atom(b"free", &[0; 4]);
        file.extend(nested_ctts());
        assert_eq!(find(file).unwrap(), None);

        assert_eq!(find(b"plain text, not a movie at all".to_vec()).unwrap(), None);
    }

    #[test]
    fn test_truncated_header_is_not_found() {
        let mut file = ftyp();
        file.extend(nested_ctts());
        file.truncate(ftyp().len() + 8 + 8 + 3);

        assert!(find(file.clone()).is_err());
        assert_eq!(ctts_tag_offset(Cursor::new(file)), None);
    }

    #[test]
    fn test_tiny_file() {
        assert!(find(vec![0, 0, 0]).is_err());
        assert_eq!(ctts_tag_offset(Cursor::new(Vec::new())), None);
    }

    #[test]
    fn test_zero_size_is_failure() {
        let mut file = ftyp();
        file.extend([0, 0, 0, 0]);
        file.extend(b"free");
        file.extend(nested_ctts());

        assert!(matches!(find(file.clone()), Err(AtomError::InvalidSize { .. })));
        assert_eq!(ctts_tag_offset(Cursor::new(file)), None);
    }

    #[test]
    fn test_oversized_atom_stops_cleanly() {
        let mut file = ftyp();
        file.extend(0x7FFF_FFF0u32.to_be_bytes());
        file.extend(b"mdat");
        file.extend(nested_ctts());
        assert_eq!(find(file).unwrap(), None);
    }

    #[test]
    fn test_largesize_overflow_is_failure() {
        let mut file = ftyp();
        file.extend([0, 0, 0, 1]);
        file.extend(b"moov");
        file.extend(u64::MAX.to_be_bytes());
        assert!(matches!(find(file), Err(AtomError::Overflow { .. })));
    }

    #[test]
    fn test_largesize_sibling_skipped() {
        let mut file = ftyp();
        let mut mdat = vec![0, 0, 0, 1];
        mdat.extend(b"mdat");
        mdat.extend(32u64.to_be_bytes());
        mdat.extend([0xEE; 16]);
        file.extend(&mdat);
        let moov_at = file.len() as u64;
        file.extend(nested_ctts());

        assert_eq!(find(file).unwrap(), Some(moov_at + 5 * 8 + 4));
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut nested = atom(b"ctts", &[]);
        for _ in 0..(MAX_DEPTH + 4) {
            nested = atom(b"moov", &nested);
        }
        let mut file = ftyp();
        file.extend(nested);

        assert!(matches!(find(file.clone()), Err(AtomError::TooDeep { .. })));
        assert_eq!(ctts_tag_offset(Cursor::new(file)), None);
    }

    #[test]
    fn test_custom_target() {
        let mut file = ftyp();
        let moov_at = file.len() as u64;
        file.extend(atom(b"moov", &atom(b"mvhd", &[0; 4])));

        let mut walker = AtomWalker::with_target(Cursor::new(file), AtomType(*b"mvhd"));
        assert_eq!(walker.find().unwrap(), Some(moov_at + 8 + 4));
    }

    #[test]
    fn test_has_room() {
        assert!(has_room(0, 8));
        assert!(!has_room(1, 8));
        assert!(!has_room(0, 7));
        assert!(has_room(92, 100));
        assert!(!has_room(93, 100));
    }
}
