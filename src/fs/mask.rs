//! Read-time masking of the `ctts` tag

use std::ops::Range;

/// Byte written over the hidden tag
pub const MASK_BYTE: u8 = b'@';

/// Length of the masked tag
pub const TAG_LEN: u64 = 4;

/// Absolute byte range covered by the tag at `tag_offset`
pub fn tag_range(tag_offset: u64) -> Range<u64> {
    tag_offset..tag_offset.saturating_add(TAG_LEN)
}

/// Overwrite the part of `buf` that overlaps the tag.
///
/// `buf` holds the bytes read from absolute offset `read_offset`.
/// Returns how many bytes were masked.
pub fn apply_mask(buf: &mut [u8], read_offset: u64, tag_offset: u64) -> usize {
    let tag = tag_range(tag_offset);
    let read_end = read_offset.saturating_add(buf.len() as u64);

    let start = read_offset.max(tag.start);
    let end = read_end.min(tag.end);
    if end <= start {
        return 0;
    }

    let from = (start - read_offset) as usize;
    let to = (end - read_offset) as usize;
    buf[from..to].fill(MASK_BYTE);
    to - from
}
