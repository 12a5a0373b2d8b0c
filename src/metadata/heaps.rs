//! Metadata root and heap accessors (`#Strings`, `#Blob`, `#~`).
//!
//! Heaps are addressed by byte ranges into the full image so the owning
//! assembly can hand out borrowed views without self-referential structs.

use std::ops::Range;

use super::{MetadataError, MetadataResult, u16_at, u32_at};

const METADATA_SIGNATURE: u32 = 0x424A_5342; // "BSJB"

/// Parsed stream directory of one metadata root.
#[derive(Debug, Clone)]
pub struct Heaps {
    strings: Range<usize>,
    blob: Range<usize>,
    tables: Range<usize>,
}

impl Heaps {
    /// Parse the metadata root located at `root` within `data`.
    pub fn parse(data: &[u8], root: Range<usize>) -> MetadataResult<Self> {
        if u32_at(data, root.start)? != METADATA_SIGNATURE {
            return Err(MetadataError::invalid("missing BSJB metadata signature"));
        }
        let version_len = u32_at(data, root.start + 12)? as usize;
        // Flags u16 + Streams u16 follow the version string.
        let streams_off = root.start + 16 + version_len;
        let stream_count = u16_at(data, streams_off + 2)? as usize;

        let mut heaps = Heaps {
            strings: 0..0,
            blob: 0..0,
            tables: 0..0,
        };
        let mut cursor = streams_off + 4;
        for _ in 0..stream_count {
            let offset = u32_at(data, cursor)? as usize;
            let size = u32_at(data, cursor + 4)? as usize;
            let name_start = cursor + 8;
            let name_end = data
                .get(name_start..)
                .and_then(|rest| rest.iter().position(|&b| b == 0))
                .map(|p| name_start + p)
                .ok_or_else(|| MetadataError::truncated("unterminated stream name"))?;
            let name = std::str::from_utf8(&data[name_start..name_end])
                .map_err(|_| MetadataError::invalid("stream name is not UTF-8"))?;

            let start = root.start + offset;
            let end = start
                .checked_add(size)
                .filter(|&e| e <= root.end)
                .ok_or_else(|| MetadataError::truncated("stream extends past metadata"))?;
            match name {
                "#Strings" => heaps.strings = start..end,
                "#Blob" => heaps.blob = start..end,
                "#~" => heaps.tables = start..end,
                // "#US", "#GUID" and vendor streams carry nothing the
                // symbol walk needs; their indices are sized via the
                // heap-size flags alone.
                _ => {}
            }

            // Name field is null-terminated and padded to a 4-byte boundary.
            let name_len = name_end - name_start + 1;
            cursor = name_start + name_len.div_ceil(4) * 4;
        }

        if heaps.tables.is_empty() {
            return Err(MetadataError::invalid("image has no #~ table stream"));
        }
        Ok(heaps)
    }

    pub fn tables_range(&self) -> Range<usize> {
        self.tables.clone()
    }

    /// Read a `#Strings` heap entry.
    pub fn string<'a>(&self, data: &'a [u8], index: u32) -> MetadataResult<&'a str> {
        let start = self
            .strings
            .start
            .checked_add(index as usize)
            .filter(|&s| s < self.strings.end)
            .ok_or_else(|| MetadataError::invalid("string heap index out of range"))?;
        let slice = &data[start..self.strings.end];
        let end = slice
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| MetadataError::truncated("unterminated heap string"))?;
        std::str::from_utf8(&slice[..end])
            .map_err(|_| MetadataError::invalid("heap string is not UTF-8"))
    }

    /// Read a `#Blob` heap entry (length-prefixed).
    pub fn blob<'a>(&self, data: &'a [u8], index: u32) -> MetadataResult<&'a [u8]> {
        let start = self
            .blob
            .start
            .checked_add(index as usize)
            .filter(|&s| s < self.blob.end)
            .ok_or_else(|| MetadataError::invalid("blob heap index out of range"))?;
        let mut cursor = &data[start..self.blob.end];
        let len = read_compressed_u32(&mut cursor)? as usize;
        if len > cursor.len() {
            return Err(MetadataError::truncated("blob extends past heap"));
        }
        Ok(&cursor[..len])
    }
}

/// Decode an ECMA-335 compressed unsigned integer, advancing the cursor.
pub fn read_compressed_u32(cursor: &mut &[u8]) -> MetadataResult<u32> {
    let first = *cursor
        .first()
        .ok_or_else(|| MetadataError::truncated("compressed integer"))?;
    if first & 0x80 == 0 {
        *cursor = &cursor[1..];
        Ok(first as u32)
    } else if first & 0xC0 == 0x80 {
        if cursor.len() < 2 {
            return Err(MetadataError::truncated("compressed integer"));
        }
        let value = (((first & 0x3F) as u32) << 8) | cursor[1] as u32;
        *cursor = &cursor[2..];
        Ok(value)
    } else if first & 0xE0 == 0xC0 {
        if cursor.len() < 4 {
            return Err(MetadataError::truncated("compressed integer"));
        }
        let value = (((first & 0x1F) as u32) << 24)
            | ((cursor[1] as u32) << 16)
            | ((cursor[2] as u32) << 8)
            | cursor[3] as u32;
        *cursor = &cursor[4..];
        Ok(value)
    } else {
        Err(MetadataError::invalid("malformed compressed integer"))
    }
}

/// Encode an ECMA-335 compressed unsigned integer. Inverse of
/// [`read_compressed_u32`]; exposed for fixture construction.
pub fn write_compressed_u32(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    }
}
