//! Offset-table decoding, one strategy per header generation.
//!
//! | Generation | Strategy | Cost |
//! |------------|----------|------|
//! | 1 | [`OffsetTableLayout::Scanned`]: read 8-byte slots until the first record start appears | one lookahead per slot |
//! | 2 | [`OffsetTableLayout::Counted`]: read `DATAPOSITIONSCOUNT`, then the whole table at once | one read |
//!
//! Both return the same normalized offset list and leave the stream at the
//! first byte of the record region.
//!
//! The generation 1 lookahead is a heuristic: an offset whose bytes happen to
//! spell a terminator followed by `RESOURCE\x04` ends the table early.  The
//! format gives no way to tell the two apart, so the heuristic is kept as-is.

use std::io::{self, Read, Seek, SeekFrom};
use byteorder::{ByteOrder, LittleEndian};
use crate::error::{FormatError, Result};
use crate::framing::{expect_field, expect_terminator, read_i64_field, TERMINATOR};
use crate::record::RESOURCE_START;
use super::{COUNT, LEGACY_FORMAT_VERSION, POSITIONS};

const LOOKAHEAD_LEN: usize = TERMINATOR.len() + RESOURCE_START.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetTableLayout {
    /// Generation 1: no stored count.
    Scanned,
    /// Generation 2: count field precedes the table.
    Counted,
}

impl OffsetTableLayout {
    pub fn for_version(format_version: u16) -> Result<Self> {
        match format_version {
            LEGACY_FORMAT_VERSION => Ok(OffsetTableLayout::Scanned),
            2 => Ok(OffsetTableLayout::Counted),
            v => Err(FormatError::Versioning(format!("no offset table layout for version {v}"))),
        }
    }

    /// Read the offset table, positioned just before its field name(s).
    pub fn read_offsets<R: Read + Seek>(self, r: &mut R, alignment: usize) -> Result<Vec<i64>> {
        match self {
            OffsetTableLayout::Scanned => scan_offsets(r, alignment),
            OffsetTableLayout::Counted => read_counted(r, alignment),
        }
    }
}

fn read_counted<R: Read + Seek>(r: &mut R, alignment: usize) -> Result<Vec<i64>> {
    let count = read_i64_field(r, COUNT)?;
    if count < 0 {
        return Err(FormatError::Deserialization(format!("negative offset count {count}")));
    }
    expect_field(r, POSITIONS)?;

    let table_len = (count as u64)
        .checked_mul(alignment as u64)
        .ok_or_else(|| FormatError::Deserialization(format!("offset count {count} overflows")))?;
    let mut table = Vec::new();
    r.by_ref().take(table_len).read_to_end(&mut table)?;
    if table.len() as u64 != table_len {
        return Err(FormatError::Deserialization(format!(
            "offset table truncated: {} of {table_len} bytes",
            table.len()
        )));
    }
    expect_terminator(r, POSITIONS)?;

    Ok(table.chunks_exact(alignment).map(LittleEndian::read_i64).collect())
}

fn scan_offsets<R: Read + Seek>(r: &mut R, alignment: usize) -> Result<Vec<i64>> {
    expect_field(r, POSITIONS)?;

    let mut offsets = Vec::new();
    let mut window = [0u8; LOOKAHEAD_LEN];
    let mut slot = vec![0u8; alignment];
    loop {
        let pos = r.stream_position()?;
        let filled = fill(r, &mut window)?;

        if filled == LOOKAHEAD_LEN && window[..2] == TERMINATOR && window[2..] == RESOURCE_START[..] {
            r.seek(SeekFrom::Start(pos + TERMINATOR.len() as u64))?;
            return Ok(offsets);
        }
        // Terminator then end of stream: a container without records.
        if offsets.is_empty() && filled == TERMINATOR.len() && window[..2] == TERMINATOR {
            return Ok(offsets);
        }

        r.seek(SeekFrom::Start(pos))?;
        r.read_exact(&mut slot).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::Deserialization(
                "legacy offset table: end of stream before first record".into(),
            ),
            _ => FormatError::Io(e),
        })?;
        offsets.push(LittleEndian::read_i64(&slot));
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    fn legacy_table(offsets: &[i64], tail: &[u8]) -> Vec<u8> {
        let mut buf = b"DATAPOSITIONS=".to_vec();
        for o in offsets {
            buf.extend_from_slice(&o.to_le_bytes());
        }
        buf.extend_from_slice(&TERMINATOR);
        buf.extend_from_slice(tail);
        buf
    }

    #[test]
    fn scan_stops_at_first_record() {
        let buf = legacy_table(&[0, 77, 300], b"RESOURCE\x04RESOURCENAME=a");
        let mut r = Cursor::new(&buf);
        let offsets = OffsetTableLayout::Scanned.read_offsets(&mut r, 8).unwrap();
        assert_eq!(offsets, vec![0, 77, 300]);
        assert_eq!(&buf[r.position() as usize..][..9], RESOURCE_START);
    }

    #[test]
    fn scan_of_empty_table() {
        let buf = legacy_table(&[], b"");
        let mut r = Cursor::new(&buf);
        assert!(OffsetTableLayout::Scanned.read_offsets(&mut r, 8).unwrap().is_empty());
        assert_eq!(r.position(), buf.len() as u64);
    }

    #[test]
    fn scan_without_record_start_fails() {
        let buf = legacy_table(&[0, 40], b"no records here");
        let err = OffsetTableLayout::Scanned.read_offsets(&mut Cursor::new(&buf), 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn scan_misfires_on_lookalike_offset() {
        // Known format ambiguity: an offset whose bytes read as TERM + "RESOUR",
        // followed by one starting with "CE\x04", ends the table early.
        let first  = i64::from_le_bytes(*b"\x07\x0ARESOUR");
        let second = i64::from_le_bytes(*b"CE\x04\0\0\0\0\0");
        let buf = legacy_table(&[first, second], b"RESOURCE\x04");
        let offsets = OffsetTableLayout::Scanned.read_offsets(&mut Cursor::new(&buf), 8).unwrap();
        assert!(offsets.is_empty());
    }

    #[test]
    fn counted_table_reads_exactly_n() {
        let mut buf = b"DATAPOSITIONSCOUNT=".to_vec();
        buf.extend_from_slice(&2i64.to_le_bytes());
        buf.extend_from_slice(&TERMINATOR);
        buf.extend(legacy_table(&[0, 55], b"RESOURCE\x04"));
        let mut r = Cursor::new(&buf);
        assert_eq!(OffsetTableLayout::Counted.read_offsets(&mut r, 8).unwrap(), vec![0, 55]);
        assert_eq!(&buf[r.position() as usize..], RESOURCE_START);
    }

    #[test]
    fn counted_table_truncated() {
        let mut buf = b"DATAPOSITIONSCOUNT=".to_vec();
        buf.extend_from_slice(&5i64.to_le_bytes());
        buf.extend_from_slice(&TERMINATOR);
        buf.extend(legacy_table(&[0, 55], b""));
        let err = OffsetTableLayout::Counted.read_offsets(&mut Cursor::new(&buf), 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn unknown_generation() {
        assert_eq!(OffsetTableLayout::for_version(1).unwrap(), OffsetTableLayout::Scanned);
        assert_eq!(OffsetTableLayout::for_version(2).unwrap(), OffsetTableLayout::Counted);
        assert_eq!(OffsetTableLayout::for_version(9).unwrap_err().kind(), ErrorKind::Versioning);
    }
}
