//! Container header: magic, version negotiation and the offset table.
//!
//! # Layout (generation 2)
//!
//! ```text
//! MDCDI1315_BF_1                 TERM
//! VERSION=<i64>                  TERM
//! CURRENTFORMATS=<i64>           TERM
//! SUPPORTEDHEADERVERSION=<i64>   TERM
//! DATAPOSALIGNMENT=<i64 = 8>     TERM
//! DATAPOSITIONSCOUNT=<i64 n>     TERM
//! DATAPOSITIONS=<n x i64>        TERM
//! ```
//!
//! Generation 1 has no `DATAPOSITIONSCOUNT`; the reader discovers where the
//! offset table ends by probing for the first record (see [`offsets`]).
//! Offsets are relative to the first byte after the header.

pub mod offsets;

use std::io::{Read, Seek, Write};
use crate::error::{FormatError, Result};
use crate::framing::{
    expect_literal, read_i64_field, write_i64, write_i64_field, write_terminator,
    write_token, write_value_marker, TERMINATOR,
};
use crate::record::TypeTag;
use offsets::OffsetTableLayout;

pub const MAGIC: &[u8; 14] = b"MDCDI1315_BF_1";

/// Generation written by this build.
pub const FORMAT_VERSION:           u16 = 2;
/// Generation without an explicit offset count.
pub const LEGACY_FORMAT_VERSION:    u16 = 1;
/// Newest header generation this build can read.
pub const SUPPORTED_HEADER_VERSION: u16 = 2;
/// Byte width of every offset table entry.
pub const OFFSET_ALIGNMENT:         u16 = 8;

pub(crate) const VERSION:     &str = "VERSION";
pub(crate) const FORMATS:     &str = "CURRENTFORMATS";
pub(crate) const SUPPORTED:   &str = "SUPPORTEDHEADERVERSION";
pub(crate) const ALIGNMENT:   &str = "DATAPOSALIGNMENT";
pub(crate) const COUNT:       &str = "DATAPOSITIONSCOUNT";
pub(crate) const POSITIONS:   &str = "DATAPOSITIONS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlob {
    pub format_version:           u16,
    /// Ceiling over record type tags.
    pub type_support_mask:        TypeTag,
    pub supported_header_version: u16,
    pub offset_alignment:         u16,
    /// One entry per record, in write order.
    pub offsets:                  Vec<i64>,
    /// Bytes consumed by the header; only meaningful after [`HeaderBlob::read`].
    pub header_byte_length:       u64,
}

impl HeaderBlob {
    /// A current-generation header over `offsets`.
    pub fn new(offsets: Vec<i64>) -> Self {
        Self {
            format_version:           FORMAT_VERSION,
            type_support_mask:        TypeTag::NEWEST,
            supported_header_version: SUPPORTED_HEADER_VERSION,
            offset_alignment:         OFFSET_ALIGNMENT,
            offsets,
            header_byte_length:       0,
        }
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// Serialize the header and return the number of bytes written.
    ///
    /// `format_version` selects the encoding: generation 1 omits
    /// `DATAPOSITIONSCOUNT`.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<u64> {
        if self.offset_alignment != OFFSET_ALIGNMENT {
            return Err(FormatError::Header(format!(
                "offset alignment must be {OFFSET_ALIGNMENT}, got {}",
                self.offset_alignment
            )));
        }

        w.write_all(MAGIC)?;
        let mut n = MAGIC.len() + write_terminator(w)?;
        n += write_i64_field(w, VERSION, self.format_version as i64)?;
        n += write_i64_field(w, FORMATS, self.type_support_mask as i64)?;
        n += write_i64_field(w, SUPPORTED, self.supported_header_version as i64)?;
        n += write_i64_field(w, ALIGNMENT, self.offset_alignment as i64)?;
        if self.format_version > LEGACY_FORMAT_VERSION {
            n += write_i64_field(w, COUNT, self.offsets.len() as i64)?;
        }
        n += write_token(w, POSITIONS)?;
        n += write_value_marker(w)?;
        for &offset in &self.offsets {
            n += write_i64(w, offset)?;
        }
        n += write_terminator(w)?;
        Ok(n as u64)
    }

    /// Parse and verify a header starting at the current stream position.
    ///
    /// Fails with `Versioning` when the stream's generation is newer than
    /// `supported_header_version`.
    pub fn read<R: Read + Seek>(r: &mut R, supported_header_version: u16) -> Result<Self> {
        let start = r.stream_position()?;

        // A short or mismatched magic is a header error; any other I/O
        // failure is reported as is.
        let magic_ok = expect_literal(r, MAGIC)
            .and_then(|ok| if ok { expect_literal(r, &TERMINATOR) } else { Ok(false) })
            .or_else(|e| match e {
                FormatError::Deserialization(_) => Ok(false),
                other => Err(other),
            })?;
        if !magic_ok {
            return Err(FormatError::Header("missing or invalid magic".into()));
        }

        let raw_version = read_i64_field(r, VERSION)?;
        if raw_version > supported_header_version as i64 {
            return Err(FormatError::Versioning(format!(
                "format version {raw_version} is newer than supported {supported_header_version}"
            )));
        }
        let format_version = u16::try_from(raw_version)
            .ok()
            .filter(|v| *v >= LEGACY_FORMAT_VERSION)
            .ok_or_else(|| FormatError::Header(format!("invalid format version {raw_version}")))?;

        let raw_mask = read_i64_field(r, FORMATS)?;
        let type_support_mask = match TypeTag::from_i64(raw_mask) {
            Some(tag) => tag,
            None if raw_mask > TypeTag::NEWEST as i64 => {
                return Err(FormatError::Versioning(format!(
                    "container declares type support {raw_mask}, newest known is {}",
                    TypeTag::NEWEST as u8
                )))
            }
            None => return Err(FormatError::Header(format!("invalid type support mask {raw_mask}"))),
        };

        let raw_supported = read_i64_field(r, SUPPORTED)?;
        let supported = u16::try_from(raw_supported).map_err(|_| {
            FormatError::Header(format!("invalid supported header version {raw_supported}"))
        })?;

        let raw_alignment = read_i64_field(r, ALIGNMENT)?;
        if raw_alignment != OFFSET_ALIGNMENT as i64 {
            return Err(FormatError::Deserialization(format!(
                "offset alignment must be {OFFSET_ALIGNMENT}, got {raw_alignment}"
            )));
        }

        let layout = OffsetTableLayout::for_version(format_version)?;
        let offsets = layout.read_offsets(r, OFFSET_ALIGNMENT as usize)?;
        if let Some(bad) = offsets.iter().find(|o| **o < 0) {
            return Err(FormatError::Deserialization(format!("negative record offset {bad}")));
        }

        let header_byte_length = r.stream_position()? - start;
        tracing::debug!(
            version = format_version,
            records = offsets.len(),
            header_byte_length,
            ?layout,
            "container header parsed"
        );

        Ok(Self {
            format_version,
            type_support_mask,
            supported_header_version: supported,
            offset_alignment: OFFSET_ALIGNMENT,
            offsets,
            header_byte_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    fn encode(header: &HeaderBlob) -> Vec<u8> {
        let mut buf = Vec::new();
        let n = header.write(&mut buf).unwrap();
        assert_eq!(n as usize, buf.len());
        buf
    }

    #[test]
    fn current_header_round_trips() {
        let header = HeaderBlob::new(vec![0, 120, 4096]);
        let buf = encode(&header);
        assert!(buf.starts_with(b"MDCDI1315_BF_1\x07\x0AVERSION=\x02"));

        let parsed = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap();
        assert_eq!(parsed.offsets, header.offsets);
        assert_eq!(parsed.format_version, FORMAT_VERSION);
        assert_eq!(parsed.type_support_mask, TypeTag::Object);
        assert_eq!(parsed.header_byte_length, buf.len() as u64);
    }

    #[test]
    fn empty_current_header() {
        let buf = encode(&HeaderBlob::new(Vec::new()));
        let parsed = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap();
        assert!(parsed.offsets.is_empty());
        assert_eq!(parsed.header_byte_length, buf.len() as u64);
    }

    #[test]
    fn legacy_header_omits_count() {
        let header = HeaderBlob { format_version: LEGACY_FORMAT_VERSION, ..HeaderBlob::new(vec![0]) };
        let buf = encode(&header);
        assert!(!buf.windows(COUNT.len()).any(|w| w == COUNT.as_bytes()));
    }

    #[test]
    fn bad_magic_is_header_error() {
        let mut buf = encode(&HeaderBlob::new(vec![]));
        buf[0] = b'X';
        let err = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Header);

        let err = HeaderBlob::read(&mut Cursor::new(b"MDC".to_vec()), SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Header);
    }

    struct Unreadable;

    impl Read for Unreadable {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    impl Seek for Unreadable {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> { Ok(0) }
    }

    #[test]
    fn io_failure_on_magic_is_not_a_header_error() {
        let err = HeaderBlob::read(&mut Unreadable, SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn newer_version_is_rejected() {
        let buf = encode(&HeaderBlob { format_version: 3, ..HeaderBlob::new(vec![]) });
        let err = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Versioning);

        // A reader pinned to generation 1 refuses generation 2.
        let buf = encode(&HeaderBlob::new(vec![]));
        let err = HeaderBlob::read(&mut Cursor::new(&buf), LEGACY_FORMAT_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Versioning);
    }

    #[test]
    fn wrong_alignment_is_deserialization() {
        let mut buf = encode(&HeaderBlob::new(vec![]));
        let pos = buf.windows(17).position(|w| w == b"DATAPOSALIGNMENT=").unwrap() + 17;
        buf[pos] = 4;
        let err = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn missing_field_names_the_field() {
        let buf = encode(&HeaderBlob::new(vec![]));
        let s = String::from_utf8_lossy(&buf).replace("CURRENTFORMATS", "CURRENTFORMATZ");
        let err = HeaderBlob::read(&mut Cursor::new(s.into_bytes()), SUPPORTED_HEADER_VERSION)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
        assert!(err.to_string().contains("CURRENTFORMATS"));
    }

    #[test]
    fn unknown_type_mask_is_versioning() {
        let header = HeaderBlob::new(vec![]);
        let mut buf = encode(&header);
        let pos = buf.windows(15).position(|w| w == b"CURRENTFORMATS=").unwrap() + 15;
        buf[pos] = 7;
        let err = HeaderBlob::read(&mut Cursor::new(&buf), SUPPORTED_HEADER_VERSION).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Versioning);
    }
}
