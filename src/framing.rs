//! Field framing shared by the header and record grammars.
//!
//! Every field is written as `NAME` `=` value `TERMINATOR`, where the
//! terminator is the two bytes `0x07 0x0A`.  Numeric values are 8 raw bytes,
//! little-endian; textual values are UTF-8 and may not contain the
//! terminator.  Byte payloads are length-prefixed elsewhere and may contain
//! anything.

use std::io::{Read, Write};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::error::{FormatError, Result};

/// Two-byte sequence closing every header and record field.
pub const TERMINATOR: [u8; 2] = [0x07, 0x0A];
/// Separates a field name from its value.
pub const VALUE_MARKER: u8 = b'=';
/// Width in bytes of every numeric field.
pub const I64_WIDTH: usize = 8;

// ── Writing ──────────────────────────────────────────────────────────────────

pub fn write_token<W: Write>(w: &mut W, text: &str) -> Result<usize> {
    w.write_all(text.as_bytes())?;
    Ok(text.len())
}

pub fn write_terminator<W: Write>(w: &mut W) -> Result<usize> {
    w.write_all(&TERMINATOR)?;
    Ok(TERMINATOR.len())
}

pub fn write_value_marker<W: Write>(w: &mut W) -> Result<usize> {
    w.write_u8(VALUE_MARKER)?;
    Ok(1)
}

pub fn write_i64<W: Write>(w: &mut W, n: i64) -> Result<usize> {
    w.write_i64::<LittleEndian>(n)?;
    Ok(I64_WIDTH)
}

/// `NAME=` followed by `text` and a terminator.
pub fn write_text_field<W: Write>(w: &mut W, name: &str, text: &str) -> Result<usize> {
    Ok(write_token(w, name)?
        + write_value_marker(w)?
        + write_token(w, text)?
        + write_terminator(w)?)
}

/// `NAME=` followed by a raw i64 and a terminator.
pub fn write_i64_field<W: Write>(w: &mut W, name: &str, n: i64) -> Result<usize> {
    Ok(write_token(w, name)? + write_value_marker(w)? + write_i64(w, n)? + write_terminator(w)?)
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read `literal.len()` bytes and compare them with `literal`.
///
/// A short stream is an error, not a mismatch.
pub fn expect_literal<R: Read>(r: &mut R, literal: &[u8]) -> Result<bool> {
    let mut buf = vec![0u8; literal.len()];
    r.read_exact(&mut buf)
        .map_err(|e| FormatError::from_read(e, &String::from_utf8_lossy(literal)))?;
    Ok(buf == literal)
}

/// Consume `NAME=`, failing with a `Deserialization` error naming the field.
pub fn expect_field<R: Read>(r: &mut R, name: &str) -> Result<()> {
    let mut literal = Vec::with_capacity(name.len() + 1);
    literal.extend_from_slice(name.as_bytes());
    literal.push(VALUE_MARKER);
    if !expect_literal(r, &literal)? {
        return Err(FormatError::Deserialization(format!("expected field {name}=")));
    }
    Ok(())
}

pub fn expect_terminator<R: Read>(r: &mut R, after: &str) -> Result<()> {
    if !expect_literal(r, &TERMINATOR)? {
        return Err(FormatError::Deserialization(format!("missing terminator after {after}")));
    }
    Ok(())
}

/// Scan forward to the next terminator and return everything before it.
/// The stream is left just past the terminator.
pub fn read_until_terminator<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let byte = r.read_u8().map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FormatError::Deserialization(
                "end of stream before field terminator".into(),
            ),
            _ => FormatError::Io(e),
        })?;
        if byte == TERMINATOR[1] && out.last() == Some(&TERMINATOR[0]) {
            out.pop();
            return Ok(out);
        }
        out.push(byte);
    }
}

/// Read 8 raw bytes as an i64, then the terminator that must follow.
pub fn read_i64<R: Read>(r: &mut R) -> Result<i64> {
    let n = r.read_i64::<LittleEndian>().map_err(|e| FormatError::from_read(e, "i64 field"))?;
    expect_terminator(r, "i64 field")?;
    Ok(n)
}

pub fn read_text_field<R: Read>(r: &mut R, name: &str) -> Result<String> {
    expect_field(r, name)?;
    let raw = read_until_terminator(r)?;
    String::from_utf8(raw)
        .map_err(|_| FormatError::Deserialization(format!("field {name} is not valid UTF-8")))
}

pub fn read_i64_field<R: Read>(r: &mut R, name: &str) -> Result<i64> {
    expect_field(r, name)?;
    read_i64(r).map_err(|e| match e {
        FormatError::Deserialization(msg) => FormatError::Deserialization(format!("{name}: {msg}")),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn text_field_layout() {
        let mut buf = Vec::new();
        let n = write_text_field(&mut buf, "RESOURCENAME", "abc").unwrap();
        assert_eq!(buf, b"RESOURCENAME=abc\x07\x0A");
        assert_eq!(n, buf.len());
    }

    #[test]
    fn i64_field_is_little_endian() {
        let mut buf = Vec::new();
        write_i64_field(&mut buf, "VERSION", 2).unwrap();
        assert_eq!(buf, b"VERSION=\x02\0\0\0\0\0\0\0\x07\x0A");
        assert_eq!(read_i64_field(&mut Cursor::new(buf), "VERSION").unwrap(), 2);
    }

    #[test]
    fn read_until_terminator_keeps_lone_bell_bytes() {
        let mut r = Cursor::new(b"a\x07b\x0Ac\x07\x0Arest".to_vec());
        assert_eq!(read_until_terminator(&mut r).unwrap(), b"a\x07b\x0Ac");
        assert_eq!(r.position(), 7);
    }

    #[test]
    fn missing_terminator_is_deserialization() {
        let err = read_until_terminator(&mut Cursor::new(b"never ends".to_vec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn wrong_field_name_is_reported() {
        let err = read_i64_field(&mut Cursor::new(b"VERSIOM=\0\0\0\0\0\0\0\0\x07\x0A".to_vec()), "VERSION")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
        assert!(err.to_string().contains("VERSION="));
    }

    #[test]
    fn i64_without_terminator_fails() {
        let err = read_i64(&mut Cursor::new(b"\x01\0\0\0\0\0\0\0\x07\x0B".to_vec())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn short_literal_is_an_error_not_a_mismatch() {
        let err = expect_literal(&mut Cursor::new(b"VER".to_vec()), b"VERSION=").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }
}
