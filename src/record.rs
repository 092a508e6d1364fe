//! Resource records: one named, typed value framed as
//!
//! ```text
//! RESOURCE\x04
//! RESOURCENAME=<utf8>            TERM
//! HEADERVERSION=<i64>            TERM
//! DOTNETTYPE=<utf8 type name>    TERM
//! RESOURCETYPE=<i64 tag>         TERM
//! RESOURCESIZE=<i64 len>         TERM
//! VALUE=<len raw bytes>          TERM
//! ```

use std::io::{Read, Seek, Write};
use crate::error::{FormatError, Result};
use crate::formatter::{ObjectFormatter, ObjectValue};
use crate::framing::{
    expect_field, expect_literal, expect_terminator, read_i64_field, read_text_field,
    write_i64_field, write_terminator, write_text_field, write_token, write_value_marker,
};
use crate::header::FORMAT_VERSION;

/// Literal opening every record.
pub const RESOURCE_START: &[u8; 9] = b"RESOURCE\x04";

/// Declared type name written for `String` records.
pub const STRING_TYPE_NAME: &str = "System.String";
/// Declared type name written for `ByteArray` records.
pub const BYTE_ARRAY_TYPE_NAME: &str = "System.Byte[]";

const NAME:    &str = "RESOURCENAME";
const VERSION: &str = "HEADERVERSION";
const TYPE:    &str = "DOTNETTYPE";
const TAG:     &str = "RESOURCETYPE";
const SIZE:    &str = "RESOURCESIZE";
const VALUE:   &str = "VALUE";

// ── Types ─────────────────────────────────────────────────────────────────────

/// How a record's payload is decoded.  Ordered: the header's type-support
/// mask is a ceiling over these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TypeTag {
    String    = 0,
    ByteArray = 1,
    Object    = 2,
}

impl TypeTag {
    /// Highest tag this build can write and decode.
    pub const NEWEST: TypeTag = TypeTag::Object;

    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(TypeTag::String),
            1 => Some(TypeTag::ByteArray),
            2 => Some(TypeTag::Object),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::String    => "String",
            TypeTag::ByteArray => "ByteArray",
            TypeTag::Object    => "Object",
        }
    }
}

/// A decoded record value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    String(String),
    ByteArray(Vec<u8>),
    Object(ObjectValue),
}

impl ResourceValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            ResourceValue::String(_)    => TypeTag::String,
            ResourceValue::ByteArray(_) => TypeTag::ByteArray,
            ResourceValue::Object(_)    => TypeTag::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResourceValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResourceValue::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            ResourceValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<&str> for ResourceValue {
    fn from(s: &str) -> Self { ResourceValue::String(s.to_owned()) }
}

impl From<String> for ResourceValue {
    fn from(s: String) -> Self { ResourceValue::String(s) }
}

impl From<Vec<u8>> for ResourceValue {
    fn from(b: Vec<u8>) -> Self { ResourceValue::ByteArray(b) }
}

impl From<ObjectValue> for ResourceValue {
    fn from(o: ObjectValue) -> Self { ResourceValue::Object(o) }
}

/// One record as read back from a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub name:               String,
    pub type_tag:           TypeTag,
    pub declared_type_name: String,
    pub payload_length:     i64,
    /// Raw payload exactly as stored.
    pub payload:            Vec<u8>,
    pub value:              ResourceValue,
    /// Bytes from the start literal through the final terminator.
    pub bytes_consumed:     u64,
}

// ── Names ─────────────────────────────────────────────────────────────────────

/// Names must be non-empty and free of control bytes (which covers both
/// terminator bytes) and of `=`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FormatError::InvalidName("name is empty".into()));
    }
    if let Some(c) = name.chars().find(|c| c.is_control() || *c == '=') {
        return Err(FormatError::InvalidName(format!("{name:?} contains {c:?}")));
    }
    Ok(())
}

// ── Encode ────────────────────────────────────────────────────────────────────

/// Payload bytes and declared type name for `value`.
pub fn encode_value(
    value:     &ResourceValue,
    formatter: &dyn ObjectFormatter,
) -> Result<(String, Vec<u8>)> {
    Ok(match value {
        ResourceValue::String(s)    => (STRING_TYPE_NAME.to_owned(), s.as_bytes().to_vec()),
        ResourceValue::ByteArray(b) => (BYTE_ARRAY_TYPE_NAME.to_owned(), b.clone()),
        ResourceValue::Object(o)    => (o.type_name.clone(), formatter.serialize(o)?),
    })
}

/// Write one record and return the number of bytes emitted.
pub fn write_record<W: Write>(
    w:                  &mut W,
    name:               &str,
    type_tag:           TypeTag,
    declared_type_name: &str,
    payload:            &[u8],
) -> Result<u64> {
    validate_name(name)?;
    if declared_type_name.chars().any(char::is_control) {
        return Err(FormatError::Serialization(format!(
            "declared type name {declared_type_name:?} contains control characters"
        )));
    }

    let mut n = 0usize;
    w.write_all(RESOURCE_START)?;
    n += RESOURCE_START.len();
    n += write_text_field(w, NAME, name)?;
    n += write_i64_field(w, VERSION, FORMAT_VERSION as i64)?;
    n += write_text_field(w, TYPE, declared_type_name)?;
    n += write_i64_field(w, TAG, type_tag as i64)?;
    n += write_i64_field(w, SIZE, payload.len() as i64)?;
    n += write_token(w, VALUE)?;
    n += write_value_marker(w)?;
    w.write_all(payload)?;
    n += payload.len();
    n += write_terminator(w)?;

    tracing::trace!(name, tag = type_tag.name(), bytes = n, "record encoded");
    Ok(n as u64)
}

// ── Decode ────────────────────────────────────────────────────────────────────

/// Decode the record starting at absolute stream position `at_offset`.
///
/// Records whose tag exceeds `type_ceiling` are rejected, as are records
/// whose declared size disagrees with the framing.  A record `HEADERVERSION`
/// above `version_ceiling` fails with `Versioning`.
pub fn read_record<R: Read + Seek>(
    r:               &mut R,
    at_offset:       u64,
    type_ceiling:    TypeTag,
    version_ceiling: u16,
    formatter:       &dyn ObjectFormatter,
) -> Result<ResourceRecord> {
    r.seek(std::io::SeekFrom::Start(at_offset))?;

    if !expect_literal(r, RESOURCE_START)? {
        return Err(FormatError::Deserialization(format!(
            "no resource start literal at offset {at_offset}"
        )));
    }

    let name = read_text_field(r, NAME)?;
    validate_name(&name).map_err(|e| FormatError::Deserialization(e.to_string()))?;

    let version = read_i64_field(r, VERSION)?;
    if version > version_ceiling as i64 {
        return Err(FormatError::Versioning(format!(
            "record {name:?} has header version {version}, newest supported is {version_ceiling}"
        )));
    }
    if version < 1 {
        return Err(FormatError::Deserialization(format!(
            "record {name:?} has invalid header version {version}"
        )));
    }

    let declared_type_name = read_text_field(r, TYPE)?;

    let raw_tag = read_i64_field(r, TAG)?;
    let type_tag = match TypeTag::from_i64(raw_tag) {
        Some(tag) if tag <= type_ceiling => tag,
        _ => {
            return Err(FormatError::Deserialization(format!(
                "record {name:?} has type tag {raw_tag}, ceiling is {}",
                type_ceiling as u8
            )))
        }
    };

    let payload_length = read_i64_field(r, SIZE)?;
    if payload_length < 0 {
        return Err(FormatError::Deserialization(format!(
            "record {name:?} declares negative size {payload_length}"
        )));
    }

    expect_field(r, VALUE)?;
    let mut payload = Vec::new();
    r.by_ref().take(payload_length as u64).read_to_end(&mut payload)?;
    if payload.len() as i64 != payload_length {
        return Err(FormatError::Deserialization(format!(
            "record {name:?} truncated: {} of {payload_length} payload bytes",
            payload.len()
        )));
    }
    expect_terminator(r, VALUE).map_err(|e| match e {
        FormatError::Deserialization(_) => FormatError::Deserialization(format!(
            "record {name:?}: payload does not end at declared size {payload_length}"
        )),
        other => other,
    })?;

    let value = match type_tag {
        TypeTag::String => ResourceValue::String(String::from_utf8(payload.clone()).map_err(|_| {
            FormatError::Deserialization(format!("record {name:?} is not valid UTF-8"))
        })?),
        TypeTag::ByteArray => ResourceValue::ByteArray(payload.clone()),
        TypeTag::Object => ResourceValue::Object(formatter.deserialize(&payload, &declared_type_name)?),
    };

    let bytes_consumed = r.stream_position()? - at_offset;
    tracing::trace!(name = %name, tag = type_tag.name(), bytes_consumed, "record decoded");

    Ok(ResourceRecord {
        name,
        type_tag,
        declared_type_name,
        payload_length,
        payload,
        value,
        bytes_consumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::formatter::JsonFormatter;
    use crate::header::{LEGACY_FORMAT_VERSION, SUPPORTED_HEADER_VERSION};
    use std::io::Cursor;

    fn encoded(name: &str, value: &ResourceValue) -> Vec<u8> {
        let (declared, payload) = encode_value(value, &JsonFormatter).unwrap();
        let mut buf = Vec::new();
        let n = write_record(&mut buf, name, value.type_tag(), &declared, &payload).unwrap();
        assert_eq!(n as usize, buf.len());
        buf
    }

    #[test]
    fn string_record_layout() {
        let buf = encoded("greeting", &"hello".into());
        assert!(buf.starts_with(b"RESOURCE\x04RESOURCENAME=greeting\x07\x0A"));
        assert!(buf.ends_with(b"VALUE=hello\x07\x0A"));
    }

    #[test]
    fn byte_payload_may_contain_terminators() {
        let value = ResourceValue::ByteArray(vec![0x07, 0x0A, 0x07, 0x0A, b'=']);
        let buf = encoded("blob", &value);
        let rec = read_record(&mut Cursor::new(&buf), 0, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap();
        assert_eq!(rec.value, value);
        assert_eq!(rec.declared_type_name, BYTE_ARRAY_TYPE_NAME);
        assert_eq!(rec.bytes_consumed, buf.len() as u64);
    }

    #[test]
    fn object_record_uses_formatter() {
        let obj = ObjectValue::new("Config", serde_json::json!({"retries": 3}));
        let buf = encoded("cfg", &obj.clone().into());
        let rec = read_record(&mut Cursor::new(&buf), 0, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap();
        assert_eq!(rec.type_tag, TypeTag::Object);
        assert_eq!(rec.value, ResourceValue::Object(obj));
    }

    #[test]
    fn decodes_at_nonzero_offset() {
        let mut buf = b"junk".to_vec();
        buf.extend(encoded("x", &"y".into()));
        let rec = read_record(&mut Cursor::new(&buf), 4, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap();
        assert_eq!(rec.name, "x");
        assert_eq!(rec.bytes_consumed, buf.len() as u64 - 4);
    }

    #[test]
    fn tag_above_ceiling_is_rejected() {
        let buf = encoded("blob", &ResourceValue::ByteArray(vec![1]));
        let err = read_record(&mut Cursor::new(&buf), 0, TypeTag::String, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn size_mismatch_is_detected() {
        let mut buf = encoded("s", &"abcd".into());
        // RESOURCESIZE=4 -> 3: the terminator check after VALUE must fail.
        let pos = buf.windows(13).position(|w| w == b"RESOURCESIZE=").unwrap() + 13;
        buf[pos] = 3;
        let err = read_record(&mut Cursor::new(&buf), 0, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn newer_record_version_is_versioning() {
        let mut buf = encoded("s", &"v".into());
        let pos = buf.windows(14).position(|w| w == b"HEADERVERSION=").unwrap() + 14;
        buf[pos] = 9;
        let err = read_record(&mut Cursor::new(&buf), 0, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Versioning);
    }

    #[test]
    fn record_version_ceiling_is_caller_supplied() {
        let buf = encoded("s", &"v".into());
        let err = read_record(&mut Cursor::new(&buf), 0, TypeTag::NEWEST, LEGACY_FORMAT_VERSION, &JsonFormatter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Versioning);

        let mut legacy = buf.clone();
        let pos = legacy.windows(14).position(|w| w == b"HEADERVERSION=").unwrap() + 14;
        legacy[pos] = 1;
        let rec = read_record(&mut Cursor::new(&legacy), 0, TypeTag::NEWEST, LEGACY_FORMAT_VERSION, &JsonFormatter).unwrap();
        assert_eq!(rec.value.as_str(), Some("v"));
    }

    #[test]
    fn truncated_payload_fails() {
        let buf = encoded("s", &"a long enough payload".into());
        let cut = &buf[..buf.len() - 8];
        let err = read_record(&mut Cursor::new(cut), 0, TypeTag::NEWEST, SUPPORTED_HEADER_VERSION, &JsonFormatter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("strings.greeting").is_ok());
        assert_eq!(validate_name("").unwrap_err().kind(), ErrorKind::InvalidName);
        assert_eq!(validate_name("a=b").unwrap_err().kind(), ErrorKind::InvalidName);
        assert_eq!(validate_name("bell\x07").unwrap_err().kind(), ErrorKind::InvalidName);
        assert_eq!(validate_name("line\n").unwrap_err().kind(), ErrorKind::InvalidName);
    }
}
