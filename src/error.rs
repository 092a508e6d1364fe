//! Error taxonomy shared by every layer of the codec.
//!
//! Each variant carries a human-readable detail string.  Truncation is never
//! reported as [`FormatError::Io`]: the framing layer converts
//! `UnexpectedEof` into [`FormatError::Deserialization`].

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    /// Magic, a required header field, or the header shape is malformed.
    #[error("Header error: {0}")]
    Header(String),
    /// A declared format or header version is newer than this build supports.
    #[error("Unsupported version: {0}")]
    Versioning(String),
    /// Framing mismatch, truncated stream, or type tag above the ceiling.
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
    /// The object formatter could not encode a value.
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Invalid resource name: {0}")]
    InvalidName(String),
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Taxonomy kind of a [`FormatError`], without the detail text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Header,
    Versioning,
    Deserialization,
    Serialization,
    InvalidName,
    Usage,
    Io,
}

impl FormatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::Header(_)          => ErrorKind::Header,
            FormatError::Versioning(_)      => ErrorKind::Versioning,
            FormatError::Deserialization(_) => ErrorKind::Deserialization,
            FormatError::Serialization(_)   => ErrorKind::Serialization,
            FormatError::InvalidName(_)     => ErrorKind::InvalidName,
            FormatError::Usage(_)           => ErrorKind::Usage,
            FormatError::Io(_)              => ErrorKind::Io,
        }
    }

    /// Map a read-side I/O error, turning end-of-stream into a
    /// `Deserialization` error that names what was being read.
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::Deserialization(format!("stream truncated while reading {what}"))
        } else {
            FormatError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
