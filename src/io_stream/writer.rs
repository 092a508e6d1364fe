use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{FormatError, Result};
use crate::formatter::{ObjectFormatter, ObjectValue};
use crate::header::HeaderBlob;
use crate::record::{
    encode_value, validate_name, write_record, ResourceValue, TypeTag, BYTE_ARRAY_TYPE_NAME,
    STRING_TYPE_NAME,
};

// ── Options ──────────────────────────────────────────────────────────────────

/// Where records are staged until the header can be written.
#[derive(Debug, Clone)]
pub enum ScratchStorage {
    /// A growable in-memory buffer.
    Memory,
    /// An anonymous temporary file, removed when the writer is dropped.
    /// `None` uses the system temp directory.
    TempFile { dir: Option<PathBuf> },
}

impl Default for ScratchStorage {
    fn default() -> Self {
        ScratchStorage::TempFile { dir: None }
    }
}

/// Configuration for [`ContainerWriter::with_options`].
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub scratch:    ScratchStorage,
    /// When set, [`ContainerWriter::close`] hands the destination back
    /// instead of dropping it.
    pub leave_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Empty,
    Accumulating,
    Finalized,
}

trait Scratch: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> Scratch for T {}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write + Seek> {
    destination: Option<W>,
    scratch:     Box<dyn Scratch>,
    /// Start of each record, relative to the scratch buffer.
    offsets:     Vec<i64>,
    scratch_len: u64,
    /// Destination position the container starts at.
    base:        u64,
    state:       WriterState,
    leave_open:  bool,
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(destination: W) -> Result<Self> {
        Self::with_options(destination, WriterOptions::default())
    }

    pub fn with_options(mut destination: W, opts: WriterOptions) -> Result<Self> {
        let base = destination.stream_position()?;
        let scratch: Box<dyn Scratch> = match opts.scratch {
            ScratchStorage::Memory                => Box::new(Cursor::new(Vec::new())),
            ScratchStorage::TempFile { dir: None } => Box::new(tempfile::tempfile()?),
            ScratchStorage::TempFile { dir: Some(dir) } => Box::new(tempfile::tempfile_in(dir)?),
        };
        Ok(Self {
            destination: Some(destination),
            scratch,
            offsets: Vec::new(),
            scratch_len: 0,
            base,
            state: WriterState::Empty,
            leave_open: opts.leave_open,
        })
    }

    pub fn state(&self) -> WriterState { self.state }

    pub fn len(&self) -> usize { self.offsets.len() }

    pub fn is_empty(&self) -> bool { self.offsets.is_empty() }

    /// Record offsets collected so far, relative to the record region.
    pub fn offsets(&self) -> &[i64] { &self.offsets }

    // ── Ingestion ────────────────────────────────────────────────────────────

    pub fn add_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.append(name, TypeTag::String, STRING_TYPE_NAME, value.as_bytes())
    }

    pub fn add_bytes(&mut self, name: &str, value: &[u8]) -> Result<()> {
        self.append(name, TypeTag::ByteArray, BYTE_ARRAY_TYPE_NAME, value)
    }

    /// Serialize `value` with `formatter` and store it as an `Object` record.
    pub fn add_object(
        &mut self,
        name:      &str,
        value:     &ObjectValue,
        formatter: &dyn ObjectFormatter,
    ) -> Result<()> {
        validate_name(name)?;
        let payload = formatter.serialize(value)?;
        self.append(name, TypeTag::Object, &value.type_name, &payload)
    }

    pub fn add_value(
        &mut self,
        name:      &str,
        value:     &ResourceValue,
        formatter: &dyn ObjectFormatter,
    ) -> Result<()> {
        validate_name(name)?;
        let (declared, payload) = encode_value(value, formatter)?;
        self.append(name, value.type_tag(), &declared, &payload)
    }

    fn append(&mut self, name: &str, tag: TypeTag, declared: &str, payload: &[u8]) -> Result<()> {
        // A failed earlier write may have left bytes past `scratch_len`;
        // they are overwritten here and never copied out.
        let start = self.scratch.seek(SeekFrom::Start(self.scratch_len))?;
        let written = write_record(&mut self.scratch, name, tag, declared, payload)?;
        let end = self.scratch.stream_position()?;
        debug_assert_eq!(end - start, written);

        self.offsets.push(start as i64);
        self.scratch_len = end;
        self.state = WriterState::Accumulating;
        Ok(())
    }

    // ── Finalization ─────────────────────────────────────────────────────────

    /// Write the header followed by every staged record to the destination.
    ///
    /// Always rewrites from the position the writer was opened at, so calling
    /// it again (after more `add` calls or none) replaces the previous output.
    /// Returns the total container length.
    pub fn finalize(&mut self) -> Result<u64> {
        let dest = self.destination.as_mut()
            .ok_or_else(|| FormatError::Usage("writer is closed".into()))?;

        let header = HeaderBlob::new(self.offsets.clone());
        dest.seek(SeekFrom::Start(self.base))?;
        let header_len = header.write(dest)?;

        self.scratch.seek(SeekFrom::Start(0))?;
        let copied = io::copy(&mut (&mut self.scratch).take(self.scratch_len), dest)?;
        if copied != self.scratch_len {
            return Err(FormatError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("scratch buffer yielded {copied} of {} bytes", self.scratch_len),
            )));
        }
        dest.flush()?;

        self.state = WriterState::Finalized;
        tracing::debug!(
            records = self.offsets.len(),
            header_len,
            total = header_len + copied,
            "container finalized"
        );
        Ok(header_len + copied)
    }

    /// Finalize if needed, flush, and release the scratch storage.
    ///
    /// Returns the destination when the writer was opened with `leave_open`.
    pub fn close(mut self) -> Result<Option<W>> {
        if self.state != WriterState::Finalized {
            if let Err(e) = self.finalize() {
                // Drop must not finalize a second time.
                self.destination = None;
                return Err(e);
            }
        }
        let mut dest = self.destination.take()
            .ok_or_else(|| FormatError::Usage("writer is closed".into()))?;
        dest.flush()?;
        Ok(if self.leave_open { Some(dest) } else { None })
    }
}

impl<W: Write + Seek> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if self.destination.is_some() && self.state != WriterState::Finalized {
            if let Err(e) = self.finalize() {
                tracing::warn!(error = %e, "container writer dropped without close; finalize failed");
            }
        }
    }
}
