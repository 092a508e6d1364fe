//! High-level [`ResourceFile`] API — containers on disk.
//!
//! ```no_run
//! use resbin::container::ResourceFile;
//! use resbin::io_stream::WriterOptions;
//!
//! // Write
//! let mut rf = ResourceFile::create("strings.res", WriterOptions::default())?;
//! rf.add_string("greeting", "hello")?;
//! rf.add_bytes("logo", &[0x89, 0x50, 0x4E, 0x47])?;
//! rf.close()?;
//!
//! // Read
//! let mut rf = ResourceFile::open("strings.res")?;
//! let value = rf.get("greeting")?;
//! assert_eq!(value.and_then(|v| v.as_str().map(str::to_owned)).as_deref(), Some("hello"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{FormatError, Result};
use crate::formatter::{JsonFormatter, ObjectFormatter, ObjectValue};
use crate::header::HeaderBlob;
use crate::io_stream::{ContainerReader, ContainerWriter, ReaderOptions, WriterOptions};
use crate::record::{ResourceRecord, ResourceValue, TypeTag};

// ── EntryInfo ─────────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by [`ResourceFile::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub index:              usize,
    pub name:               String,
    pub type_tag:           TypeTag,
    pub declared_type_name: String,
    /// Payload length in bytes.
    pub size:               u64,
}

impl EntryInfo {
    fn from_record(index: usize, r: &ResourceRecord) -> Self {
        EntryInfo {
            index,
            name:               r.name.clone(),
            type_tag:           r.type_tag,
            declared_type_name: r.declared_type_name.clone(),
            size:               r.payload_length as u64,
        }
    }
}

// ── FileMode ──────────────────────────────────────────────────────────────────

enum FileMode {
    Read(ContainerReader<File>),
    Write(ContainerWriter<File>),
}

// ── ResourceFile ──────────────────────────────────────────────────────────────

pub struct ResourceFile {
    path:      PathBuf,
    mode:      FileMode,
    formatter: Box<dyn ObjectFormatter>,
}

impl ResourceFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default(), Box::new(JsonFormatter))
    }

    pub fn open_with<P: AsRef<Path>>(
        path:      P,
        options:   ReaderOptions,
        formatter: Box<dyn ObjectFormatter>,
    ) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let reader = ContainerReader::with_options(File::open(&path)?, options)?;
        Ok(Self { path, mode: FileMode::Read(reader), formatter })
    }

    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        Self::create_with(path, options, Box::new(JsonFormatter))
    }

    pub fn create_with<P: AsRef<Path>>(
        path:      P,
        options:   WriterOptions,
        formatter: Box<dyn ObjectFormatter>,
    ) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let writer = ContainerWriter::with_options(File::create(&path)?, options)?;
        Ok(Self { path, mode: FileMode::Write(writer), formatter })
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    pub fn add_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.writer()?.add_string(name, value)
    }

    pub fn add_bytes(&mut self, name: &str, value: &[u8]) -> Result<()> {
        self.writer()?.add_bytes(name, value)
    }

    pub fn add_object(&mut self, name: &str, value: &ObjectValue) -> Result<()> {
        match &mut self.mode {
            FileMode::Write(w) => w.add_object(name, value, self.formatter.as_ref()),
            FileMode::Read(_)  => Err(read_only()),
        }
    }

    /// Store any serializable value as an `Object` record.
    pub fn add_serialize<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let object = ObjectValue::from_serialize(value)?;
        self.add_object(name, &object)
    }

    /// Write the header and records.  May be called again after more adds.
    pub fn finalize(&mut self) -> Result<u64> {
        self.writer()?.finalize()
    }

    /// Finalize (when writing) and release the file.
    pub fn close(self) -> Result<()> {
        match self.mode {
            FileMode::Write(w) => w.close().map(|_| ()),
            FileMode::Read(_)  => Ok(()),
        }
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn header(&self) -> Option<&HeaderBlob> {
        match &self.mode {
            FileMode::Read(r)  => Some(r.header()),
            FileMode::Write(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.mode {
            FileMode::Read(r)  => r.count(),
            FileMode::Write(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode every record and describe it.
    pub fn list(&mut self) -> Result<Vec<EntryInfo>> {
        let formatter = self.formatter.as_ref();
        match &mut self.mode {
            FileMode::Read(r) => r
                .cursor(formatter)
                .enumerate()
                .map(|(i, rec)| rec.map(|rec| EntryInfo::from_record(i, &rec)))
                .collect(),
            FileMode::Write(_) => Err(write_only()),
        }
    }

    pub fn record(&mut self, name: &str) -> Result<Option<ResourceRecord>> {
        let formatter = self.formatter.as_ref();
        match &mut self.mode {
            FileMode::Read(r)  => r.find(name, formatter),
            FileMode::Write(_) => Err(write_only()),
        }
    }

    pub fn get(&mut self, name: &str) -> Result<Option<ResourceValue>> {
        Ok(self.record(name)?.map(|r| r.value))
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }

    fn writer(&mut self) -> Result<&mut ContainerWriter<File>> {
        match &mut self.mode {
            FileMode::Write(w) => Ok(w),
            FileMode::Read(_)  => Err(read_only()),
        }
    }
}

fn read_only()  -> FormatError { FormatError::Usage("resource file is read-only".into()) }
fn write_only() -> FormatError { FormatError::Usage("resource file is write-only".into()) }
