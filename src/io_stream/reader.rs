use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{FormatError, Result};
use crate::formatter::ObjectFormatter;
use crate::framing::{expect_literal, read_text_field};
use crate::header::{HeaderBlob, SUPPORTED_HEADER_VERSION};
use crate::record::{read_record, ResourceRecord, RESOURCE_START};

/// Configuration for [`ContainerReader::with_options`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Newest header generation accepted.
    pub supported_header_version: u16,
    /// Compare each record's decoded length with the gap to the next offset.
    pub verify_record_gaps:       bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            supported_header_version: SUPPORTED_HEADER_VERSION,
            verify_record_gaps:       true,
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read + Seek> {
    source:       BufReader<R>,
    header:       HeaderBlob,
    region_start: u64,
    options:      ReaderOptions,
}

impl<R: Read + Seek> ContainerReader<R> {
    pub fn new(source: R) -> Result<Self> {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Parse and verify the header at the current position of `source`.
    /// No record is decoded yet.
    pub fn with_options(source: R, options: ReaderOptions) -> Result<Self> {
        let mut source = BufReader::new(source);
        let start = source.stream_position()?;
        let header = HeaderBlob::read(&mut source, options.supported_header_version)?;
        let region_start = start + header.header_byte_length;
        Ok(Self { source, header, region_start, options })
    }

    pub fn header(&self) -> &HeaderBlob { &self.header }

    pub fn count(&self) -> usize { self.header.record_count() }

    /// Absolute position of the first record.
    pub fn record_region_start(&self) -> u64 { self.region_start }

    pub fn into_inner(self) -> R { self.source.into_inner() }

    /// Forward-only cursor over every record.
    pub fn cursor<'a>(&'a mut self, formatter: &'a dyn ObjectFormatter) -> Cursor<'a, R> {
        Cursor { reader: self, formatter, next: 0, current: None }
    }

    /// Decode record `index` directly from its offset.
    pub fn read_at(&mut self, index: usize, formatter: &dyn ObjectFormatter) -> Result<ResourceRecord> {
        let offset = self.offset(index)?;
        let record = read_record(
            &mut self.source,
            self.region_start + offset as u64,
            self.header.type_support_mask,
            self.options.supported_header_version,
            formatter,
        )?;

        if self.options.verify_record_gaps {
            if let Some(&next) = self.header.offsets.get(index + 1) {
                let gap = next - offset;
                if record.bytes_consumed as i64 != gap {
                    return Err(FormatError::Deserialization(format!(
                        "record {index} ({:?}) spans {} bytes but the offset table allows {gap}",
                        record.name, record.bytes_consumed
                    )));
                }
            }
        }
        Ok(record)
    }

    /// First record called `name`, decoding only names until it is found.
    pub fn find(&mut self, name: &str, formatter: &dyn ObjectFormatter) -> Result<Option<ResourceRecord>> {
        for index in 0..self.count() {
            if self.name_at(index)? == name {
                return self.read_at(index, formatter).map(Some);
            }
        }
        Ok(None)
    }

    /// Names of every record, in order.
    pub fn names(&mut self) -> Result<Vec<String>> {
        (0..self.count()).map(|i| self.name_at(i)).collect()
    }

    fn name_at(&mut self, index: usize) -> Result<String> {
        let offset = self.offset(index)?;
        self.source.seek(SeekFrom::Start(self.region_start + offset as u64))?;
        if !expect_literal(&mut self.source, RESOURCE_START)? {
            return Err(FormatError::Deserialization(format!(
                "no resource start literal for record {index}"
            )));
        }
        read_text_field(&mut self.source, "RESOURCENAME")
    }

    fn offset(&self, index: usize) -> Result<i64> {
        self.header.offsets.get(index).copied().ok_or_else(|| {
            FormatError::Usage(format!("record {index} out of range ({} records)", self.count()))
        })
    }
}

// ── Cursor ───────────────────────────────────────────────────────────────────

/// Explicit-index enumerator over a reader's records.
///
/// Not restartable mid-record; [`Cursor::reset`] rewinds to before the first
/// record without re-reading the header.
pub struct Cursor<'a, R: Read + Seek> {
    reader:    &'a mut ContainerReader<R>,
    formatter: &'a dyn ObjectFormatter,
    next:      usize,
    current:   Option<ResourceRecord>,
}

impl<'a, R: Read + Seek> Cursor<'a, R> {
    /// Decode the next record.  Returns `false` once every record was visited.
    pub fn move_next(&mut self) -> Result<bool> {
        self.current = None;
        if self.next >= self.reader.count() {
            return Ok(false);
        }
        let record = self.reader.read_at(self.next, self.formatter)?;
        self.current = Some(record);
        self.next += 1;
        Ok(true)
    }

    pub fn current(&self) -> Result<&ResourceRecord> {
        self.current.as_ref().ok_or_else(|| {
            FormatError::Usage("cursor is not positioned on a record".into())
        })
    }

    pub fn reset(&mut self) {
        self.next = 0;
        self.current = None;
    }
}

impl<'a, R: Read + Seek> Iterator for Cursor<'a, R> {
    type Item = Result<ResourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.move_next() {
            Ok(true)  => self.current.clone().map(Ok),
            Ok(false) => None,
            Err(e) => {
                // Fuse: a corrupt record ends iteration.
                self.next = self.reader.count();
                Some(Err(e))
            }
        }
    }
}
