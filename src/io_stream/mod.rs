//! Streaming container engine — writer and reader.
//!
//! # Writer
//! [`ContainerWriter`] stages every record in a scratch buffer (a temp file
//! by default) because the header, which precedes the records, cannot be
//! written until all offsets are known.  `finalize()` writes the header and
//! then copies the scratch buffer verbatim behind it.  The scratch storage is
//! released when the writer is closed or dropped, on success or failure.
//!
//! # Reader
//! [`ContainerReader`] parses the header on open and decodes nothing else.
//! Records are materialized one at a time, either through a forward
//! [`Cursor`] or by index with `read_at`.  Every decode re-verifies framing
//! byte-for-byte and, unless disabled, checks that each record ends exactly
//! where the next offset begins.
//!
//! # Threading
//! Writers, readers and cursors hold unsynchronized stream state and are
//! meant for a single owner.  Independent containers can be processed on
//! separate threads.

mod reader;
mod writer;

pub use reader::{ContainerReader, Cursor, ReaderOptions};
pub use writer::{ContainerWriter, ScratchStorage, WriterOptions, WriterState};
