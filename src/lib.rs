pub mod error;
pub mod framing;
pub mod header;
pub mod record;
pub mod formatter;
pub mod io_stream;
pub mod container;

pub use error::{ErrorKind, FormatError};
pub use header::HeaderBlob;
pub use record::{ResourceRecord, ResourceValue, TypeTag};
pub use formatter::{JsonFormatter, ObjectFormatter, ObjectValue};
pub use io_stream::{ContainerReader, ContainerWriter, ReaderOptions, WriterOptions};
pub use container::ResourceFile;
