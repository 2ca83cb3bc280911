//! Read-only parser for OLE2 structured storage, the Compound File Binary
//! Format behind legacy Microsoft containers (.doc, .xls, .msi, .xrm, ...).
//!
//! A compound file is a small filesystem inside one file: fixed-size
//! sectors, two allocation tables (the FAT for ordinary sectors and a
//! MiniFAT for 64-byte mini-sectors), and a directory of named storages and
//! streams kept as a red-black tree. [`OleReader`] rebuilds that hierarchy
//! defensively: every chain walk is hop-bounded, the stored tree shape is
//! never trusted, and each anomaly passes through a configurable severity
//! threshold ([`Severity`]) so the same file can be parsed permissively or
//! rejected strictly.
//!
//! ```no_run
//! use rusty_ole::{OleReader, Severity};
//!
//! # fn main() -> Result<(), rusty_ole::OleError> {
//! let mut ole = OleReader::open_path("sample.xrm", Severity::Fatal)?;
//! for path in ole.list_streams() {
//!     println!("{}", path.join("/"));
//! }
//! let data = ole.open_stream("ImageData1/Image1")?;
//! # let _ = data;
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod defect;
pub mod directory;
pub mod error;
pub mod header;
pub mod propset;
pub mod reader;
pub mod sector;
pub mod stream;

pub use defect::{Defect, DefectSink, Severity};
pub use directory::{DirEntry, DirectoryTree, EntryKind, EntryType};
pub use error::{OleError, Result};
pub use header::{is_ole_file, MAGIC};
pub use propset::PropertyValue;
pub use reader::OleReader;
