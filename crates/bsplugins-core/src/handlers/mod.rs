//! [`ReaderHandler`](crate::reader::ReaderHandler) implementations.
//!
//! - [`ConflictScanner`] collects header metadata and the records a file
//!   overrides, for building the override index.
//! - [`SingleRecordParser`] finds one record and decodes its fields.

mod conflict;
mod single_record;

pub use conflict::{ConflictScanner, PluginFacts, RecordFact};
pub use single_record::SingleRecordParser;
