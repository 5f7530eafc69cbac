//! File format parsers

pub mod delimited;
pub mod reader;
pub mod spreadsheet;

pub use reader::{Format, SourceRow, SourceTable, SourceValue, parse};
