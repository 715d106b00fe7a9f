//! # Spreadsheet and CSV preview
//!
//! Loads an uploaded spreadsheet or CSV file into a typed, in-memory [`Table`]
//! under a small set of user options, and renders that table as a column
//! profile or a CSV download.
//!
//! ## Features
//!
//! - **Format dispatch**: `.csv`, `.xlsx`, `.xls` and `.xlsb` chosen by file name suffix
//! - **Sheet enumeration**: list the sheets of a workbook before picking one
//! - **Row handling**: header row, skipped rows (a count or a list of indexes) and a row cap
//! - **Column selection**: spreadsheet letter ranges such as `A:D` or `A,C,E`
//! - **Type inference**: boolean, bigint, double, varchar, timestamp, date and time columns
//! - **Export**: CSV bytes with a UTF-8 byte order mark
//! - **Memoization**: an optional bounded cache keyed by every input of a load
//!
//! ## Example
//!
//! ```no_run
//! use sheet_preview::{LoadOptions, TabularLoader, Upload};
//!
//! # fn main() -> Result<(), sheet_preview::LoadError> {
//! let upload = Upload::new("report.xlsx", std::fs::read("report.xlsx").unwrap_or_default());
//! let loader = TabularLoader::new();
//! let sheets = loader.inspect_upload(&upload)?;
//! let options = LoadOptions::default().with_column_range("A:D");
//! let table = loader.load_upload(&upload, &options, sheets.first().map(String::as_str), None)?;
//! println!("{}", table.summary());
//! let csv = table.to_csv_bytes()?;
//! # let _ = csv;
//! # Ok(())
//! # }
//! ```

mod error;
mod helpers;
mod preview;
mod spreadsheet;
mod table;

pub use crate::preview::cache::CacheConfig;
pub use crate::preview::cache::LoadCache;
pub use crate::preview::options::LoadOptions;
pub use crate::preview::FileKind;
pub use crate::preview::LoadError;
pub use crate::preview::TabularLoader;
pub use crate::preview::Upload;
pub use crate::spreadsheet::Engine;
pub use crate::table::column::Column;
pub use crate::table::column::ColumnType;
pub use crate::table::export::EXPORT_FILE_NAME;
pub use crate::table::export::EXPORT_MIME_TYPE;
pub use crate::table::summary::ColumnSummary;
pub use crate::table::summary::TableSummary;
pub use crate::table::Table;
pub use crate::table::Value;
