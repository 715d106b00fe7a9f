//! Delimited text uploads.
//!
//! Fields are sniffed into the same cell kinds the workbook engines produce,
//! so the rest of the pipeline does not care where a grid came from.

use crate::error::SheetError;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Grid;
use encoding_rs::Encoding;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum DelimitedError {
    #[error("Unable to decode text as {0}")]
    DecodeError(&'static str),

    #[error("Expected {expected} fields in record {record}, saw {actual}")]
    TooManyFieldsError {
        record: usize,
        expected: usize,
        actual: usize,
    },
}

/// Options for reading delimited text.
#[derive(Clone, Debug)]
pub(crate) struct DelimitedOptions {
    pub(crate) delimiter: u8,
    pub(crate) quote: u8,
    /// Number of records to decode, counted from the first.
    pub(crate) rows_limit: Option<usize>,
    /// Recognise ISO-like date and date-time fields.
    pub(crate) parse_dates: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        DelimitedOptions {
            delimiter: b',',
            quote: b'"',
            rows_limit: None,
            parse_dates: true,
        }
    }
}

/// Decodes the upload into one grid row per record; blank lines never reach
/// the grid. Rows keep their own width and [`align_rows`] squares them up once
/// the header is known.
pub(crate) fn read_grid(bytes: &[u8], options: &DelimitedOptions) -> Result<Grid, SheetError> {
    let text = decode_text(bytes)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Grid::new();
    for result in reader.records() {
        if options.rows_limit.map(|limit| grid.len() >= limit).unwrap_or(false) {
            break;
        }
        let record = result?;
        let row = grid.len();
        grid.push(
            record
                .iter()
                .enumerate()
                .map(|(col, field)| Some(sniff(row, col, field, options.parse_dates)))
                .collect(),
        );
    }
    Ok(grid)
}

/// Pads short rows with missing cells up to `width`.
pub(crate) fn align_rows(rows: &mut Grid, width: usize) -> Result<(), SheetError> {
    for row in rows.iter_mut() {
        if row.len() > width {
            let record = row.iter().flatten().next().map(|cell| cell.row + 1).unwrap_or(0);
            Err(DelimitedError::TooManyFieldsError {
                record,
                expected: width,
                actual: row.len(),
            })?
        }
        row.resize(width, None);
    }
    Ok(())
}

/// Honours a byte order mark; anything else must be UTF-8.
fn decode_text(bytes: &[u8]) -> Result<Cow<'_, str>, SheetError> {
    match Encoding::for_bom(bytes) {
        Some((encoding, bom_length)) => encoding
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
            .ok_or_else(|| DelimitedError::DecodeError(encoding.name()).into()),
        None => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|_| DelimitedError::DecodeError("UTF-8").into()),
    }
}

fn sniff(row: usize, col: usize, field: &str, parse_dates: bool) -> Cell {
    let kind = if field.eq_ignore_ascii_case("true") || field.eq_ignore_ascii_case("false") {
        CellType::Boolean
    } else if is_number(field) {
        CellType::Number
    } else if parse_dates && parse_iso_datetime(field).is_some() {
        CellType::IsoDateTime
    } else {
        CellType::InlineString
    };
    Cell {
        row,
        col,
        kind,
        value: field.to_owned(),
    }
}

/// Integers and decimals; `inf` and `nan` spellings stay text.
fn is_number(field: &str) -> bool {
    field.bytes().any(|byte| byte.is_ascii_digit())
        && (field.parse::<i64>().is_ok() || field.parse::<f64>().is_ok())
}
