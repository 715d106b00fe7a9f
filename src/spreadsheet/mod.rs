//! Format engines.
//!
//! Each workbook engine reads the sheet directory on open and decodes one
//! sheet at a time into a [`Sheet`]. [`read_grid`] ties them together: it picks
//! the sheet, resolves shared strings and lays the cells out as a [`Grid`].
//! Delimited text has its own reader in [`csv`].

pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod csv;
pub(crate) mod excel;
#[cfg(test)]
pub(crate) mod fixtures;
pub(crate) mod range;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsb;
pub(crate) mod xlsx;

use crate::error::SheetError;
use crate::preview::LoadError;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::range::RangeError;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::sheet::Grid;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsb::XlsbSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub(crate) enum SpreadsheetError {
    #[error("Missing workbook part '{0}'")]
    FileError(String),

    #[error("Workbook has no sheets")]
    SpreadsheetEmptyError,

    #[error("Workbook is password protected")]
    SpreadsheetPasswordProtectedError,

    #[error("Worksheet named '{0}' not found")]
    SheetNotFoundError(String),

    #[error("Shared string '{0}' out of range")]
    SharedStringError(String),

    #[error("Invalid cell value at '{0}': {1}")]
    CellValueError(String, String),
}

/// Decoder for a workbook sub-format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Office Open XML (`.xlsx`)
    OpenXml,
    /// Excel 97-2003 binary (`.xls`)
    Biff8,
    /// Excel binary workbook (`.xlsb`)
    Biff12,
}

impl Engine {
    pub const fn id(&self) -> &'static str {
        match self {
            Engine::OpenXml => "openxml",
            Engine::Biff8 => "biff8",
            Engine::Biff12 => "biff12",
        }
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Engine {
    type Err = LoadError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        match id.trim().to_ascii_lowercase().as_str() {
            "openxml" => Ok(Engine::OpenXml),
            "biff8" => Ok(Engine::Biff8),
            "biff12" => Ok(Engine::Biff12),
            _ => Err(LoadError::ParseError(format!("Unknown engine '{id}'"))),
        }
    }
}

/// A workbook opened far enough to list its sheets.
pub(crate) trait Spreadsheet {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Loads the shared string table, or only the listed entries. The mapping
    /// points each requested index at its position in the returned strings.
    fn load_shared_strings(
        &mut self,
        indexes: Option<HashSet<usize>>,
    ) -> Result<(Vec<String>, HashMap<usize, usize>), SheetError>;

    /// Decodes the sheet at `index` of [`Spreadsheet::sheet_names`].
    fn read_sheet(&mut self, index: usize, criteria: &Criteria) -> Result<Sheet, SheetError>;
}

pub(crate) fn open_spreadsheet(bytes: Arc<[u8]>, engine: Engine) -> Result<Box<dyn Spreadsheet>, SheetError> {
    debug!(%engine, size = bytes.len(), "opening workbook");
    Ok(match engine {
        Engine::OpenXml => Box::new(XlsxSpreadsheet::open(bytes)?),
        Engine::Biff8 => Box::new(XlsSpreadsheet::open(bytes)?),
        Engine::Biff12 => Box::new(XlsbSpreadsheet::open(bytes)?),
    })
}

/// Decodes one sheet, the first when no name is given.
pub(crate) fn read_grid(
    spreadsheet: &mut dyn Spreadsheet,
    sheet_name: Option<&str>,
    criteria: &Criteria,
) -> Result<Grid, SheetError> {
    let index = match sheet_name {
        Some(name) => spreadsheet
            .sheet_names()
            .iter()
            .position(|candidate| candidate == name)
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(name.to_owned()))?,
        None => 0,
    };
    let mut sheet = spreadsheet.read_sheet(index, criteria)?;
    debug!(sheet = %sheet.name, cells = sheet.cells.len(), "sheet decoded");
    resolve_shared_strings(spreadsheet, &mut sheet)?;
    if let (Some(selection), Some(col_upper)) = (criteria.columns.as_ref(), sheet.col_upper_bound) {
        if selection.iter().next().is_some_and(|first| first > col_upper) {
            Err(RangeError::BeyondDataError(index_to_col(col_upper)))?
        }
    }
    Ok(sheet.into_grid(criteria.columns.as_ref()))
}

/// Replaces shared string references with their text, loading only the entries the sheet uses.
fn resolve_shared_strings(spreadsheet: &mut dyn Spreadsheet, sheet: &mut Sheet) -> Result<(), SheetError> {
    let mut indexes = HashSet::new();
    for cell in sheet.cells.iter().filter(|cell| cell.kind == CellType::SharedString) {
        indexes.insert(cell.value.parse::<usize>()?);
    }
    if indexes.is_empty() {
        return Ok(());
    }

    let (shared_strings, mappings) = spreadsheet.load_shared_strings(Some(indexes))?;
    for cell in sheet.cells.iter_mut().filter(|cell| cell.kind == CellType::SharedString) {
        let string = cell.value.parse::<usize>()
            .ok()
            .and_then(|index| mappings.get(&index))
            .and_then(|position| shared_strings.get(*position))
            .ok_or_else(|| SpreadsheetError::SharedStringError(cell.value.to_owned()))?;
        cell.kind = CellType::InlineString;
        cell.value = string.to_owned();
    }
    Ok(())
}
