use crate::error::ResultOptionChain;
use crate::error::SheetError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::helpers::reader::UploadReader;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const ARRAY: u16 = 545;
const TABLE: u16 = 566;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const SHR_FMLA: u16 = 1212;
const BOF: u16 = 2057;

#[derive(Error, Debug)]
pub(crate) enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Cell kind, or the style index whose number format decides it.
type CellValue = (Either<CellType, usize>, String);

/// Excel 97-2003 workbook (`.xls`): the BIFF8 `Workbook` stream of a compound file.
pub(crate) struct XlsSpreadsheet {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// Sheet names with the stream offset of their BOF record
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    pub(crate) fn open(bytes: Arc<[u8]>) -> Result<XlsSpreadsheet, SheetError> {
        let cfb = Cfb::new(&mut UploadReader::new(bytes))?;
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::FileError("Workbook".to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats = HashMap::<u16, CellType>::new();
        let mut format_ids = Vec::<u16>::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id, CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_ids.push(reader.read_u16()?);
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let kind = reader.read_u16()? >> 8;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                // worksheets only; charts, macro sheets and VBA modules carry no cells
                if kind == 0 {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }

        let number_formats = excel::load_number_formats(format_ids, custom_formats, is_1904);
        Ok(XlsSpreadsheet {
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// The SST is read with the workbook globals, so every entry is already in memory.
    fn load_shared_strings(&mut self, indexes: Option<HashSet<usize>>) -> Result<(Vec<String>, HashMap<usize, usize>), SheetError> {
        let mappings = match indexes {
            Some(keys) => keys.into_iter().map(|key| (key, key)).collect(),
            None => (0..self.shared_strings.len()).map(|key| (key, key)).collect(),
        };
        Ok((self.shared_strings.to_owned(), mappings))
    }

    fn read_sheet(&mut self, index: usize, criteria: &Criteria) -> Result<Sheet, SheetError> {
        let (sheet_name, pointer) = self.sheets
            .get(index)
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(index.to_string()))?;
        let mut sheet = Sheet::new(sheet_name, criteria.rows_limit);
        self.reader.goto(*pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let style = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell {
                            row,
                            col,
                            kind: excel::number_format(&self.number_formats, style),
                            value,
                        });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(style) => excel::number_format(&self.number_formats, style),
                    };
                    sheet.push(Cell { row, col, kind, value });
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::with_capacity(count.min(65536));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    if reader.read_u8()? == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    let style = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(style), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    let style = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(style), value))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Cached result of a formula. A string result lives in the STRING record that
/// follows, after any SHRFMLA, ARRAY or TABLE record holding the formula itself.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<CellValue, SheetError> {
    let style = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    if is_number {
        return Ok((Either::Right(style), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => loop {
            match reader.next()? {
                Some(SHR_FMLA | ARRAY | TABLE) => continue,
                Some(STRING) => break Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?)),
                _ => break Err(XlsError::FormulaValueError(formula).into()),
            }
        },
        1 => {
            let value = if (formula & 0xFF_0000) > 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}
