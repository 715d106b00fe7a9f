use crate::error::SheetError;
use crate::helpers::biff12::Biff12Reader;
use crate::helpers::biff8::decode_rk_number;
use crate::helpers::zip::ZipHelper;
use crate::match_biff12_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::SheetParts;
use crate::spreadsheet::excel::Workbook;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;

const BRT_ROW_HDR: u16 = 0;
const BRT_CELL_RK: u16 = 2;
const BRT_CELL_ERROR: u16 = 3;
const BRT_CELL_BOOL: u16 = 4;
const BRT_CELL_REAL: u16 = 5;
const BRT_CELL_ST: u16 = 6;
const BRT_CELL_ISST: u16 = 7;
const BRT_FMLA_STRING: u16 = 8;
const BRT_FMLA_NUM: u16 = 9;
const BRT_FMLA_BOOL: u16 = 10;
const BRT_FMLA_ERROR: u16 = 11;
const BRT_SST_ITEM: u16 = 19;
const BRT_FRT_BEGIN: u16 = 35;
const BRT_FRT_END: u16 = 36;
const BRT_FMT: u16 = 44;
const BRT_XF: u16 = 47;
const BRT_CELL_R_STRING: u16 = 62;
const BRT_END_BUNDLE_SHS: u16 = 144;
const BRT_BEGIN_SHEET_DATA: u16 = 145;
const BRT_END_SHEET_DATA: u16 = 146;
const BRT_WB_PROP: u16 = 153;
const BRT_BUNDLE_SH: u16 = 156;
const BRT_BEGIN_SST: u16 = 159;
const BRT_BEGIN_FMTS: u16 = 615;
const BRT_BEGIN_CELL_XFS: u16 = 617;

type CellValue = (Either<CellType, usize>, String);

/// Excel binary workbook (`.xlsb`): BIFF12 records in a ZIP container.
pub(crate) struct XlsbSpreadsheet {
    zip: Workbook,
    number_formats: Vec<CellType>,
    sheets: SheetParts,
}

impl XlsbSpreadsheet {
    pub(crate) fn open(bytes: Arc<[u8]>) -> Result<XlsbSpreadsheet, SheetError> {
        let (zip, number_formats, sheets) = excel::open(bytes, load_workbook, load_number_formats)?;
        Ok(XlsbSpreadsheet { zip, number_formats, sheets })
    }
}

impl Spreadsheet for XlsbSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn load_shared_strings(&mut self, mut indexes: Option<HashSet<usize>>) -> Result<(Vec<String>, HashMap<usize, usize>), SheetError> {
        let mut shared_strings = Vec::<String>::new();
        let mut mappings = HashMap::<usize, usize>::new();
        let mut reader = match self.zip.biff_reader("xl/sharedStrings.bin")? {
            Some(reader) => reader,
            None => return Ok((shared_strings, mappings)),
        };

        reader.find(BRT_BEGIN_SST)?;
        for id in 0..reader.get_usize(4) {
            reader.find_with(BRT_SST_ITEM, &[(BRT_FRT_BEGIN, BRT_FRT_END)])?;
            match &mut indexes {
                Some(keys) => {
                    if keys.remove(&id) {
                        mappings.insert(id, shared_strings.len());
                        shared_strings.push(reader.get_str(1)?.into_owned());
                    }
                    if keys.is_empty() {
                        break;
                    }
                }
                None => {
                    mappings.insert(id, shared_strings.len());
                    shared_strings.push(reader.get_str(1)?.into_owned());
                }
            }
        }
        Ok((shared_strings, mappings))
    }

    fn read_sheet(&mut self, index: usize, criteria: &Criteria) -> Result<Sheet, SheetError> {
        let (sheet_name, zip_path) = self.sheets
            .get(index)
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(index.to_string()))?;
        let mut sheet = Sheet::new(sheet_name, criteria.rows_limit);
        let mut reader = self.zip
            .biff_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;

        let mut row = 0usize;
        reader.find(BRT_BEGIN_SHEET_DATA)?;
        loop {
            let tag = reader.next()?;
            match tag {
                BRT_END_SHEET_DATA => break,
                BRT_ROW_HDR => {
                    row = reader.get_usize(0);
                    if sheet.after_row_upper_bound(row) {
                        break;
                    }
                }
                BRT_CELL_RK
                | BRT_CELL_BOOL | BRT_FMLA_BOOL
                | BRT_CELL_REAL | BRT_FMLA_NUM
                | BRT_CELL_ST | BRT_FMLA_STRING
                | BRT_CELL_R_STRING
                | BRT_CELL_ISST
                | BRT_CELL_ERROR | BRT_FMLA_ERROR => {
                    let col = reader.get_usize(0);
                    let (either, value) = match tag {
                        BRT_CELL_BOOL | BRT_FMLA_BOOL => read_bool_cell(&reader),
                        BRT_CELL_REAL | BRT_FMLA_NUM => read_real_cell(&reader),
                        BRT_CELL_ST | BRT_FMLA_STRING => read_string_cell(&reader, 8)?,
                        BRT_CELL_R_STRING => read_string_cell(&reader, 9)?,
                        BRT_CELL_ISST => read_shared_string_cell(&reader),
                        BRT_CELL_ERROR | BRT_FMLA_ERROR => read_error_cell(&reader),
                        _ => read_rk_cell(&reader),
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

fn load_workbook(zip: &mut Workbook) -> Result<(SheetParts, bool), SheetError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.bin.rels")?;
    let mut reader = zip
        .biff_reader("xl/workbook.bin")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.bin".to_owned()))?;
    let mut sheets = SheetParts::new();
    let mut is_1904 = false;
    match_biff12_record!(reader => {
        BRT_END_BUNDLE_SHS => break,
        BRT_BUNDLE_SH => {
            let (id, bound) = reader.get_str_and_bound(8)?;
            if let Some(zip_path) = relationships.get(id.as_ref()) {
                let sheet_name = reader.get_str(bound)?;
                sheets.push((sheet_name.into_owned(), zip_path.to_owned()));
            }
        }
        BRT_WB_PROP => is_1904 = (reader.get_u8(0) & 0x1) != 0,
    });
    Ok((sheets, is_1904))
}

fn load_number_formats(zip: &mut Workbook, is_1904: bool) -> Result<Vec<CellType>, SheetError> {
    let mut reader = match zip.biff_reader("xl/styles.bin")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats = HashMap::<u16, CellType>::new();
    let mut format_ids = Vec::<u16>::new();
    match_biff12_record!(reader => {
        BRT_BEGIN_FMTS => {
            for _ in 0..reader.get_usize(0) {
                reader.find(BRT_FMT)?;
                let id = reader.get_u16(0);
                let format = reader.get_str(2)?;
                custom_formats.insert(id, CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        BRT_BEGIN_CELL_XFS => {
            for _ in 0..reader.get_usize(0) {
                reader.find(BRT_XF)?;
                format_ids.push(reader.get_u16(2));
            }
            break;
        }
    });

    Ok(excel::load_number_formats(format_ids, custom_formats, is_1904))
}

// Cell records start with the column (4 bytes) and the style (3 bytes plus a flag byte).

fn read_bool_cell<R: BufRead>(reader: &Biff12Reader<R>) -> CellValue {
    let value = if reader.get_u8(8) != 0 { "1" } else { "0" };
    (Either::Left(CellType::Boolean), value.to_owned())
}

fn read_real_cell<R: BufRead>(reader: &Biff12Reader<R>) -> CellValue {
    (Either::Right(reader.get_style(4)), reader.get_f64(8).to_string())
}

fn read_string_cell<R: BufRead>(reader: &Biff12Reader<R>, at: usize) -> Result<CellValue, SheetError> {
    Ok((Either::Left(CellType::InlineString), reader.get_str(at)?.into_owned()))
}

fn read_shared_string_cell<R: BufRead>(reader: &Biff12Reader<R>) -> CellValue {
    (Either::Left(CellType::SharedString), reader.get_usize(8).to_string())
}

fn read_error_cell<R: BufRead>(reader: &Biff12Reader<R>) -> CellValue {
    (Either::Left(CellType::Error), to_error_value(reader.get_u8(8)).to_owned())
}

fn read_rk_cell<R: BufRead>(reader: &Biff12Reader<R>) -> CellValue {
    (Either::Right(reader.get_style(4)), decode_rk_number(reader.get_u32(8)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::fixtures::XlsbFixture;

    fn cells(sheet: &Sheet) -> Vec<(String, CellType, &str)> {
        sheet.cells.iter().map(|cell| (cell.reference(), cell.kind, cell.value.as_str())).collect()
    }

    #[test]
    fn reads_cells() {
        let bytes = XlsbFixture::new()
            .sheet("Data", &[
                &["s:name", "n:12", "n:1.5", "b:0"],
                &["", "i:inline", "e:#REF!", "dt:45292.5"],
            ])
            .build();
        let mut spreadsheet = XlsbSpreadsheet::open(bytes.into()).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["Data"]);
        let sheet = spreadsheet.read_sheet(0, &Criteria::default()).unwrap();
        assert_eq!(cells(&sheet), vec![
            ("A1".to_owned(), CellType::SharedString, "0"),
            ("B1".to_owned(), CellType::Number, "12"),
            ("C1".to_owned(), CellType::Number, "1.5"),
            ("D1".to_owned(), CellType::Boolean, "0"),
            ("B2".to_owned(), CellType::InlineString, "inline"),
            ("C2".to_owned(), CellType::Error, "#REF!"),
            ("D2".to_owned(), CellType::NumberDateTime1900, "45292.5"),
        ]);
        let (strings, mappings) = spreadsheet.load_shared_strings(None).unwrap();
        assert_eq!(strings, vec!["name"]);
        assert_eq!(mappings[&0], 0);
    }

    #[test]
    fn rows_limit_and_1904() {
        let bytes = XlsbFixture::new()
            .date1904()
            .sheet("Data", &[&["date:1"], &["n:2"]])
            .build();
        let mut spreadsheet = XlsbSpreadsheet::open(bytes.into()).unwrap();
        let criteria = Criteria { rows_limit: Some(1), ..Criteria::default() };
        let sheet = spreadsheet.read_sheet(0, &criteria).unwrap();
        assert_eq!(sheet.cells.len(), 1);
        assert_eq!(sheet.cells[0].kind, CellType::NumberDate1904);
        assert_eq!(sheet.cells[0].to_string(), "1904-01-02");
    }
}
