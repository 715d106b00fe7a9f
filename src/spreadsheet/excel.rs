//! Pieces shared by the ZIP-based workbook engines (`.xlsx`, `.xlsb`).
use crate::error::SheetError;
use crate::helpers::cfb::Cfb;
use crate::helpers::reader::UploadReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::sync::Arc;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

pub(super) type Workbook = ZipArchive<UploadReader>;

/// Sheet directory entries: `(sheet name, part path)`.
pub(super) type SheetParts = Vec<(String, String)>;

/// Opens the ZIP container, then reads the sheet directory and the style table.
///
/// An encrypted OpenXML workbook is a compound file holding an `EncryptedPackage`
/// stream rather than a ZIP archive; it is reported as password protected.
pub(super) fn open<W, F>(bytes: Arc<[u8]>, load_workbook: W, load_number_formats: F) -> Result<(Workbook, Vec<CellType>, SheetParts), SheetError>
where
    W: Fn(&mut Workbook) -> Result<(SheetParts, bool), SheetError>,
    F: Fn(&mut Workbook, bool) -> Result<Vec<CellType>, SheetError>,
{
    let mut reader = UploadReader::new(bytes);
    if is_password_protected(&mut reader) {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?;
    }

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError)?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Worksheet relationships of the workbook part: relationship id → part path.
pub(super) fn load_relationships(zip: &mut Workbook, path: &str) -> Result<HashMap<String, String>, SheetError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|kind| kind.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.into_owned(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves each cell style's number format to a cell type. Styles without a
/// known date or time format read as plain numbers.
pub(super) fn load_number_formats(format_ids: Vec<u16>, custom_formats: HashMap<u16, CellType>, is_1904: bool) -> Vec<CellType> {
    format_ids
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(*id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Number cell type for a style index; an unknown style reads as a plain number.
pub(super) fn number_format(number_formats: &[CellType], index: usize) -> CellType {
    number_formats.get(index).copied().unwrap_or(CellType::Number)
}

/// Relationship targets are relative to `xl/` unless absolute.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(path) = path.strip_prefix('/') {
        path.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

fn is_password_protected(reader: &mut UploadReader) -> bool {
    Cfb::new(reader)
        .map(|cfb| cfb.exists("EncryptedPackage"))
        .unwrap_or(false)
}
