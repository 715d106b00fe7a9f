use crate::error::SheetError;
use crate::preview::LoadError;
use crate::table::Table;

/// Download name offered for an exported table.
pub const EXPORT_FILE_NAME: &str = "preview.csv";

/// MIME type of an exported table.
pub const EXPORT_MIME_TYPE: &str = "text/csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

impl Table {
    /// Serializes the table as comma separated text: a UTF-8 byte order mark,
    /// the column names, then one line per row. Nulls are empty fields.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, LoadError> {
        Ok(self.write_csv()?)
    }

    fn write_csv(&self) -> Result<Vec<u8>, SheetError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(UTF8_BOM.to_vec());
        if !self.columns.is_empty() {
            writer.write_record(self.columns.iter().map(|column| column.name.as_str()))?;
            for row in &self.rows {
                writer.write_record(row.iter().map(ToString::to_string))?;
            }
        }
        Ok(writer.into_inner().map_err(|e| e.into_error())?)
    }
}
