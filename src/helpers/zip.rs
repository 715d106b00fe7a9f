//! Lookup of workbook parts inside the ZIP container of `.xlsx` and `.xlsb` uploads.

use crate::error::SheetError;
use crate::helpers::biff12::Biff12Reader;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) type PartReader<'a, RS> = BufReader<ZipFile<'a, RS>>;

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Finds a part by name, ignoring ASCII case and accepting `\` separators.
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetError>;

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<PartReader<'_, RS>>>, SheetError>;

    fn biff_reader(&'_ mut self, name: &str) -> Result<Option<Biff12Reader<PartReader<'_, RS>>>, SheetError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetError> {
        let pattern = name.replace('\\', "/");
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(str::to_owned);
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(file) => Ok(file),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<PartReader<'_, RS>>>, SheetError> {
        Ok(self.file(name)?.map(|file| XmlReader::new(BufReader::new(file))))
    }

    fn biff_reader(&'_ mut self, name: &str) -> Result<Option<Biff12Reader<PartReader<'_, RS>>>, SheetError> {
        Ok(self.file(name)?.map(|file| Biff12Reader::new(BufReader::new(file))))
    }
}
