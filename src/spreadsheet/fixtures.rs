//! In-memory workbooks for tests.
//!
//! Cells are written as `kind:value` strings:
//! `s:` shared string, `i:` inline string, `b:` boolean (`1`/`0`), `e:` error text,
//! `d:` ISO date text, and numbers as `n:` (General), `date:`, `time:`, `dt:`
//! (built-in date, time and date-time formats) or `custom:` (a custom
//! `yyyy-mm-dd hh:mm` format). An empty string leaves the cell out.

use quick_xml::escape::escape;
use std::io::Cursor;
use std::io::Write;
use std::marker::PhantomData;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const SECTOR_SIZE: usize = 512;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;
const CUSTOM_FORMAT: &str = "yyyy-mm-dd hh:mm";
/// Number format id of each fixture style: General, date, time, date-time, custom.
const STYLE_FORMATS: [u16; 5] = [0, 14, 21, 22, 164];
const WORKSHEET_RELATIONSHIP: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

pub(crate) fn zip_parts(parts: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in parts {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Version 3 compound file holding one stream: FAT in sector 0, directory in
/// sector 1, the stream from sector 2 on.
pub(crate) fn compound_file(name: &str, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() >= 4096, "payload must not go to the mini stream");
    let payload_sectors = payload.len().div_ceil(SECTOR_SIZE);
    assert!(payload_sectors + 2 <= SECTOR_SIZE / 4, "payload must fit one FAT sector");

    let mut header = Vec::with_capacity(SECTOR_SIZE);
    header.extend(0xE11A_B1A1_E011_CFD0u64.to_le_bytes());
    header.extend([0u8; 16]);
    header.extend(0x003Eu16.to_le_bytes());
    header.extend(3u16.to_le_bytes());
    header.extend(0xFFFEu16.to_le_bytes());
    header.extend(9u16.to_le_bytes());
    header.extend(6u16.to_le_bytes());
    header.extend([0u8; 6]);
    header.extend(0u32.to_le_bytes()); // directory sectors
    header.extend(1u32.to_le_bytes()); // FAT sectors
    header.extend(1u32.to_le_bytes()); // first directory sector
    header.extend(0u32.to_le_bytes());
    header.extend(4096u32.to_le_bytes());
    header.extend(END_OF_CHAIN.to_le_bytes()); // mini FAT
    header.extend(0u32.to_le_bytes());
    header.extend(END_OF_CHAIN.to_le_bytes()); // DIFAT
    header.extend(0u32.to_le_bytes());
    header.extend(0u32.to_le_bytes()); // DIFAT[0]: FAT in sector 0
    while header.len() < SECTOR_SIZE {
        header.extend(FREE_SECTOR.to_le_bytes());
    }

    let mut fat = vec![FAT_SECTOR, END_OF_CHAIN];
    for sector in 0..payload_sectors {
        let next = if sector + 1 == payload_sectors { END_OF_CHAIN } else { (sector + 3) as u32 };
        fat.push(next);
    }
    fat.resize(SECTOR_SIZE / 4, FREE_SECTOR);

    let mut directory = directory_entry("Root Entry", 5, END_OF_CHAIN, 0);
    directory.extend(directory_entry(name, 2, 2, payload.len()));
    directory.resize(SECTOR_SIZE, 0);

    let mut bytes = header;
    bytes.extend(fat.iter().flat_map(|entry| entry.to_le_bytes()));
    bytes.extend(directory);
    bytes.extend(payload);
    bytes.resize((payload_sectors + 3) * SECTOR_SIZE, 0);
    bytes
}

fn directory_entry(name: &str, kind: u8, start: u32, size: usize) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let units: Vec<u8> = name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect();
    entry[..units.len()].copy_from_slice(&units);
    entry[64..66].copy_from_slice(&(units.len() as u16).to_le_bytes());
    entry[66] = kind;
    entry[68..80].copy_from_slice(&[0xFF; 12]);
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&(size as u64).to_le_bytes());
    entry
}

/// BIFF12 record with 7-bit continuation type and size.
pub(crate) fn biff12_record(kind: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    push_7bit(&mut bytes, kind as usize);
    push_7bit(&mut bytes, payload.len());
    bytes.extend(payload);
    bytes
}

fn push_7bit(bytes: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            bytes.push(byte);
            return;
        }
        bytes.push(byte | 0x80);
    }
}

/// `XLWideString`: character count then UTF-16LE.
pub(crate) fn wide_string(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut bytes = (units.len() as u32).to_le_bytes().to_vec();
    bytes.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

enum Value<'a> {
    Shared(usize),
    Inline(&'a str),
    Iso(&'a str),
    /// Raw number text and fixture style
    Number(&'a str, u16),
    Boolean(bool),
    Error(&'a str),
}

impl Value<'_> {
    fn number(&self) -> f64 {
        match self {
            Value::Number(text, _) => text.parse().unwrap(),
            _ => unreachable!(),
        }
    }

    /// Small integers go out as RK numbers in the binary formats.
    fn rk(&self) -> Option<u32> {
        match self {
            Value::Number(text, _) => text
                .parse::<i32>()
                .ok()
                .filter(|value| (-(1 << 29)..(1 << 29)).contains(value))
                .map(|value| ((value << 2) as u32) | 0x02),
            _ => None,
        }
    }
}

fn error_code(text: &str) -> u8 {
    match text {
        "#NULL!" => 0x00,
        "#DIV/0!" => 0x07,
        "#VALUE!" => 0x0F,
        "#REF!" => 0x17,
        "#NAME?" => 0x1D,
        "#NUM!" => 0x24,
        "#N/A" => 0x2A,
        _ => 0xFF,
    }
}

pub(crate) struct Xlsx;
pub(crate) struct Xls;
pub(crate) struct Xlsb;

pub(crate) type XlsxFixture = Fixture<Xlsx>;
pub(crate) type XlsFixture = Fixture<Xls>;
pub(crate) type XlsbFixture = Fixture<Xlsb>;

pub(crate) trait Format: Sized {
    fn build(fixture: &Fixture<Self>) -> Vec<u8>;
}

pub(crate) struct Fixture<F> {
    sheets: Vec<(String, Vec<Vec<String>>)>,
    shared_strings: Vec<String>,
    is_1904: bool,
    is_protected: bool,
    format: PhantomData<F>,
}

impl<F: Format> Fixture<F> {
    pub(crate) fn new() -> Self {
        Fixture {
            sheets: Vec::new(),
            shared_strings: Vec::new(),
            is_1904: false,
            is_protected: false,
            format: PhantomData,
        }
    }

    pub(crate) fn sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        for text in rows.iter().flatten().filter_map(|cell| cell.strip_prefix("s:")) {
            if !self.shared_strings.iter().any(|string| string == text) {
                self.shared_strings.push(text.to_owned());
            }
        }
        self.sheets.push((name.to_owned(), rows));
        self
    }

    pub(crate) fn date1904(mut self) -> Self {
        self.is_1904 = true;
        self
    }

    /// Marks the workbook encrypted (only the BIFF8 fixture honours this).
    pub(crate) fn password(mut self) -> Self {
        self.is_protected = true;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        F::build(self)
    }

    /// Populated cells of a sheet in row order: `(row, col, value)`.
    fn cells<'a>(&self, rows: &'a [Vec<String>]) -> Vec<(usize, usize, Value<'a>)> {
        let mut cells = Vec::new();
        for (row, values) in rows.iter().enumerate() {
            for (col, entry) in values.iter().enumerate() {
                if entry.is_empty() {
                    continue;
                }
                let (kind, text) = entry.split_once(':').unwrap();
                let value = match kind {
                    "s" => Value::Shared(self.shared_strings.iter().position(|string| string == text).unwrap()),
                    "i" => Value::Inline(text),
                    "d" => Value::Iso(text),
                    "b" => Value::Boolean(text == "1"),
                    "e" => Value::Error(text),
                    "n" => Value::Number(text, 0),
                    "date" => Value::Number(text, 1),
                    "time" => Value::Number(text, 2),
                    "dt" => Value::Number(text, 3),
                    "custom" => Value::Number(text, 4),
                    _ => panic!("unknown cell kind '{kind}'"),
                };
                cells.push((row, col, value));
            }
        }
        cells
    }

    fn relationships(&self, extension: &str) -> String {
        let mut xml = String::from("<Relationships>");
        for index in 1..=self.sheets.len() {
            xml.push_str(&format!(
                r#"<Relationship Id="rId{index}" Type="{WORKSHEET_RELATIONSHIP}" Target="worksheets/sheet{index}.{extension}"/>"#
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

impl Format for Xlsx {
    fn build(fixture: &Fixture<Self>) -> Vec<u8> {
        let mut parts = Vec::<(String, Vec<u8>)>::new();

        let mut workbook = String::from(
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        );
        if fixture.is_1904 {
            workbook.push_str(r#"<workbookPr date1904="1"/>"#);
        }
        workbook.push_str("<sheets>");
        for (index, (name, _)) in fixture.sheets.iter().enumerate() {
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(name.as_str()),
                index + 1,
                index + 1
            ));
        }
        workbook.push_str("</sheets></workbook>");
        parts.push(("xl/workbook.xml".to_owned(), workbook.into_bytes()));
        parts.push(("xl/_rels/workbook.xml.rels".to_owned(), fixture.relationships("xml").into_bytes()));

        let mut styles = format!(
            r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="{CUSTOM_FORMAT}"/></numFmts><cellXfs count="{}">"#,
            STYLE_FORMATS.len()
        );
        for format in STYLE_FORMATS {
            styles.push_str(&format!(r#"<xf numFmtId="{format}"/>"#));
        }
        styles.push_str("</cellXfs></styleSheet>");
        parts.push(("xl/styles.xml".to_owned(), styles.into_bytes()));

        let mut strings = String::from("<sst>");
        for string in &fixture.shared_strings {
            strings.push_str(&format!("<si><t>{}</t></si>", escape(string.as_str())));
        }
        strings.push_str("</sst>");
        parts.push(("xl/sharedStrings.xml".to_owned(), strings.into_bytes()));

        for (index, (_, rows)) in fixture.sheets.iter().enumerate() {
            let mut xml = String::from("<worksheet><sheetData>");
            let cells = fixture.cells(rows);
            for row in 0..rows.len() {
                xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
                for (_, col, value) in cells.iter().filter(|(cell_row, _, _)| *cell_row == row) {
                    let reference = crate::spreadsheet::reference::index_to_reference(row, *col);
                    xml.push_str(&match value {
                        Value::Shared(id) => format!(r#"<c r="{reference}" t="s"><v>{id}</v></c>"#),
                        Value::Inline(text) => format!(r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#, escape(*text)),
                        Value::Iso(text) => format!(r#"<c r="{reference}" t="d"><v>{text}</v></c>"#),
                        Value::Number(text, style) => format!(r#"<c r="{reference}" s="{style}"><v>{text}</v></c>"#),
                        Value::Boolean(flag) => format!(r#"<c r="{reference}" t="b"><v>{}</v></c>"#, u8::from(*flag)),
                        Value::Error(text) => format!(r#"<c r="{reference}" t="e"><v>{}</v></c>"#, escape(*text)),
                    });
                }
                xml.push_str("</row>");
            }
            xml.push_str("</sheetData></worksheet>");
            parts.push((format!("xl/worksheets/sheet{}.xml", index + 1), xml.into_bytes()));
        }

        let parts: Vec<(&str, Vec<u8>)> = parts.iter().map(|(name, bytes)| (name.as_str(), bytes.clone())).collect();
        zip_parts(&parts)
    }
}

fn biff8_record(kind: u16, data: &[u8]) -> Vec<u8> {
    let mut bytes = kind.to_le_bytes().to_vec();
    bytes.extend((data.len() as u16).to_le_bytes());
    bytes.extend(data);
    bytes
}

/// `XLUnicodeString` with 16-bit characters.
fn xl_unicode_string(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut bytes = (units.len() as u16).to_le_bytes().to_vec();
    bytes.push(0x01);
    bytes.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

fn biff8_cell(row: usize, col: usize, style: u16) -> Vec<u8> {
    let mut bytes = (row as u16).to_le_bytes().to_vec();
    bytes.extend((col as u16).to_le_bytes());
    bytes.extend(style.to_le_bytes());
    bytes
}

impl Format for Xls {
    fn build(fixture: &Fixture<Self>) -> Vec<u8> {
        let mut globals = biff8_record(2057, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        if fixture.is_protected {
            globals.extend(biff8_record(47, &[0; 6]));
        }
        globals.extend(biff8_record(34, &[u8::from(fixture.is_1904), 0]));
        let mut format = 164u16.to_le_bytes().to_vec();
        format.extend(xl_unicode_string(CUSTOM_FORMAT));
        globals.extend(biff8_record(1054, &format));
        for format in STYLE_FORMATS {
            let mut xf = vec![0u8, 0];
            xf.extend(format.to_le_bytes());
            xf.resize(20, 0);
            globals.extend(biff8_record(224, &xf));
        }
        let count = fixture.shared_strings.len() as u32;
        let mut sst = count.to_le_bytes().to_vec();
        sst.extend(count.to_le_bytes());
        for string in &fixture.shared_strings {
            sst.extend(xl_unicode_string(string));
        }
        globals.extend(biff8_record(252, &sst));

        let mut pointers = Vec::new();
        for (name, _) in &fixture.sheets {
            pointers.push(globals.len() + 4);
            let units: Vec<u16> = name.encode_utf16().collect();
            let mut data = vec![0u8; 4];
            data.extend([0, 0, units.len() as u8, 0x01]);
            data.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
            globals.extend(biff8_record(133, &data));
        }
        globals.extend(biff8_record(10, &[]));

        let mut stream = globals;
        for ((_, rows), pointer) in fixture.sheets.iter().zip(pointers) {
            let offset = stream.len() as u32;
            stream[pointer..pointer + 4].copy_from_slice(&offset.to_le_bytes());
            stream.extend(biff8_record(2057, &[0x00, 0x06, 0x10, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
            for (row, col, value) in fixture.cells(rows) {
                stream.extend(match &value {
                    Value::Shared(id) => {
                        let mut data = biff8_cell(row, col, 0);
                        data.extend((*id as u32).to_le_bytes());
                        biff8_record(253, &data)
                    }
                    Value::Inline(text) | Value::Iso(text) => {
                        let mut data = biff8_cell(row, col, 0);
                        data.extend(xl_unicode_string(text));
                        biff8_record(516, &data)
                    }
                    Value::Number(_, style) => {
                        let mut data = biff8_cell(row, col, *style);
                        match value.rk() {
                            Some(rk) => {
                                data.extend(rk.to_le_bytes());
                                biff8_record(638, &data)
                            }
                            None => {
                                data.extend(value.number().to_le_bytes());
                                biff8_record(515, &data)
                            }
                        }
                    }
                    Value::Boolean(flag) => {
                        let mut data = biff8_cell(row, col, 0);
                        data.extend([u8::from(*flag), 0]);
                        biff8_record(517, &data)
                    }
                    Value::Error(text) => {
                        let mut data = biff8_cell(row, col, 0);
                        data.extend([error_code(text), 1]);
                        biff8_record(517, &data)
                    }
                });
            }
            stream.extend(biff8_record(10, &[]));
        }
        if stream.len() < 4096 {
            stream.resize(4096, 0);
        }
        compound_file("Workbook", &stream)
    }
}

fn biff12_cell(col: usize, style: u16, value: &[u8]) -> Vec<u8> {
    let mut bytes = (col as u32).to_le_bytes().to_vec();
    bytes.extend([(style & 0xFF) as u8, (style >> 8) as u8, 0, 0]);
    bytes.extend(value);
    bytes
}

impl Format for Xlsb {
    fn build(fixture: &Fixture<Self>) -> Vec<u8> {
        let mut parts = Vec::<(String, Vec<u8>)>::new();

        let mut workbook = biff12_record(153, &[u8::from(fixture.is_1904), 0, 0, 0, 0, 0, 0, 0]);
        for (index, (name, _)) in fixture.sheets.iter().enumerate() {
            let mut data = 0u32.to_le_bytes().to_vec();
            data.extend((index as u32 + 1).to_le_bytes());
            data.extend(wide_string(&format!("rId{}", index + 1)));
            data.extend(wide_string(name));
            workbook.extend(biff12_record(156, &data));
        }
        workbook.extend(biff12_record(144, &[]));
        parts.push(("xl/workbook.bin".to_owned(), workbook));
        parts.push(("xl/_rels/workbook.bin.rels".to_owned(), fixture.relationships("bin").into_bytes()));

        let mut styles = biff12_record(615, &1u32.to_le_bytes());
        let mut format = 164u16.to_le_bytes().to_vec();
        format.extend(wide_string(CUSTOM_FORMAT));
        styles.extend(biff12_record(44, &format));
        styles.extend(biff12_record(617, &(STYLE_FORMATS.len() as u32).to_le_bytes()));
        for format in STYLE_FORMATS {
            let mut xf = 0xFFFFu16.to_le_bytes().to_vec();
            xf.extend(format.to_le_bytes());
            xf.resize(16, 0);
            styles.extend(biff12_record(47, &xf));
        }
        parts.push(("xl/styles.bin".to_owned(), styles));

        let count = fixture.shared_strings.len() as u32;
        let mut sst = count.to_le_bytes().to_vec();
        sst.extend(count.to_le_bytes());
        let mut strings = biff12_record(159, &sst);
        for string in &fixture.shared_strings {
            let mut item = vec![0u8];
            item.extend(wide_string(string));
            strings.extend(biff12_record(19, &item));
        }
        strings.extend(biff12_record(160, &[]));
        parts.push(("xl/sharedStrings.bin".to_owned(), strings));

        for (index, (_, rows)) in fixture.sheets.iter().enumerate() {
            let mut sheet = biff12_record(145, &[]);
            let cells = fixture.cells(rows);
            for row in 0..rows.len() {
                let mut header = (row as u32).to_le_bytes().to_vec();
                header.resize(17, 0);
                sheet.extend(biff12_record(0, &header));
                for (_, col, value) in cells.iter().filter(|(cell_row, _, _)| *cell_row == row) {
                    sheet.extend(match value {
                        Value::Shared(id) => biff12_record(7, &biff12_cell(*col, 0, &(*id as u32).to_le_bytes())),
                        Value::Inline(text) | Value::Iso(text) => biff12_record(6, &biff12_cell(*col, 0, &wide_string(text))),
                        Value::Number(_, style) => match value.rk() {
                            Some(rk) => biff12_record(2, &biff12_cell(*col, *style, &rk.to_le_bytes())),
                            None => biff12_record(5, &biff12_cell(*col, *style, &value.number().to_le_bytes())),
                        },
                        Value::Boolean(flag) => biff12_record(4, &biff12_cell(*col, 0, &[u8::from(*flag)])),
                        Value::Error(text) => biff12_record(3, &biff12_cell(*col, 0, &[error_code(text)])),
                    });
                }
            }
            sheet.extend(biff12_record(146, &[]));
            parts.push((format!("xl/worksheets/sheet{}.bin", index + 1), sheet));
        }

        let parts: Vec<(&str, Vec<u8>)> = parts.iter().map(|(name, bytes)| (name.as_str(), bytes.clone())).collect();
        zip_parts(&parts)
    }
}
