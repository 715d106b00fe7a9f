use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::collections::HashSet;
use std::fmt::Display;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];
const MINUTE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%dT%H:%M",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const MICROSECONDS_PER_DAY: f64 = 86_400_000_000f64;

/// How a raw cell value is to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Serial number under a date-time format, 1900 date system
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Serial number under a date-time format, 1904 date system
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 text (`t="d"` cells, sniffed CSV dates)
    IsoDateTime,
    InlineString,
    /// Index into the workbook's shared string table
    SharedString,
    Error,
}

impl CellType {
    /// Date/time kinds implied by the built-in number formats.
    pub(crate) fn parse_builtin_number_format_id(id: u16, is_1904: bool) -> Option<Self> {
        match id {
            22 => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            14..=17 => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            18..=21 | 45..=47 => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Classifies a custom number format code by the date and time tokens
    /// outside literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    pub(crate) fn is_serial_datetime(&self) -> bool {
        matches!(
            self,
            Self::NumberDateTime1900 | Self::NumberDate1900 | Self::NumberTime1900
                | Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904
        )
    }

    fn is_1904(&self) -> bool {
        matches!(self, Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904)
    }
}

/// Display text of an Excel error code.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Parses the ISO-like date and date-time texts accepted in `t="d"` cells and CSV fields.
pub(crate) fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let text = text.strip_suffix('Z').unwrap_or(text);
    DATETIME_FORMATS
        .iter()
        .chain(MINUTE_FORMATS.iter())
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Converts an Excel serial number to a date-time.
///
/// The 1900 system counts from 1899-12-30 and carries the Lotus 1900-02-29
/// leap day, so serials below 60 shift by one day. The 1904 system starts 1462 days later.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() > 2_958_466f64 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let micros = (serial.fract() * MICROSECONDS_PER_DAY).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::days(days + offset))?
        .checked_add_signed(Duration::microseconds(micros))
}

/// A decoded cell: zero-based position, interpretation and raw text.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Text and error cells matching a null literal count as missing, as do empty cells.
    pub(crate) fn is_null(&self, nulls: &HashSet<String>) -> bool {
        match self.kind {
            CellType::Empty => true,
            CellType::InlineString | CellType::SharedString | CellType::Error => nulls.contains(&self.value),
            _ => false,
        }
    }

    pub(crate) fn to_boolean(&self) -> bool {
        self.value == "1" || self.value.eq_ignore_ascii_case("true")
    }

    pub(crate) fn to_bigint(&self) -> Result<i64, String> {
        self.value.parse::<i64>().or_else(|_| {
            self.to_double()
                .ok()
                .filter(|value| value.fract() == 0.0 && value.abs() < 9.2e18)
                .map(|value| value as i64)
                .ok_or_else(|| format!("parse '{}' to bigint failed", self.value))
        })
    }

    pub(crate) fn to_double(&self) -> Result<f64, String> {
        self.value.parse::<f64>().map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    pub(crate) fn to_datetime(&self) -> Result<NaiveDateTime, String> {
        let datetime = match self.kind {
            kind if kind.is_serial_datetime() => serial_to_datetime(self.to_double()?, kind.is_1904()),
            CellType::IsoDateTime => parse_iso_datetime(&self.value),
            _ => None,
        };
        datetime.ok_or_else(|| format!("parse '{}' to datetime failed", self.value))
    }

    pub(crate) fn to_date(&self) -> Result<NaiveDate, String> {
        self.to_datetime().map(|datetime| datetime.date())
    }

    pub(crate) fn to_time(&self) -> Result<NaiveTime, String> {
        self.to_datetime().map(|datetime| datetime.time())
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formatted = match self.kind {
            CellType::Boolean => return f.write_str(if self.to_boolean() { "true" } else { "false" }),
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                self.to_datetime().ok().map(|value| value.format("%Y-%m-%d").to_string())
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                self.to_datetime().ok().map(|value| value.format("%H:%M:%S%.f").to_string())
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                self.to_datetime().ok().map(|value| value.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            _ => None,
        };
        match formatted {
            Some(text) => f.write_str(&text),
            None => f.write_str(&self.value),
        }
    }
}
