use crate::error::SheetError;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Value;
use chrono::NaiveDate;
use chrono::NaiveTime;
use std::fmt::Display;

/// Inferred type of a table column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    /// 64-bit signed integers
    BigInt,
    /// Double-precision floating point numbers
    Double,
    Varchar,
    /// Date and time with microsecond precision
    Timestamp,
    Date,
    Time,
}

/// A named, typed table column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub(crate) name: String,
    pub(crate) kind: ColumnType,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }
}

impl ColumnType {
    /// Type label shown in the metadata summary.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double",
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
        }
    }

    /// Type a single cell suggests; `None` for empty cells.
    pub(crate) fn from_cell(cell: &Cell) -> Option<Self> {
        match cell.kind {
            CellType::Empty => None,
            // serials outside the calendar range stay plain numbers
            kind if kind.is_serial_datetime() && cell.to_datetime().is_err() => match cell.to_double() {
                Ok(_) => Some(ColumnType::Double),
                Err(_) => Some(ColumnType::Varchar),
            },
            CellType::Boolean => Some(ColumnType::Boolean),
            CellType::Number if Self::is_integer(&cell.value) => Some(ColumnType::BigInt),
            CellType::Number => Some(ColumnType::Double),
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => Some(ColumnType::Timestamp),
            CellType::NumberDate1900 | CellType::NumberDate1904 => Some(ColumnType::Date),
            CellType::NumberTime1900 | CellType::NumberTime1904 => Some(ColumnType::Time),
            CellType::IsoDateTime => Some(match parse_iso_datetime(&cell.value) {
                Some(datetime) if datetime.time() == NaiveTime::MIN => ColumnType::Date,
                // time-only values are stored against the epoch day of either date system
                Some(datetime) if is_epoch_day(datetime.date()) => ColumnType::Time,
                Some(_) => ColumnType::Timestamp,
                None => ColumnType::Varchar,
            }),
            CellType::InlineString | CellType::SharedString | CellType::Error => Some(ColumnType::Varchar),
        }
    }

    /// True for whole numbers, including a decimal part of zeros only (`3.00`).
    fn is_integer(value: &str) -> bool {
        if value.parse::<i64>().is_ok() {
            return true;
        }
        match value.split_once('.') {
            Some((whole, fraction)) => {
                !whole.is_empty()
                    && whole.parse::<i64>().is_ok()
                    && fraction.chars().all(|char| char == '0')
            }
            None => false,
        }
    }

    /// Most specific type shared by every candidate; VARCHAR when they disagree or none exist.
    pub(crate) fn detect<I>(types: I) -> ColumnType
    where
        I: IntoIterator<Item = Option<ColumnType>>,
    {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Varchar
        } else if types.iter().all(|kind| kind.is_boolean()) {
            ColumnType::Boolean
        } else if types.iter().all(|kind| kind.is_int()) {
            ColumnType::BigInt
        } else if types.iter().all(|kind| kind.is_float()) {
            ColumnType::Double
        } else if types.iter().all(|kind| kind.is_date()) {
            ColumnType::Date
        } else if types.iter().all(|kind| kind.is_time()) {
            ColumnType::Time
        } else if types.iter().all(|kind| kind.is_datetime()) {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    /// Converts a non-null cell into this column's value type.
    pub(crate) fn convert(&self, cell: &Cell) -> Result<Value, SheetError> {
        let mapper = |message: String| SpreadsheetError::CellValueError(cell.reference(), message);
        Ok(match self {
            ColumnType::Varchar => Value::Varchar(cell.to_string()),
            ColumnType::Boolean => Value::Boolean(cell.to_boolean()),
            ColumnType::BigInt => Value::BigInt(cell.to_bigint().map_err(mapper)?),
            ColumnType::Double => Value::Double(cell.to_double().map_err(mapper)?),
            ColumnType::Timestamp => Value::Timestamp(cell.to_datetime().map_err(mapper)?),
            ColumnType::Date => Value::Date(cell.to_date().map_err(mapper)?),
            ColumnType::Time => Value::Time(cell.to_time().map_err(mapper)?),
        })
    }

    #[inline]
    pub(crate) fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    #[inline]
    pub(crate) fn is_int(&self) -> bool {
        matches!(self, ColumnType::BigInt)
    }

    /// Integer or floating point.
    #[inline]
    pub(crate) fn is_float(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }

    #[inline]
    pub(crate) fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    #[inline]
    pub(crate) fn is_time(&self) -> bool {
        matches!(self, ColumnType::Time)
    }

    /// Any date or time kind.
    #[inline]
    pub(crate) fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date | ColumnType::Time)
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_epoch_day(date: NaiveDate) -> bool {
    let epochs = [(1899, 12, 30), (1899, 12, 31), (1900, 1, 1), (1904, 1, 1)];
    epochs
        .iter()
        .filter_map(|(year, month, day)| NaiveDate::from_ymd_opt(*year, *month, *day))
        .any(|epoch| epoch == date)
}
