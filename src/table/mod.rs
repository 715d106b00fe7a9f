//! The materialized result of a load.

pub(crate) mod column;
pub(crate) mod export;
pub(crate) mod summary;

use crate::error::SheetError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::sheet::Grid;
use crate::table::column::Column;
use crate::table::column::ColumnType;
use crate::table::summary::ColumnSummary;
use crate::table::summary::TableSummary;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::collections::HashSet;
use std::fmt::Display;

/// A typed cell of a [`Table`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rough heap and inline footprint, used to charge cache entries.
    fn estimated_size(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::Varchar(text) => inline + text.capacity(),
            _ => inline,
        }
    }
}

/// Nulls render empty; dates, times and timestamps use ISO-like layouts.
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Varchar(value) => f.write_str(value),
            Value::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Time(value) => write!(f, "{}", value.format("%H:%M:%S%.f")),
        }
    }
}

/// Named, typed columns and rows of values. Every row is exactly as wide as
/// the column list, and every non-null value matches its column's type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Column names paired with their type labels, in column order.
    pub fn dtypes(&self) -> Vec<(&str, &'static str)> {
        self.columns
            .iter()
            .map(|column| (column.name.as_str(), column.kind.as_str()))
            .collect()
    }

    pub fn summary(&self) -> TableSummary {
        let columns = self.columns
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnSummary {
                index,
                name: column.name.to_owned(),
                non_null: self.rows.iter().filter(|row| !row[index].is_null()).count(),
                kind: column.kind,
            })
            .collect();
        TableSummary {
            rows: self.rows.len(),
            columns,
        }
    }

    pub(crate) fn estimated_size(&self) -> usize {
        let names: usize = self.columns.iter().map(|column| column.name.capacity()).sum();
        let values: usize = self.rows.iter().flatten().map(Value::estimated_size).sum();
        names + values
    }

    /// Builds the table from a header row (if any) and data rows of equal width.
    ///
    /// Column types come from the non-null data cells only.
    pub(crate) fn from_grid(
        header: Option<Vec<Option<Cell>>>,
        rows: Grid,
        nulls: &HashSet<String>,
    ) -> Result<Table, SheetError> {
        let width = header
            .as_ref()
            .map(Vec::len)
            .or_else(|| rows.first().map(Vec::len))
            .unwrap_or(0);
        if width == 0 {
            return Ok(Table::default());
        }
        let present = |cell: &Option<Cell>| -> Option<Cell> {
            cell.as_ref().filter(|cell| !cell.is_null(nulls)).cloned()
        };

        let kinds: Vec<ColumnType> = (0..width)
            .map(|col| {
                ColumnType::detect(rows.iter().map(|row| {
                    row.get(col)
                        .and_then(present)
                        .and_then(|cell| ColumnType::from_cell(&cell))
                }))
            })
            .collect();

        let names = match header {
            Some(cells) => header_names(&cells),
            None => (1..=width).map(|index| format!("column{index}")).collect(),
        };
        let columns: Vec<Column> = names
            .into_iter()
            .zip(kinds)
            .map(|(name, kind)| Column { name, kind })
            .collect();

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Vec::with_capacity(width);
            for (col, column) in columns.iter().enumerate() {
                record.push(match row.get(col).and_then(present) {
                    Some(cell) => column.kind.convert(&cell)?,
                    None => Value::Null,
                });
            }
            values.push(record);
        }
        Ok(Table { columns, rows: values })
    }
}

/// Header cell text; a blank header cell becomes `Unnamed: {index}` and repeats
/// gain a `.1`, `.2`, ... suffix.
fn header_names(cells: &[Option<Cell>]) -> Vec<String> {
    let mut used = HashSet::<String>::new();
    let mut names = Vec::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        let name = match cell {
            Some(cell) if !cell.value.is_empty() => cell.to_string(),
            _ => format!("Unnamed: {index}"),
        };
        let mut candidate = name.to_owned();
        let mut suffix = 0usize;
        while used.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}.{suffix}");
        }
        used.insert(candidate.to_owned());
        names.push(candidate);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;
    use crate::spreadsheet::criteria::Criteria;

    fn cell(row: usize, col: usize, kind: CellType, value: &str) -> Option<Cell> {
        Some(Cell { row, col, kind, value: value.to_owned() })
    }

    fn text(row: usize, col: usize, value: &str) -> Option<Cell> {
        cell(row, col, CellType::InlineString, value)
    }

    fn number(row: usize, col: usize, value: &str) -> Option<Cell> {
        cell(row, col, CellType::Number, value)
    }

    #[test]
    fn typed_columns_with_header() {
        let header = vec![text(0, 0, "id"), text(0, 1, "score"), text(0, 2, "note")];
        let rows = vec![
            vec![number(1, 0, "1"), number(1, 1, "2.5"), text(1, 2, "NA")],
            vec![number(2, 0, "2"), None, text(2, 2, "ok")],
        ];
        let table = Table::from_grid(Some(header), rows, &Criteria::default().nulls).unwrap();
        assert_eq!(table.dtypes(), vec![("id", "bigint"), ("score", "double"), ("note", "varchar")]);
        assert_eq!(table.rows(), &[
            vec![Value::BigInt(1), Value::Double(2.5), Value::Null],
            vec![Value::BigInt(2), Value::Null, Value::Varchar("ok".to_owned())],
        ]);
    }

    #[test]
    fn mixed_columns_fall_back_to_text() {
        let rows = vec![
            vec![number(0, 0, "1"), cell(0, 1, CellType::NumberDate1900, "45292")],
            vec![text(1, 0, "two"), cell(1, 1, CellType::NumberTime1900, "0.5")],
        ];
        let table = Table::from_grid(None, rows, &Criteria::default().nulls).unwrap();
        assert_eq!(table.dtypes(), vec![("column1", "varchar"), ("column2", "timestamp")]);
        assert_eq!(table.rows()[0][0], Value::Varchar("1".to_owned()));
        assert_eq!(table.rows()[1][1].to_string(), "1899-12-31 12:00:00");
    }

    #[test]
    fn dates_past_the_calendar_do_not_fail() {
        let rows = vec![
            vec![cell(0, 0, CellType::NumberDate1900, "45292"), cell(0, 1, CellType::NumberDate1900, "3000000")],
            vec![cell(1, 0, CellType::NumberDate1900, "3000000"), cell(1, 1, CellType::NumberDate1900, "3000001")],
        ];
        let table = Table::from_grid(None, rows, &Criteria::default().nulls).unwrap();
        assert_eq!(table.dtypes(), vec![("column1", "varchar"), ("column2", "double")]);
        assert_eq!(table.rows()[0][0], Value::Varchar("2024-01-01".to_owned()));
        assert_eq!(table.rows()[1][0], Value::Varchar("3000000".to_owned()));
        assert_eq!(table.rows()[1][1], Value::Double(3_000_001.0));
    }

    #[test]
    fn header_names_are_unique() {
        let cells = vec![text(0, 0, "a"), None, text(0, 2, "a"), text(0, 3, "a.1"), text(0, 4, "a")];
        assert_eq!(header_names(&cells), vec!["a", "Unnamed: 1", "a.1", "a.1.1", "a.2"]);
    }

    #[test]
    fn empty_columns_are_varchar() {
        let header = vec![text(0, 0, "x"), text(0, 1, "y")];
        let rows = vec![vec![number(1, 0, "1"), None]];
        let table = Table::from_grid(Some(header), rows, &Criteria::default().nulls).unwrap();
        assert_eq!(table.columns()[1].kind(), ColumnType::Varchar);
        assert!(table.rows()[0][1].is_null());
    }

    #[test]
    fn empty_grid() {
        let table = Table::from_grid(None, Vec::new(), &Criteria::default().nulls).unwrap();
        assert!(table.columns().is_empty());
        assert!(table.rows().is_empty());
        assert_eq!(table.estimated_size(), 0);
    }

    #[test]
    fn zero_width_grid_has_no_rows() {
        let nulls = &Criteria::default().nulls;
        let table = Table::from_grid(Some(Vec::new()), vec![Vec::new(), Vec::new()], nulls).unwrap();
        assert!(table.columns().is_empty());
        assert!(table.rows().is_empty());

        let table = Table::from_grid(None, vec![Vec::new()], nulls).unwrap();
        assert!(table.rows().is_empty());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Double(0.25).to_string(), "0.25");
        assert_eq!(Value::Time(NaiveTime::from_hms_milli_opt(8, 5, 0, 250).unwrap()).to_string(), "08:05:00.250");
    }
}
