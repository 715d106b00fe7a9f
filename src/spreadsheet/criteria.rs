use crate::spreadsheet::range::ColumnSelection;
use std::collections::HashSet;

/// Texts read as missing values unless they come from a typed (numeric, boolean, date) cell.
pub(crate) const NULL_LITERALS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// What to decode from a sheet.
#[derive(Clone, Debug)]
pub(crate) struct Criteria {
    /// Selected columns; `None` keeps every populated column.
    pub(crate) columns: Option<ColumnSelection>,

    /// Number of physical rows to decode, counted from the first row.
    pub(crate) rows_limit: Option<usize>,

    /// Null literals.
    pub(crate) nulls: HashSet<String>,
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria {
            columns: None,
            rows_limit: None,
            nulls: NULL_LITERALS.iter().map(|literal| literal.to_string()).collect(),
        }
    }
}
