use crate::error::SheetError;
use crate::spreadsheet::reference::col_to_index;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;

/// Last column of a worksheet (`XFD`).
const MAX_COLUMN: usize = 16_383;

static COLUMN_PIECE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([A-Z]+)\s*(:\s*([A-Z]+))?$").expect("Hardcode regex pattern")
});

#[derive(Error, Debug)]
pub(crate) enum RangeError {
    #[error("Invalid column range '{0}'")]
    FormatError(String),

    #[error("Reversed column range '{0}'")]
    ReversedError(String),

    #[error("No selected column holds data; the sheet ends at column '{0}'")]
    BeyondDataError(String),
}

/// Columns chosen with letter notation such as `A:D`, `A,C,E` or `B,D:F`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ColumnSelection {
    columns: BTreeSet<usize>,
}

impl ColumnSelection {
    /// Selected columns in sheet order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns.iter().copied()
    }
}

impl TryFrom<&str> for ColumnSelection {
    type Error = SheetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut columns = BTreeSet::new();
        for piece in value.split(',').map(str::trim) {
            let captures = COLUMN_PIECE
                .captures(piece)
                .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
            let lower = captures
                .get(1)
                .and_then(|matcher| col_to_index(matcher.as_str()))
                .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
            let upper = match captures.get(3) {
                Some(matcher) => col_to_index(matcher.as_str())
                    .ok_or_else(|| RangeError::FormatError(value.to_owned()))?,
                None => lower,
            };
            if upper > MAX_COLUMN {
                Err(RangeError::FormatError(value.to_owned()))?
            }
            if upper < lower {
                Err(RangeError::ReversedError(piece.to_owned()))?
            }
            columns.extend(lower..=upper);
        }
        Ok(ColumnSelection { columns })
    }
}
