use crate::preview::LoadError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::sheet::Grid;
use std::collections::BTreeSet;
use tracing::warn;

/// User-facing parsing options of a load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    /// One-based header row among the rows left after skipping; 0 means no header.
    pub header_row: usize,
    /// Letter selector such as `A:D` or `A,C,E`; spreadsheets only.
    pub column_range: Option<String>,
    /// Cap on data rows; 0 means unlimited.
    pub max_rows: usize,
    /// A count of leading rows or a comma separated list of zero-based row indexes.
    pub skip_rows: String,
    /// Recognise ISO-like dates in delimited text.
    pub parse_dates: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            header_row: 1,
            column_range: None,
            max_rows: 500,
            skip_rows: "0".to_owned(),
            parse_dates: true,
        }
    }
}

impl LoadOptions {
    pub fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn with_column_range(mut self, column_range: impl Into<String>) -> Self {
        self.column_range = Some(column_range.into());
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: impl Into<String>) -> Self {
        self.skip_rows = skip_rows.into();
        self
    }

    pub fn with_parse_dates(mut self, parse_dates: bool) -> Self {
        self.parse_dates = parse_dates;
        self
    }

    /// Column range text, treating blank input as unset.
    pub(crate) fn column_range(&self) -> Option<&str> {
        self.column_range
            .as_deref()
            .map(str::trim)
            .filter(|range| !range.is_empty())
    }

    pub(crate) fn row_plan(&self) -> RowPlan {
        RowPlan {
            header: self.header_row.checked_sub(1),
            skip: SkipRows::parse(&self.skip_rows),
            max_rows: (self.max_rows > 0).then_some(self.max_rows),
        }
    }
}

/// Raw rows dropped before the header is located.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SkipRows {
    Nothing,
    Leading(usize),
    Indexes(BTreeSet<usize>),
}

impl SkipRows {
    /// Never fails: text that is neither a count nor a list of indexes skips nothing.
    pub(crate) fn parse(text: &str) -> SkipRows {
        let text = text.trim();
        if text.is_empty() {
            return SkipRows::Nothing;
        }

        let parsed = if text.contains(',') {
            text.split(',')
                .map(str::trim)
                .filter(|piece| !piece.is_empty())
                .map(str::parse::<usize>)
                .collect::<Result<BTreeSet<_>, _>>()
                .map(SkipRows::Indexes)
        } else {
            text.parse::<usize>().map(SkipRows::Leading)
        };
        parsed.unwrap_or_else(|e| {
            warn!(skip_rows = text, error = %e, "ignoring unparsable skip rows");
            SkipRows::Nothing
        })
    }

    fn skips(&self, index: usize) -> bool {
        match self {
            SkipRows::Nothing => false,
            SkipRows::Leading(count) => index < *count,
            SkipRows::Indexes(indexes) => indexes.contains(&index),
        }
    }

    fn len(&self) -> usize {
        match self {
            SkipRows::Nothing => 0,
            SkipRows::Leading(count) => *count,
            SkipRows::Indexes(indexes) => indexes.len(),
        }
    }
}

/// Resolved row handling of a load: which raw rows to drop, where the header
/// sits and how many data rows to keep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RowPlan {
    /// Zero-based header position among the rows left after skipping.
    pub(crate) header: Option<usize>,
    pub(crate) skip: SkipRows,
    pub(crate) max_rows: Option<usize>,
}

impl RowPlan {
    /// Raw rows an engine has to decode to satisfy the plan; `None` when
    /// unbounded, including limits too large to count.
    pub(crate) fn raw_row_limit(&self) -> Option<usize> {
        let max_rows = self.max_rows?;
        let header = self.header.map(|header| header.saturating_add(1)).unwrap_or(0);
        header.checked_add(max_rows)?.checked_add(self.skip.len())
    }

    /// Splits raw rows into the header row and the data rows.
    pub(crate) fn apply(&self, grid: Grid) -> Result<(Option<Vec<Option<Cell>>>, Grid), LoadError> {
        let mut rows: Grid = grid
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !self.skip.skips(*index))
            .map(|(_, row)| row)
            .collect();

        let header = match self.header {
            None => None,
            Some(_) if rows.is_empty() => None,
            Some(index) if index >= rows.len() => {
                return Err(LoadError::ParseError(format!(
                    "Header row {} is beyond the {} available rows",
                    index + 1,
                    rows.len()
                )));
            }
            Some(index) => {
                let mut rest = rows.split_off(index);
                let header = rest.remove(0);
                rows = rest;
                Some(header)
            }
        };

        if let Some(max_rows) = self.max_rows {
            rows.truncate(max_rows);
        }
        Ok((header, rows))
    }
}
