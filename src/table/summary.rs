use crate::table::column::ColumnType;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Row count and per-column profile of a [`crate::Table`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSummary {
    pub index: usize,
    pub name: String,
    pub non_null: usize,
    pub kind: ColumnType,
}

impl TableSummary {
    /// Number of columns of each type, by type label.
    pub fn type_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for column in &self.columns {
            *counts.entry(column.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Compact profile in the layout of a data frame `info()` listing.
/// A table without columns renders nothing.
impl Display for TableSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.columns.is_empty() {
            return Ok(());
        }

        match self.rows {
            0 => writeln!(f, "0 entries")?,
            rows => writeln!(f, "{rows} entries, 0 to {}", rows - 1)?,
        }
        writeln!(f, "Data columns (total {} columns):", self.columns.len())?;

        let index_width = self.columns.len().saturating_sub(1).to_string().len().max(3);
        let name_width = self.columns
            .iter()
            .map(|column| column.name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Column".len());
        let counts: Vec<String> = self.columns
            .iter()
            .map(|column| format!("{} non-null", column.non_null))
            .collect();
        let count_width = counts
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("Non-Null Count".len());

        writeln!(f, " {:<index_width$}  {:<name_width$}  {:<count_width$}  Dtype", "#", "Column", "Non-Null Count")?;
        writeln!(
            f,
            " {:<index_width$}  {:<name_width$}  {:<count_width$}  -----",
            "-".repeat(index_width),
            "-".repeat(name_width),
            "-".repeat(count_width)
        )?;
        for (column, count) in self.columns.iter().zip(&counts) {
            writeln!(
                f,
                " {:<index_width$}  {:<name_width$}  {:<count_width$}  {}",
                column.index, column.name, count, column.kind
            )?;
        }

        let tally: Vec<String> = self
            .type_counts()
            .iter()
            .map(|(label, count)| format!("{label}({count})"))
            .collect();
        write!(f, "dtypes: {}", tally.join(", "))
    }
}
