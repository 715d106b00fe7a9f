use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::range::ColumnSelection;

/// Rows of optional cells, every row as wide as the selected columns.
pub(crate) type Grid = Vec<Vec<Option<Cell>>>;

/// Cells collected from one sheet, in the order the engine decoded them.
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    rows_limit: Option<usize>,
    /// Last row holding a value
    pub(crate) row_upper_bound: Option<usize>,
    /// Last column holding a value
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str, rows_limit: Option<usize>) -> Self {
        Sheet {
            name: name.to_owned(),
            cells: Vec::new(),
            rows_limit,
            row_upper_bound: None,
            col_upper_bound: None,
        }
    }

    /// True once `row` lies past the rows to decode; engines stop reading there.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.rows_limit.map(|limit| row >= limit).unwrap_or(false)
    }

    /// Keeps a cell unless it carries no value.
    pub(crate) fn push(&mut self, cell: Cell) {
        if cell.kind == CellType::Empty || cell.value.is_empty() || self.after_row_upper_bound(cell.row) {
            return;
        }
        self.row_upper_bound = self.row_upper_bound.max(Some(cell.row));
        self.col_upper_bound = self.col_upper_bound.max(Some(cell.col));
        self.cells.push(cell);
    }

    /// Lays the cells out from row 1 and column A to the last populated row and
    /// column, keeping only the selected columns that fall inside that extent.
    pub(crate) fn into_grid(self, columns: Option<&ColumnSelection>) -> Grid {
        let (Some(row_upper), Some(col_upper)) = (self.row_upper_bound, self.col_upper_bound) else {
            return Vec::new();
        };
        let positions: Vec<usize> = match columns {
            Some(selection) => selection.iter().take_while(|col| *col <= col_upper).collect(),
            None => (0..=col_upper).collect(),
        };
        let mut slots = vec![None; col_upper + 1];
        for (position, col) in positions.iter().enumerate() {
            slots[*col] = Some(position);
        }

        let mut grid: Grid = (0..=row_upper).map(|_| vec![None; positions.len()]).collect();
        for cell in self.cells {
            if let Some(position) = slots[cell.col] {
                let row = cell.row;
                grid[row][position] = Some(cell);
            }
        }
        grid
    }
}
