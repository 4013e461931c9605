use serde::Serialize;

/// `rows × cols` counters bucketing processed items by index.
///
/// Item `i` lands in row `(i / cols) % rows`, column `i % cols`. Only used to
/// visualize progress and load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressGrid {
    rows: usize,
    cols: usize,
    cells: Vec<u64>,
}

impl ProgressGrid {
    /// Zeroed grid; zero dimensions are raised to 1.
    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell coordinates of item `index`.
    pub fn cell_of(&self, index: usize) -> (usize, usize) {
        ((index / self.cols) % self.rows, index % self.cols)
    }

    /// Counts one processed item.
    pub fn increment(&mut self, index: usize) {
        let (row, col) = self.cell_of(index);
        self.cells[row * self.cols + col] += 1;
    }

    /// Counter at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.cells[row * self.cols + col]
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.cells.iter().sum()
    }

    /// Counters as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        self.cells.chunks(self.cols).map(<[u64]>::to_vec).collect()
    }
}
