use std::fmt::{Display, Formatter};

use derive_getters::Dissolve;
use derive_more::{Add, AddAssign, Constructor};

/// Dense row-major matrix of read counts: rows are read lengths, columns are 0-based positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Dissolve)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<u64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![0; rows * cols],
        }
    }

    pub fn from_values(rows: usize, cols: usize, values: Vec<u64>) -> Option<Self> {
        (rows.checked_mul(cols) == Some(values.len())).then_some(Self { rows, cols, values })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.values[row * self.cols + col]
    }

    #[inline(always)]
    pub fn increment(&mut self, row: usize, col: usize) {
        self.values[row * self.cols + col] += 1;
    }

    pub fn row(&self, row: usize) -> &[u64] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.rows).map(|x| self.row(x).iter().sum()).collect()
    }

    /// Element-wise sum. Shapes must match.
    pub fn accumulate(&mut self, other: &Matrix) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        for (x, y) in self.values.iter_mut().zip(&other.values) {
            *x += *y;
        }
        true
    }
}

/// Everything stored for one gene.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneProfile {
    pub data: Matrix,
    pub buffer_left: i64,
    pub buffer_right: i64,
    pub start_codon_pos: [i64; 3],
    pub stop_codon_pos: [i64; 3],
    pub lengths: Vec<i64>,
    pub reads_by_len: Vec<u64>,
    pub reads_total: u64,
}

/// Per-gene accounting of flag-retained alignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Add, AddAssign, Constructor)]
pub struct Tally {
    /// Counted in the matrix.
    pub retained: u64,
    /// Read length outside `[min_read_length, max_read_length]`.
    pub out_of_range: u64,
}

/// Totals of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Summary {
    pub genes: u64,
    pub aliases: u64,
    pub tally: Tally,
}

impl Summary {
    pub fn add_gene(&mut self, tally: Tally, has_alias: bool) {
        self.genes += 1;
        self.aliases += has_alias as u64;
        self.tally += tally;
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} genes ({} aliases), {} reads counted, {} reads dropped for out-of-range length",
            self.genes, self.aliases, self.tally.retained, self.tally.out_of_range
        )
    }
}
