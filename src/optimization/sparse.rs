//! Sparse matrix assembly
//!
//! Cost and constraint matrices are built row by row as `(row, col, value)`
//! triplets and compressed to CSC once before handing them to the solver.

use std::borrow::Cow;
use std::collections::BTreeMap;

use osqp::CscMatrix;

/// Sparse matrix under construction. Duplicate entries are summed.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    nrows: usize,
    ncols: usize,
    entries: BTreeMap<(usize, usize), f64>,
}

impl TripletMatrix {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: BTreeMap::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Add `value` at `(row, col)`, growing the row count if needed
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(col < self.ncols, "column {} out of {}", col, self.ncols);
        if value == 0.0 {
            return;
        }
        self.nrows = self.nrows.max(row + 1);
        // keyed column-major so iteration order is CSC order
        *self.entries.entry((col, row)).or_insert(0.0) += value;
    }

    /// Append a new row holding `entries` and return its index
    pub fn push_row(&mut self, entries: &[(usize, f64)]) -> usize {
        let row = self.nrows;
        self.nrows += 1;
        for &(col, value) in entries {
            self.add(row, col, value);
        }
        row
    }

    /// Add `weight * r r^T` for the sparse row vector `r`, upper triangle only.
    ///
    /// This is the Hessian contribution of a residual `weight * (r . x + c)^2`
    /// under the `1/2 x^T P x` convention, divided by two.
    pub fn add_outer_product_upper(&mut self, row: &[(usize, f64)], weight: f64) {
        for &(i, vi) in row {
            for &(j, vj) in row {
                if i <= j {
                    self.add(i, j, weight * vi * vj);
                }
            }
        }
    }

    /// Value at `(row, col)`, zero when absent
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(col, row)).copied().unwrap_or(0.0)
    }

    /// Compress to CSC with sorted row indices in each column
    pub fn to_csc(&self) -> CscMatrix<'static> {
        let mut indptr = vec![0usize; self.ncols + 1];
        let mut indices = Vec::with_capacity(self.entries.len());
        let mut data = Vec::with_capacity(self.entries.len());
        for (&(col, row), &value) in &self.entries {
            indptr[col + 1] += 1;
            indices.push(row);
            data.push(value);
        }
        for col in 0..self.ncols {
            indptr[col + 1] += indptr[col];
        }
        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr: Cow::Owned(indptr),
            indices: Cow::Owned(indices),
            data: Cow::Owned(data),
        }
    }

    /// Dense copy, for tests and diagnostics
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut m = nalgebra::DMatrix::zeros(self.nrows, self.ncols);
        for (&(col, row), &value) in &self.entries {
            m[(row, col)] = value;
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_summed() {
        let mut m = TripletMatrix::new(2, 2);
        m.add(0, 1, 1.5);
        m.add(0, 1, 2.0);
        m.add(1, 0, 0.0);
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.get(0, 1), 3.5);
    }

    #[test]
    fn test_push_row_grows_matrix() {
        let mut m = TripletMatrix::new(0, 3);
        let r0 = m.push_row(&[(0, 1.0), (2, -1.0)]);
        let r1 = m.push_row(&[(1, 4.0)]);
        assert_eq!((r0, r1), (0, 1));
        assert_eq!(m.nrows(), 2);
        let dense = m.to_dense();
        assert_eq!(dense[(0, 2)], -1.0);
        assert_eq!(dense[(1, 1)], 4.0);
    }

    #[test]
    fn test_outer_product_upper() {
        let mut m = TripletMatrix::new(3, 3);
        m.add_outer_product_upper(&[(0, 1.0), (2, -2.0)], 2.0);
        assert_eq!(m.get(0, 0), 2.0);
        assert_eq!(m.get(0, 2), -4.0);
        assert_eq!(m.get(2, 0), 0.0);
        assert_eq!(m.get(2, 2), 8.0);
    }

    #[test]
    fn test_to_csc_layout() {
        let mut m = TripletMatrix::new(2, 3);
        m.add(1, 0, 1.0);
        m.add(0, 2, 2.0);
        m.add(1, 2, 3.0);
        let csc = m.to_csc();
        assert_eq!(csc.nrows, 2);
        assert_eq!(csc.ncols, 3);
        assert_eq!(&csc.indptr[..], &[0, 1, 1, 3]);
        assert_eq!(&csc.indices[..], &[1, 0, 1]);
        assert_eq!(&csc.data[..], &[1.0, 2.0, 3.0]);
    }
}
