//! Dense row-major design matrix.

use crate::error::FitError;

/// A dense `rows × cols` matrix stored row-major.
///
/// Rows are appended one at a time by the basis builders; the fitting
/// calculator reads them back by index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesignMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl DesignMatrix {
    /// Create an empty matrix with a fixed column count.
    pub fn new(cols: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols,
        }
    }

    /// Create an empty matrix with room for `rows` rows.
    pub fn with_capacity(rows: usize, cols: usize) -> Self {
        Self {
            data: Vec::with_capacity(rows * cols),
            rows: 0,
            cols,
        }
    }

    /// Build a matrix from row slices. All rows must share one length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::with_capacity(rows.len(), cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Append a row.
    pub fn push_row(&mut self, row: &[f64]) -> Result<(), FitError> {
        if row.len() != self.cols {
            return Err(FitError::DimensionMismatch {
                expected: self.cols,
                found: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow row `index`.
    ///
    /// # Panics
    /// Panics if `index >= rows`.
    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read_rows() {
        let mut m = DesignMatrix::new(2);
        m.push_row(&[1.0, 2.0]).unwrap();
        m.push_row(&[3.0, 4.0]).unwrap();

        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.get(0, 1), 2.0);
    }

    #[test]
    fn test_row_length_mismatch() {
        let mut m = DesignMatrix::new(3);
        let err = m.push_row(&[1.0]).unwrap_err();
        assert_eq!(err, FitError::DimensionMismatch { expected: 3, found: 1 });
        assert_eq!(m.rows(), 0);
    }
}
