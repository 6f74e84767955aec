//! Fitting calculator.
//!
//! Two contracts sit on top of the QR solver:
//! - [`fit_linear`] - full least-squares solve via Householder QR
//! - [`fit_incremental_1d`] - Givens-based fit that reuses the cached
//!   prefix of a [`FitStack`] and only factors the rows after it

use tracing::{debug, trace};

use crate::error::FitError;
use crate::matrix::DesignMatrix;
use crate::qr::{householder_qr, solve, QrState};

/// Result of a full linear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub coefficients: Vec<f64>,
    /// Residual norm `‖Ax − b‖`
    pub residual: f64,
    pub condition: f64,
}

/// Result of an incremental fit.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalFit {
    pub coefficients: Vec<f64>,
    pub condition: f64,
    /// Rows taken from the stack without refactoring
    pub rows_reused: usize,
    /// Rows rotated into the factor by this call
    pub rows_added: usize,
}

/// Cached QR states for incremental fitting.
///
/// Entry `k` holds the factorization of the first `k + 1` rows, so the
/// stack never holds more entries than there are points. Truncating to
/// length `L` marks rows `>= L` as untrusted.
#[derive(Debug, Clone, Default)]
pub struct FitStack {
    states: Vec<QrState>,
    basis_order: Option<usize>,
    columns: Option<usize>,
    point_count: usize,
}

impl FitStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Cached states, shortest prefix first.
    pub fn states(&self) -> &[QrState] {
        &self.states
    }

    pub fn last(&self) -> Option<&QrState> {
        self.states.last()
    }

    /// Basis order the cached rows were built for.
    pub fn basis_order(&self) -> Option<usize> {
        self.basis_order
    }

    /// Point count seen by the last fit.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Drop every cached state and the metadata record.
    pub fn clear(&mut self) {
        self.states.clear();
        self.basis_order = None;
        self.columns = None;
        self.point_count = 0;
    }

    /// Keep only the first `len` states.
    pub fn truncate(&mut self, len: usize) {
        self.states.truncate(len);
    }

    /// Drop the newest state.
    pub fn pop(&mut self) -> Option<QrState> {
        self.states.pop()
    }

    /// Record the basis order for the rows about to be fitted.
    ///
    /// Returns `true` when the order changed and the stack was cleared.
    pub fn ensure_basis_order(&mut self, order: usize) -> bool {
        match self.basis_order {
            Some(current) if current == order => false,
            previous => {
                let had_states = !self.states.is_empty();
                self.clear();
                self.basis_order = Some(order);
                previous.is_some() && had_states
            }
        }
    }
}

/// Solve `A x ≈ b` in the least-squares sense with Householder QR.
pub fn fit_linear(a: &DesignMatrix, b: &[f64]) -> Result<LinearFit, FitError> {
    if a.rows() < a.cols() {
        return Err(FitError::InsufficientRows {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    let state = householder_qr(a, Some(b))?;
    let coefficients = solve(&state)?;
    Ok(LinearFit {
        coefficients,
        residual: state.residual(),
        condition: state.condition(),
    })
}

/// Solve `A x ≈ b` reusing the factorization cached in `stack`.
///
/// - An empty stack is built row by row, caching a state after every row.
/// - A stack covering a prefix of the rows is extended with the suffix only.
/// - A stack longer than `A` is truncated to the row count.
/// - A column-count change clears the stack and rebuilds from scratch.
///
/// The stack is left consistent with `A` even when the solve itself fails.
/// Callers recovering from an error should clear it and fall back to
/// [`fit_linear`].
pub fn fit_incremental_1d(
    a: &DesignMatrix,
    b: &[f64],
    stack: &mut FitStack,
) -> Result<IncrementalFit, FitError> {
    if b.len() != a.rows() {
        return Err(FitError::DimensionMismatch {
            expected: a.rows(),
            found: b.len(),
        });
    }

    let cols = a.cols();
    if stack.columns != Some(cols) {
        if !stack.states.is_empty() {
            debug!(
                "fit stack: column count {:?} -> {}, rebuilding",
                stack.columns, cols
            );
        }
        stack.states.clear();
        stack.columns = Some(cols);
    }

    let rows = a.rows();
    if stack.states.len() > rows {
        trace!("fit stack: truncating {} -> {}", stack.states.len(), rows);
        stack.states.truncate(rows);
    }

    let rows_reused = stack.states.len();
    let mut state = stack
        .states
        .last()
        .cloned()
        .unwrap_or_else(|| QrState::empty(cols));

    for i in rows_reused..rows {
        state.apply_row(a.row(i), b[i])?;
        stack.states.push(state.clone());
    }
    stack.point_count = rows;

    if rows < cols {
        return Err(FitError::InsufficientRows { rows, cols });
    }

    let coefficients = solve(&state)?;
    Ok(IncrementalFit {
        coefficients,
        condition: state.condition(),
        rows_reused,
        rows_added: rows - rows_reused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_system(rows: usize, cols: usize, seed: u64) -> (DesignMatrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut a = DesignMatrix::with_capacity(rows, cols);
        let mut b = Vec::with_capacity(rows);
        for _ in 0..rows {
            let row: Vec<f64> = (0..cols).map(|_| rng.random_range(-1.0..1.0)).collect();
            a.push_row(&row).unwrap();
            b.push(rng.random_range(-2.0..2.0));
        }
        (a, b)
    }

    fn prefix(a: &DesignMatrix, b: &[f64], rows: usize) -> (DesignMatrix, Vec<f64>) {
        let mut m = DesignMatrix::with_capacity(rows, a.cols());
        for i in 0..rows {
            m.push_row(a.row(i)).unwrap();
        }
        (m, b[..rows].to_vec())
    }

    #[test]
    fn test_fit_linear_rejects_underdetermined() {
        let (a, b) = random_system(3, 5, 1);
        assert_eq!(
            fit_linear(&a, &b),
            Err(FitError::InsufficientRows { rows: 3, cols: 5 })
        );
    }

    #[test]
    fn test_incremental_matches_full() {
        for seed in 0..8 {
            let (a, b) = random_system(40, 6, seed);
            let full = fit_linear(&a, &b).unwrap();

            // Feed the rows one at a time from an empty stack
            let mut stack = FitStack::new();
            let mut last = None;
            for rows in 6..=40 {
                let (pa, pb) = prefix(&a, &b, rows);
                last = Some(fit_incremental_1d(&pa, &pb, &mut stack).unwrap());
            }
            let incremental = last.unwrap();

            for (x, y) in full.coefficients.iter().zip(&incremental.coefficients) {
                assert_abs_diff_eq!(x, y, epsilon = 1e-9);
            }
            assert_eq!(stack.len(), 40);
        }
    }

    #[test]
    fn test_first_fit_builds_every_row() {
        let (a, b) = random_system(12, 4, 7);
        let mut stack = FitStack::new();
        let fit = fit_incremental_1d(&a, &b, &mut stack).unwrap();

        assert_eq!(fit.rows_reused, 0);
        assert_eq!(fit.rows_added, 12);
        assert_eq!(stack.len(), 12);
        assert_eq!(stack.point_count(), 12);
        for (k, state) in stack.states().iter().enumerate() {
            assert_eq!(state.rows(), k + 1);
        }
    }

    #[test]
    fn test_truncate_then_reextend_is_bitwise_identical() {
        let (a, b) = random_system(30, 5, 11);
        let mut stack = FitStack::new();
        let original = fit_incremental_1d(&a, &b, &mut stack).unwrap();

        stack.truncate(17);
        let refit = fit_incremental_1d(&a, &b, &mut stack).unwrap();

        assert_eq!(refit.rows_reused, 17);
        assert_eq!(refit.rows_added, 13);
        assert_eq!(original.coefficients, refit.coefficients);
    }

    #[test]
    fn test_shrinking_rows_truncates_stack() {
        let (a, b) = random_system(20, 3, 5);
        let mut stack = FitStack::new();
        fit_incremental_1d(&a, &b, &mut stack).unwrap();

        let (pa, pb) = prefix(&a, &b, 10);
        let fit = fit_incremental_1d(&pa, &pb, &mut stack).unwrap();
        assert_eq!(stack.len(), 10);
        assert_eq!(fit.rows_added, 0);

        let full = fit_linear(&pa, &pb).unwrap();
        for (x, y) in full.coefficients.iter().zip(&fit.coefficients) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_column_change_rebuilds() {
        let (a, b) = random_system(10, 3, 2);
        let mut stack = FitStack::new();
        fit_incremental_1d(&a, &b, &mut stack).unwrap();

        let (wide, wb) = random_system(10, 4, 3);
        let fit = fit_incremental_1d(&wide, &wb, &mut stack).unwrap();
        assert_eq!(fit.rows_reused, 0);
        assert_eq!(fit.coefficients.len(), 4);
    }

    #[test]
    fn test_underdetermined_incremental_keeps_stack() {
        let (a, b) = random_system(2, 4, 9);
        let mut stack = FitStack::new();
        let err = fit_incremental_1d(&a, &b, &mut stack).unwrap_err();

        assert_eq!(err, FitError::InsufficientRows { rows: 2, cols: 4 });
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_basis_order_change_clears() {
        let (a, b) = random_system(8, 3, 4);
        let mut stack = FitStack::new();
        assert!(!stack.ensure_basis_order(1));
        fit_incremental_1d(&a, &b, &mut stack).unwrap();

        assert!(!stack.ensure_basis_order(1));
        assert_eq!(stack.len(), 8);

        assert!(stack.ensure_basis_order(2));
        assert!(stack.is_empty());
        assert_eq!(stack.basis_order(), Some(2));
    }
}
