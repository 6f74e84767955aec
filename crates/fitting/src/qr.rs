//! QR factorization over a packed upper-triangular factor.
//!
//! `R` is stored column-major triangular: entry `(i, j)` with `i <= j` lives
//! at `j * (j + 1) / 2 + i`. Alongside `R` each state carries the
//! transformed right-hand side `Qᵗb` (first `cols` entries) and the squared
//! norm of the part of `Qᵗb` that falls outside the column space, which is
//! the squared least-squares residual.
//!
//! Every public operation returns a fresh [`QrState`]; nothing aliases, so
//! callers can snapshot states freely.

use crate::error::FitError;
use crate::matrix::DesignMatrix;

/// Diagonal magnitudes below this are treated as singular.
pub const SINGULAR_TOLERANCE: f64 = 1e-15;

/// Givens rotations are skipped when the incoming entry is this small
/// relative to the existing diagonal.
const GIVENS_SKIP_RELATIVE: f64 = 1e-14;

/// Index of `R[row, col]` (requires `row <= col`) in packed storage.
#[inline]
pub fn packed_index(row: usize, col: usize) -> usize {
    debug_assert!(row <= col);
    col * (col + 1) / 2 + row
}

/// Number of stored entries for an `n × n` upper triangle.
#[inline]
pub fn packed_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// A QR factorization of the rows seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct QrState {
    r: Vec<f64>,
    qtb: Vec<f64>,
    residual_sq: f64,
    rows: usize,
    cols: usize,
    condition: f64,
    extendable: bool,
}

impl QrState {
    /// An extendable state with no rows.
    pub fn empty(cols: usize) -> Self {
        Self {
            r: vec![0.0; packed_len(cols)],
            qtb: vec![0.0; cols],
            residual_sq: 0.0,
            rows: 0,
            cols,
            condition: f64::INFINITY,
            extendable: true,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `R[row, col]`; zero below the diagonal.
    pub fn r(&self, row: usize, col: usize) -> f64 {
        if row > col {
            0.0
        } else {
            self.r[packed_index(row, col)]
        }
    }

    /// Packed upper triangle.
    pub fn packed_r(&self) -> &[f64] {
        &self.r
    }

    /// First `cols` entries of `Qᵗb`.
    pub fn qtb(&self) -> &[f64] {
        &self.qtb
    }

    /// Least-squares residual norm `‖Ax − b‖` at the solution.
    pub fn residual(&self) -> f64 {
        self.residual_sq.sqrt()
    }

    /// Condition estimate cached at the last update.
    pub fn condition(&self) -> f64 {
        self.condition
    }

    /// Whether [`givens_extend`] accepts this state.
    pub fn is_extendable(&self) -> bool {
        self.extendable
    }

    fn diagonal(&self, k: usize) -> f64 {
        self.r[packed_index(k, k)]
    }

    /// Rotate one row into the factor in place.
    pub(crate) fn apply_row(&mut self, row: &[f64], b: f64) -> Result<(), FitError> {
        if row.len() != self.cols {
            return Err(FitError::DimensionMismatch {
                expected: self.cols,
                found: row.len(),
            });
        }

        let n = self.cols;
        let mut w = row.to_vec();
        let mut beta = b;

        for k in 0..n {
            let wk = w[k];
            if wk == 0.0 {
                continue;
            }
            let rkk = self.diagonal(k);
            if wk.abs() <= GIVENS_SKIP_RELATIVE * rkk.abs() {
                continue;
            }

            let radius = rkk.hypot(wk);
            let c = rkk / radius;
            let s = wk / radius;

            for j in k..n {
                let idx = packed_index(k, j);
                let t = self.r[idx];
                let u = w[j];
                self.r[idx] = c * t + s * u;
                w[j] = c * u - s * t;
            }

            let t = self.qtb[k];
            self.qtb[k] = c * t + s * beta;
            beta = c * beta - s * t;
        }

        self.residual_sq += beta * beta;
        self.rows += 1;
        self.condition = estimate_condition(self);
        Ok(())
    }
}

fn checked_rhs(a: &DesignMatrix, b: Option<&[f64]>) -> Result<Vec<f64>, FitError> {
    match b {
        Some(b) if b.len() != a.rows() => Err(FitError::DimensionMismatch {
            expected: a.rows(),
            found: b.len(),
        }),
        Some(b) => Ok(b.to_vec()),
        None => Ok(vec![0.0; a.rows()]),
    }
}

/// One-shot Householder QR of an `m × n` matrix with `n <= m`.
///
/// The returned state is not extendable. Without `b` the transformed
/// right-hand side is all zeros.
pub fn householder_qr(a: &DesignMatrix, b: Option<&[f64]>) -> Result<QrState, FitError> {
    let m = a.rows();
    let n = a.cols();
    if m < n {
        return Err(FitError::InsufficientRows { rows: m, cols: n });
    }

    let mut rhs = checked_rhs(a, b)?;
    let mut work = a.as_slice().to_vec();
    let at = |i: usize, j: usize| i * n + j;
    let mut v = vec![0.0; m];

    for k in 0..n {
        let norm = (k..m).map(|i| work[at(i, k)].powi(2)).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }

        // u1 = x1 + sign(x1)·‖x‖ keeps the pivot away from cancellation.
        let x0 = work[at(k, k)];
        let sign = if x0 >= 0.0 { 1.0 } else { -1.0 };
        v[k] = x0 + sign * norm;
        for i in (k + 1)..m {
            v[i] = work[at(i, k)];
        }
        let vtv: f64 = (k..m).map(|i| v[i] * v[i]).sum();
        if vtv == 0.0 {
            continue;
        }

        for j in k..n {
            let dot: f64 = (k..m).map(|i| v[i] * work[at(i, j)]).sum();
            let f = 2.0 * dot / vtv;
            for i in k..m {
                work[at(i, j)] -= f * v[i];
            }
        }

        let dot: f64 = (k..m).map(|i| v[i] * rhs[i]).sum();
        let f = 2.0 * dot / vtv;
        for i in k..m {
            rhs[i] -= f * v[i];
        }
    }

    let mut r = vec![0.0; packed_len(n)];
    for j in 0..n {
        for i in 0..=j {
            r[packed_index(i, j)] = work[at(i, j)];
        }
    }

    let mut state = QrState {
        r,
        qtb: rhs[..n].to_vec(),
        residual_sq: rhs[n..].iter().map(|x| x * x).sum(),
        rows: m,
        cols: n,
        condition: f64::INFINITY,
        extendable: false,
    };
    state.condition = estimate_condition(&state);
    Ok(state)
}

/// Row-by-row Givens QR. The result can be extended with [`givens_extend`].
pub fn givens_qr(a: &DesignMatrix, b: Option<&[f64]>) -> Result<QrState, FitError> {
    let rhs = checked_rhs(a, b)?;
    let mut state = QrState::empty(a.cols());
    for (i, &bi) in rhs.iter().enumerate() {
        state.apply_row(a.row(i), bi)?;
    }
    Ok(state)
}

/// Append one row to an extendable state in O(n²), returning the new state.
pub fn givens_extend(state: &QrState, row: &[f64], b: f64) -> Result<QrState, FitError> {
    if !state.extendable {
        return Err(FitError::NotExtendable);
    }
    let mut next = state.clone();
    next.apply_row(row, b)?;
    Ok(next)
}

/// Back-substitute `R x = Qᵗb`.
pub fn solve(state: &QrState) -> Result<Vec<f64>, FitError> {
    let n = state.cols;
    let mut x = vec![0.0; n];
    for k in (0..n).rev() {
        let diag = state.diagonal(k);
        if diag.abs() < SINGULAR_TOLERANCE {
            return Err(FitError::Singular {
                index: k,
                magnitude: diag.abs(),
            });
        }
        let tail: f64 = ((k + 1)..n).map(|j| state.r[packed_index(k, j)] * x[j]).sum();
        x[k] = (state.qtb[k] - tail) / diag;
    }
    Ok(x)
}

/// Ratio of the largest to the smallest diagonal magnitude of `R`.
///
/// Infinite when any diagonal is effectively zero (or there are no columns).
pub fn estimate_condition(state: &QrState) -> f64 {
    if state.cols == 0 {
        return f64::INFINITY;
    }
    let mut max = 0.0_f64;
    let mut min = f64::INFINITY;
    for k in 0..state.cols {
        let d = state.diagonal(k).abs();
        max = max.max(d);
        min = min.min(d);
    }
    if min < SINGULAR_TOLERANCE {
        f64::INFINITY
    } else {
        max / min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_system() -> (DesignMatrix, Vec<f64>) {
        // y = 1 + 2x sampled with a little noise
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.1, 2.9, 5.2, 6.8, 9.1];
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![1.0, x]).collect();
        (DesignMatrix::from_rows(&rows).unwrap(), ys.to_vec())
    }

    #[test]
    fn test_packed_layout() {
        assert_eq!(packed_index(0, 0), 0);
        assert_eq!(packed_index(0, 1), 1);
        assert_eq!(packed_index(1, 1), 2);
        assert_eq!(packed_index(0, 2), 3);
        assert_eq!(packed_index(2, 2), 5);
        assert_eq!(packed_len(3), 6);
    }

    #[test]
    fn test_householder_square_solve() {
        let a = DesignMatrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 3.0]]).unwrap();
        let state = householder_qr(&a, Some(&[3.0, 5.0])).unwrap();
        let x = solve(&state).unwrap();

        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
        assert_abs_diff_eq!(state.residual(), 0.0, epsilon = 1e-12);
        assert!(!state.is_extendable());
    }

    #[test]
    fn test_least_squares_matches_normal_equations() {
        let (a, b) = sample_system();
        let x = solve(&householder_qr(&a, Some(&b)).unwrap()).unwrap();

        // Closed-form simple regression
        let n = 5.0;
        let sx: f64 = 10.0;
        let sxx: f64 = 30.0;
        let sy: f64 = b.iter().sum();
        let sxy: f64 = b.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let slope = (n * sxy - sx * sy) / (n * sxx - sx * sx);
        let intercept = (sy - slope * sx) / n;

        assert_abs_diff_eq!(x[0], intercept, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], slope, epsilon = 1e-10);
    }

    #[test]
    fn test_givens_matches_householder() {
        let (a, b) = sample_system();
        let h = householder_qr(&a, Some(&b)).unwrap();
        let g = givens_qr(&a, Some(&b)).unwrap();

        let xh = solve(&h).unwrap();
        let xg = solve(&g).unwrap();
        for (p, q) in xh.iter().zip(&xg) {
            assert_abs_diff_eq!(p, q, epsilon = 1e-10);
        }
        assert_abs_diff_eq!(h.residual(), g.residual(), epsilon = 1e-10);
        assert_eq!(g.rows(), 5);
        assert!(g.is_extendable());
    }

    #[test]
    fn test_givens_extend_returns_fresh_state() {
        let (a, b) = sample_system();
        let first = givens_qr(&a, Some(&b)).unwrap();
        let extended = givens_extend(&first, &[1.0, 5.0], 11.0).unwrap();

        assert_eq!(first.rows(), 5);
        assert_eq!(extended.rows(), 6);
        assert_ne!(first.packed_r(), extended.packed_r());
    }

    #[test]
    fn test_extend_householder_fails() {
        let (a, b) = sample_system();
        let state = householder_qr(&a, Some(&b)).unwrap();
        assert_eq!(
            givens_extend(&state, &[1.0, 0.0], 0.0),
            Err(FitError::NotExtendable)
        );
    }

    #[test]
    fn test_singular_detection() {
        // Second column contributes nothing
        let a = DesignMatrix::from_rows(&[
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
        ])
        .unwrap();
        let state = householder_qr(&a, Some(&[1.0, 2.0, 3.0])).unwrap();
        assert!(matches!(solve(&state), Err(FitError::Singular { index: 1, .. })));
        assert!(estimate_condition(&state).is_infinite());
    }

    #[test]
    fn test_underdetermined_rejected() {
        let a = DesignMatrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(
            householder_qr(&a, None),
            Err(FitError::InsufficientRows { rows: 1, cols: 3 })
        );
    }

    #[test]
    fn test_condition_of_identity() {
        let a = DesignMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let state = givens_qr(&a, None).unwrap();
        assert_abs_diff_eq!(state.condition(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rhs_length_checked() {
        let (a, _) = sample_system();
        assert!(matches!(
            householder_qr(&a, Some(&[1.0])),
            Err(FitError::DimensionMismatch { expected: 5, found: 1 })
        ));
    }
}
