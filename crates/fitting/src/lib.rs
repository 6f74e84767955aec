//! Least-squares fitting for Morpho shapes.
//!
//! This crate turns control points into shape coefficients:
//! - [`qr`] - Householder (one-shot) and Givens (row-extendable) QR over a
//!   packed upper-triangular factor
//! - [`calculator`] - Full linear fits and incremental 1-D fits backed by a
//!   [`FitStack`] of cached QR states
//! - [`basis`] - Design-matrix builders for spherical harmonics and
//!   elliptic Fourier descriptors
//!
//! # Incremental fitting
//!
//! Entry `k` of a [`FitStack`] holds the factorization of the first `k + 1`
//! rows. Editing the trailing points of a control set only invalidates the
//! stack suffix, so a re-fit costs O(edited rows) rather than O(points).

pub mod basis;
pub mod calculator;
pub mod error;
pub mod matrix;
pub mod qr;

pub use calculator::{fit_incremental_1d, fit_linear, FitStack, IncrementalFit, LinearFit};
pub use error::FitError;
pub use matrix::DesignMatrix;
pub use qr::{estimate_condition, givens_extend, givens_qr, householder_qr, solve, QrState};
