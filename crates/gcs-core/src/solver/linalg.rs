//! Dense linear algebra for the Newton step and the rank test

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Smallest accepted ratio between the pivots of the Cholesky factor
const PIVOT_RATIO: f64 = 1e-6;

/// Singular values below this fraction of the largest are treated as zero
/// in the pseudo-inverse
const SINGULAR_CUTOFF: f64 = 1e-12;

/// Minimum-norm least squares step for an underdetermined system
///
/// Solves `A·X = F` in the least squares sense with the columns of `A`
/// weighted by `scale`: `X = S·A_sᵀ·z` with `(A_s·A_sᵀ)·z = F` and
/// `A_s = A·S`. Falls back to an SVD pseudo-inverse when `A_s·A_sᵀ` is
/// singular or nearly so. Returns `None` if the result is not finite.
pub fn least_squares_step(
    jacobian: &DMatrix<f64>,
    residual: &DVector<f64>,
    scale: &DVector<f64>,
) -> Option<DVector<f64>> {
    let scaled = jacobian * DMatrix::from_diagonal(scale);
    let normal = &scaled * scaled.transpose();

    let step = match normal.cholesky().filter(well_conditioned) {
        Some(cholesky) => {
            let z = cholesky.solve(residual);
            scaled.transpose() * z
        }
        None => {
            let svd = scaled.svd(true, true);
            let largest = svd.singular_values.iter().copied().fold(0.0, f64::max);
            svd.solve(residual, largest * SINGULAR_CUTOFF).ok()?
        }
    };
    let step = step.component_mul(scale);

    step.iter().all(|v| v.is_finite()).then_some(step)
}

fn well_conditioned(cholesky: &Cholesky<f64, Dyn>) -> bool {
    let diagonal = cholesky.l_dirty().diagonal();
    let largest = diagonal.iter().copied().fold(0.0, f64::max);
    let smallest = diagonal.iter().copied().fold(f64::INFINITY, f64::min);
    smallest > largest * PIVOT_RATIO
}

/// Numeric rank: singular values above `tolerance` times the largest one
///
/// Non-finite entries (a derivative evaluated at a singular point) count
/// as zero.
pub fn rank(matrix: &DMatrix<f64>, tolerance: f64) -> usize {
    if matrix.nrows() == 0 || matrix.ncols() == 0 {
        return 0;
    }
    let cleaned = matrix.map(|v| if v.is_finite() { v } else { 0.0 });
    let singular = cleaned.svd(false, false).singular_values;
    let largest = singular.iter().copied().fold(0.0, f64::max);
    if largest == 0.0 {
        return 0;
    }
    singular.iter().filter(|s| **s > tolerance * largest).count()
}
