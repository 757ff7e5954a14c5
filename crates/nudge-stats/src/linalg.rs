//! Dense linear algebra for small symmetric positive-definite matrices.
//!
//! The fixed-effect cross-products and variance-parameter information matrices
//! handled by the model crate have a handful of rows, so a plain Cholesky
//! factorization covers every solve, inverse and determinant needed.
//!
//! All functions return `None` when the matrix is not square or not
//! numerically positive definite.

use ndarray::{Array1, Array2, ArrayView1};

/// Relative pivot threshold below which a matrix is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Lower-triangular Cholesky factor `L` with `a = L L'`.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use nudge_stats::linalg::cholesky;
///
/// let l = cholesky(&array![[4.0, 2.0], [2.0, 2.0]]).unwrap();
/// assert_eq!(l, array![[2.0, 0.0], [1.0, 1.0]]);
/// ```
#[must_use]
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let (n, m) = a.dim();
    if n != m {
        return None;
    }
    let scale = (0..n).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !diag.is_finite() || diag <= PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE) {
            return None;
        }
        let pivot = diag.sqrt();
        l[[j, j]] = pivot;
        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / pivot;
        }
    }
    Some(l)
}

fn forward_substitute(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    y
}

fn backward_substitute(l: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
    let n = y.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

fn solve_with_factor(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    backward_substitute(l, &forward_substitute(l, b))
}

/// Solves `a x = b`.
#[must_use]
pub fn spd_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if b.len() != a.nrows() {
        return None;
    }
    let l = cholesky(a)?;
    Some(solve_with_factor(&l, b.view()))
}

/// Inverse of `a`, symmetrised to remove round-off asymmetry.
#[must_use]
pub fn spd_inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let l = cholesky(a)?;
    let n = a.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    let identity = Array2::<f64>::eye(n);
    for j in 0..n {
        let col = solve_with_factor(&l, identity.column(j));
        inv.column_mut(j).assign(&col);
    }
    let sym = (&inv + &inv.t()) * 0.5;
    Some(sym)
}

/// Natural logarithm of the determinant of `a`.
#[must_use]
pub fn spd_log_det(a: &Array2<f64>) -> Option<f64> {
    let l = cholesky(a)?;
    Some(2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>())
}

/// Quadratic form `x' a x`.
#[must_use]
pub fn quad_form(a: &Array2<f64>, x: &Array1<f64>) -> f64 {
    x.dot(&a.dot(x))
}

/// Submatrix of `a` keeping the given rows and columns (in order).
#[must_use]
pub fn select(a: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((indices.len(), indices.len()), |(i, j)| {
        a[[indices[i], indices[j]]]
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_inverse_round_trip() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inv = spd_inverse(&a).unwrap();
        let product = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_log_det() {
        let a = array![[2.0, 0.0], [0.0, 8.0]];
        assert!((spd_log_det(&a).unwrap() - 16.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(cholesky(&a).is_none());
        assert!(spd_inverse(&a).is_none());
        let not_square = Array2::<f64>::zeros((2, 3));
        assert!(cholesky(&not_square).is_none());
    }

    #[test]
    fn test_select_and_quad_form() {
        let a = array![[1.0, 2.0, 3.0], [2.0, 5.0, 6.0], [3.0, 6.0, 9.0]];
        let sub = select(&a, &[0, 2]);
        assert_eq!(sub, array![[1.0, 3.0], [3.0, 9.0]]);
        let x = array![1.0, 1.0];
        assert!((quad_form(&sub, &x) - 16.0).abs() < 1e-12);
    }
}
