use nalgebra::DMatrix;
use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_hist::{CovarianceMatrix, Histogram1D, LowerTriangular};
use tracing::debug;

/// Relative tolerance on pivots, scaled by the largest diagonal entry.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

fn linalg_error(code: &str, message: &str, cov: &CovarianceMatrix) -> NusysError {
    NusysError::Linalg(ErrorInfo::new(code, message).with_context("histogram", cov.name.clone()))
}

/// Cholesky factor of `cov` restricted to the bins where `central` is
/// non-zero.
///
/// The reduced matrix must be positive semi-definite. A pivot within
/// `tolerance × max|diag|` of zero yields a zero column; a pivot below
/// that fails with the original bin index in the error context.
pub fn decompose(
    name: impl Into<String>,
    cov: &CovarianceMatrix,
    central: &Histogram1D,
    tolerance: f64,
) -> Result<LowerTriangular, NusysError> {
    if cov.axis != central.axis {
        return Err(linalg_error("chol_axis", "covariance and central value disagree on binning", cov));
    }
    if cov.values.iter().any(|value| !value.is_finite()) {
        return Err(linalg_error("chol_nonfinite", "covariance has non-finite entries", cov));
    }
    let bins: Vec<usize> = (0..cov.dim()).filter(|bin| central.get(*bin) != 0.0).collect();
    let k = bins.len();
    let reduced = DMatrix::from_fn(k, k, |i, j| cov.get(bins[i], bins[j]));
    let factor = match reduced.clone().cholesky() {
        Some(chol) => chol.l(),
        None if k == 0 => reduced,
        None => semi_definite(&reduced, tolerance).map_err(|pivot| {
            NusysError::Linalg(
                ErrorInfo::new("chol_not_psd", "covariance is not positive semi-definite")
                    .with_context("histogram", cov.name.clone())
                    .with_context("pivot", bins[pivot].to_string()),
            )
        })?,
    };
    debug!(histogram = %cov.name, retained = k, dropped = cov.dim() - k, "cholesky factor computed");
    let mut values = Vec::with_capacity(k * k);
    for i in 0..k {
        for j in 0..k {
            values.push(if j <= i { factor[(i, j)] } else { 0.0 });
        }
    }
    Ok(LowerTriangular {
        name: name.into(),
        bins,
        values,
    })
}

/// Column-by-column factorisation tolerating vanishing pivots. Returns the
/// failing reduced pivot index on error.
fn semi_definite(a: &DMatrix<f64>, tolerance: f64) -> Result<DMatrix<f64>, usize> {
    let n = a.nrows();
    let scale = (0..n).map(|i| a[(i, i)].abs()).fold(0.0, f64::max);
    let eps = tolerance * scale;
    let off = tolerance.sqrt() * scale;
    let mut l = DMatrix::<f64>::zeros(n, n);
    for j in 0..n {
        let pivot = a[(j, j)] - (0..j).map(|k| l[(j, k)] * l[(j, k)]).sum::<f64>();
        if pivot > eps {
            let root = pivot.sqrt();
            l[(j, j)] = root;
            for i in j + 1..n {
                let residual = a[(i, j)] - (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum::<f64>();
                l[(i, j)] = residual / root;
            }
        } else if pivot >= -eps {
            // A vanishing pivot needs a vanishing column below it.
            for i in j + 1..n {
                let residual = a[(i, j)] - (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum::<f64>();
                if residual.abs() > off {
                    return Err(j);
                }
            }
        } else {
            return Err(j);
        }
    }
    Ok(l)
}
