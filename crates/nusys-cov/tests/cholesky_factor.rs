use nusys_core::Binning;
use nusys_cov::{decompose, DEFAULT_TOLERANCE};
use nusys_hist::{CovarianceMatrix, Histogram1D};

fn matrix(rows: &[&[f64]]) -> CovarianceMatrix {
    let n = rows.len();
    let mut cov = CovarianceMatrix::zeros("m_cov", Binning::new(n, 0.0, n as f64));
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            cov.set(i, j, *value);
        }
    }
    cov
}

fn central(values: &[f64]) -> Histogram1D {
    let mut c = Histogram1D::new("m_cv", Binning::new(values.len(), 0.0, values.len() as f64));
    for (bin, value) in values.iter().enumerate() {
        c.set(bin, *value);
    }
    c
}

#[test]
fn spd_factor_reproduces_the_matrix() {
    let cov = matrix(&[&[4.0, 2.0, 0.4], &[2.0, 3.0, 0.5], &[0.4, 0.5, 2.0]]);
    let chol = decompose("m_chol", &cov, &central(&[1.0, 1.0, 1.0]), DEFAULT_TOLERANCE)
        .expect("factor");
    assert_eq!(chol.bins, vec![0, 1, 2]);
    assert_eq!(chol.get(0, 1), 0.0);
    assert_eq!(chol.get(0, 2), 0.0);
    assert_eq!(chol.get(1, 2), 0.0);
    let l = chol.to_dmatrix();
    let rebuilt = &l * l.transpose();
    let original = cov.to_dmatrix();
    assert!((rebuilt - original).abs().max() < 1e-12);
}

#[test]
fn indefinite_matrix_names_the_pivot() {
    let cov = matrix(&[&[1.0, 2.0], &[2.0, 1.0]]);
    let err = decompose("m_chol", &cov, &central(&[1.0, 1.0]), DEFAULT_TOLERANCE)
        .expect_err("indefinite");
    assert_eq!(err.code(), "chol_not_psd");
    assert_eq!(err.info().context.get("pivot").map(String::as_str), Some("1"));
}

#[test]
fn semi_definite_pivot_gives_zero_column() {
    let cov = matrix(&[&[1.0, 1.0], &[1.0, 1.0]]);
    let chol = decompose("m_chol", &cov, &central(&[3.0, 3.0]), DEFAULT_TOLERANCE)
        .expect("semi-definite");
    assert_eq!(chol.values, vec![1.0, 0.0, 1.0, 0.0]);
}

#[test]
fn zero_central_bins_are_dropped() {
    let cov = matrix(&[&[4.0, 9.0, 0.0], &[9.0, -1.0, 9.0], &[0.0, 9.0, 9.0]]);
    let chol = decompose("m_chol", &cov, &central(&[2.0, 0.0, 5.0]), DEFAULT_TOLERANCE)
        .expect("reduced");
    assert_eq!(chol.bins, vec![0, 2]);
    assert_eq!(chol.values, vec![2.0, 0.0, 0.0, 3.0]);

    let empty = decompose("m_chol", &cov, &central(&[0.0, 0.0, 0.0]), DEFAULT_TOLERANCE)
        .expect("empty");
    assert_eq!(empty.dim(), 0);
    assert!(empty.values.is_empty());
}

#[test]
fn non_finite_entries_fail() {
    let cov = matrix(&[&[f64::NAN, 0.0], &[0.0, 1.0]]);
    let err = decompose("m_chol", &cov, &central(&[1.0, 1.0]), DEFAULT_TOLERANCE)
        .expect_err("nan");
    assert_eq!(err.code(), "chol_nonfinite");
}
