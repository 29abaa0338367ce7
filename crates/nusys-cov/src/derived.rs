use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_hist::{CovarianceMatrix, Histogram1D};

/// `cov[i][j] / (c[i] c[j])`, zero wherever the denominator is zero.
pub fn fractional(
    name: impl Into<String>,
    cov: &CovarianceMatrix,
    central: &Histogram1D,
) -> Result<CovarianceMatrix, NusysError> {
    if cov.axis != central.axis {
        return Err(NusysError::Linalg(
            ErrorInfo::new("frac_axis", "covariance and central value disagree on binning")
                .with_context("histogram", cov.name.clone()),
        ));
    }
    let mut out = CovarianceMatrix::zeros(name, cov.axis);
    let n = cov.dim();
    for i in 0..n {
        for j in i..n {
            let denominator = central.get(i) * central.get(j);
            let value = if denominator == 0.0 {
                0.0
            } else {
                cov.get(i, j) / denominator
            };
            out.set_symmetric(i, j, value);
        }
    }
    Ok(out)
}

/// Diagonal Poisson covariance of a count histogram.
pub fn statistical(name: impl Into<String>, counts: &Histogram1D) -> CovarianceMatrix {
    let mut out = CovarianceMatrix::zeros(name, counts.axis);
    for (bin, count) in counts.contents.iter().enumerate() {
        out.set(bin, bin, *count);
    }
    out
}

/// Element-wise sum of `members`. At least one member is required and all
/// must share an axis.
pub fn sum<'a, I>(name: impl Into<String>, members: I) -> Result<CovarianceMatrix, NusysError>
where
    I: IntoIterator<Item = &'a CovarianceMatrix>,
{
    let name = name.into();
    let mut members = members.into_iter();
    let first = members.next().ok_or_else(|| {
        NusysError::Linalg(
            ErrorInfo::new("group_empty", "group has no member covariances")
                .with_context("histogram", name.clone()),
        )
    })?;
    let mut total = CovarianceMatrix::zeros(name, first.axis);
    total.add_assign(first)?;
    for member in members {
        total.add_assign(member)?;
    }
    Ok(total)
}
