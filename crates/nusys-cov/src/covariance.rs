use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_hist::{CovarianceMatrix, Histogram1D, Histogram2D};
use serde::{Deserialize, Serialize};

/// Divisor applied to the sum of deviation products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Divide by the universe count `U`.
    #[default]
    Population,
    /// Divide by `U - 1`.
    Sample,
}

impl Normalization {
    fn divisor(self, universes: usize) -> Option<f64> {
        match self {
            Normalization::Population if universes >= 1 => Some(universes as f64),
            Normalization::Sample if universes >= 2 => Some((universes - 1) as f64),
            _ => None,
        }
    }
}

/// Covariance of the variable bins of `universes` around `central`.
///
/// `cov[i][j] = Σ_u (h[i,u] - c[i]) (h[j,u] - c[j]) / d` with `d` chosen by
/// `normalization`. Only the upper triangle is computed; the lower triangle
/// is a copy, so the result is exactly symmetric.
pub fn covariance(
    name: impl Into<String>,
    universes: &Histogram2D,
    central: &Histogram1D,
    normalization: Normalization,
) -> Result<CovarianceMatrix, NusysError> {
    let name = name.into();
    if universes.x != central.axis {
        return Err(NusysError::Linalg(
            ErrorInfo::new("cov_axis", "universe histogram and central value disagree on binning")
                .with_context("histogram", universes.name.clone())
                .with_context("central", central.name.clone()),
        ));
    }
    let count = universes.ny();
    let divisor = normalization.divisor(count).ok_or_else(|| {
        NusysError::Linalg(
            ErrorInfo::new("cov_universes", "too few universes for the requested normalization")
                .with_context("histogram", universes.name.clone())
                .with_context("universes", count.to_string()),
        )
    })?;
    let bins = universes.nx();
    let deviations: Vec<Vec<f64>> = (0..bins)
        .map(|i| {
            let c = central.get(i);
            universes.row(i).iter().map(|value| value - c).collect()
        })
        .collect();
    let mut out = CovarianceMatrix::zeros(name, universes.x);
    for i in 0..bins {
        for j in i..bins {
            let sum: f64 = deviations[i]
                .iter()
                .zip(&deviations[j])
                .map(|(a, b)| a * b)
                .sum();
            out.set_symmetric(i, j, sum / divisor);
        }
    }
    Ok(out)
}
