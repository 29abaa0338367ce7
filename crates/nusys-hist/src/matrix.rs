use nalgebra::DMatrix;
use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::Binning;
use serde::{Deserialize, Serialize};

/// Symmetric `N × N` covariance over the bins of one variable axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    /// Artifact name.
    pub name: String,
    /// Variable binning shared by rows and columns.
    pub axis: Binning,
    /// Row-major entries, length `N * N`.
    pub values: Vec<f64>,
}

impl CovarianceMatrix {
    /// Creates an all-zero matrix over `axis`.
    pub fn zeros(name: impl Into<String>, axis: Binning) -> Self {
        Self {
            name: name.into(),
            axis,
            values: vec![0.0; axis.bins * axis.bins],
        }
    }

    /// Builds a matrix from a square `nalgebra` matrix.
    pub fn from_dmatrix(
        name: impl Into<String>,
        axis: Binning,
        matrix: &DMatrix<f64>,
    ) -> Result<Self, NusysError> {
        let name = name.into();
        if matrix.nrows() != axis.bins || matrix.ncols() != axis.bins {
            return Err(NusysError::Linalg(
                ErrorInfo::new("cov_shape", "matrix does not match the axis")
                    .with_context("histogram", name)
                    .with_context("bins", axis.bins.to_string())
                    .with_context("rows", matrix.nrows().to_string()),
            ));
        }
        let mut out = Self::zeros(name, axis);
        for i in 0..axis.bins {
            for j in 0..axis.bins {
                out.set(i, j, matrix[(i, j)]);
            }
        }
        Ok(out)
    }

    /// Dimension `N`.
    pub fn dim(&self) -> usize {
        self.axis.bins
    }

    /// Entry `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim() + j]
    }

    /// Overwrites entry `(i, j)` only.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let n = self.dim();
        self.values[i * n + j] = value;
    }

    /// Writes `value` to both `(i, j)` and `(j, i)`.
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.set(i, j, value);
        self.set(j, i, value);
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.get(i, i)).collect()
    }

    /// Whether `cov[i][j] == cov[j][i]` holds exactly for every pair.
    pub fn is_symmetric(&self) -> bool {
        let n = self.dim();
        (0..n).all(|i| (i + 1..n).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Copies the entries into an `nalgebra` matrix.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.dim(), self.dim(), &self.values)
    }

    /// Element-wise sum with another matrix of the same axis.
    pub fn add_assign(&mut self, other: &CovarianceMatrix) -> Result<(), NusysError> {
        if self.axis != other.axis {
            return Err(NusysError::Linalg(
                ErrorInfo::new("cov_add_shape", "cannot add covariances over different axes")
                    .with_context("lhs", self.name.clone())
                    .with_context("rhs", other.name.clone()),
            ));
        }
        for (lhs, rhs) in self.values.iter_mut().zip(&other.values) {
            *lhs += rhs;
        }
        Ok(())
    }
}

/// Lower-triangular Cholesky factor over a subset of variable bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowerTriangular {
    /// Artifact name.
    pub name: String,
    /// Original bin indices retained, in order; the factor is `K × K`.
    pub bins: Vec<usize>,
    /// Row-major entries, length `K * K`, zero above the diagonal.
    pub values: Vec<f64>,
}

impl LowerTriangular {
    /// Dimension `K`.
    pub fn dim(&self) -> usize {
        self.bins.len()
    }

    /// Entry `(i, j)` of the reduced factor.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim() + j]
    }

    /// Copies the factor into an `nalgebra` matrix.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.dim(), self.dim(), &self.values)
    }
}
